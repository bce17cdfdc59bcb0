use crate::layout::{self, str_width};

/// Rows available to a draft; line breaks beyond this are refused.
pub const MAX_DRAFT_LINES: usize = 4;
/// Columns kept free between the caret and the edges of a single-line field.
pub const SCROLL_MARGIN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditMode {
    #[default]
    MultiLine,
    SingleLine,
}

/// Editable UTF-8 text with a caret.
///
/// `caret` and `scroll` are byte offsets that always sit on a char boundary.
/// `scroll` only moves in single-line mode, where the field does not wrap.
#[derive(Debug, Clone)]
pub struct TextBuffer {
    content: String,
    caret: usize,
    scroll: usize,
    mode: EditMode,
    width: usize,
}

impl TextBuffer {
    pub fn new(width: usize) -> Self {
        Self {
            content: String::new(),
            caret: 0,
            scroll: 0,
            mode: EditMode::MultiLine,
            width: width.max(1),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn caret(&self) -> usize {
        self.caret
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }

    pub fn set_mode(&mut self, mode: EditMode) {
        self.mode = mode;
        self.scroll = 0;
        self.adjust_scroll();
    }

    pub fn set_width(&mut self, width: usize) {
        self.width = width.max(1);
        self.adjust_scroll();
    }

    pub fn set_content(&mut self, text: &str) {
        self.content.clear();
        self.content.push_str(text);
        self.caret = self.content.len();
        self.scroll = 0;
        self.adjust_scroll();
    }

    /// Replaces the content with `prefix` followed by `suffix` and leaves the
    /// caret between them.
    pub fn seed(&mut self, prefix: &str, suffix: &str) {
        self.set_content(&format!("{prefix}{suffix}"));
        self.caret = prefix.len();
        self.scroll = 0;
        self.adjust_scroll();
    }

    pub fn clear(&mut self) {
        self.set_content("");
    }

    pub fn insert_char(&mut self, ch: char) {
        self.content.insert(self.caret, ch);
        self.caret += ch.len_utf8();
        self.adjust_scroll();
    }

    pub fn insert_line_break(&mut self) {
        if layout::line_count(&self.content, self.width) < MAX_DRAFT_LINES {
            self.insert_char('\n');
        }
    }

    pub fn delete_backward(&mut self) {
        let Some(ch) = self.content[..self.caret].chars().next_back() else {
            return;
        };
        self.caret -= ch.len_utf8();
        self.content.remove(self.caret);
        self.adjust_scroll();
    }

    pub fn move_backward(&mut self) {
        if let Some(ch) = self.content[..self.caret].chars().next_back() {
            self.caret -= ch.len_utf8();
            self.adjust_scroll();
        }
    }

    pub fn move_forward(&mut self) {
        if let Some(ch) = self.content[self.caret..].chars().next() {
            self.caret += ch.len_utf8();
            self.adjust_scroll();
        }
    }

    pub fn move_up(&mut self) {
        self.move_vertically(-1);
    }

    pub fn move_down(&mut self) {
        self.move_vertically(1);
    }

    fn move_vertically(&mut self, delta: isize) {
        if self.mode == EditMode::SingleLine {
            return;
        }
        let lines = layout::wrap_ranges(&self.content, self.width);
        let current = line_containing(&lines, self.caret);
        let Some(target) = current.checked_add_signed(delta) else {
            return;
        };
        let Some(line) = lines.get(target) else {
            return;
        };
        let column = str_width(&self.content[lines[current].start..self.caret]);
        self.caret = layout::offset_at_column(&self.content, line.clone(), column);
    }

    pub fn move_to_line_top(&mut self) {
        self.caret = match self.mode {
            EditMode::SingleLine => 0,
            EditMode::MultiLine => self.content[..self.caret]
                .rfind('\n')
                .map(|idx| idx + 1)
                .unwrap_or(0),
        };
        self.adjust_scroll();
    }

    pub fn move_to_line_bottom(&mut self) {
        self.caret = match self.mode {
            EditMode::SingleLine => self.content.len(),
            EditMode::MultiLine => self.content[self.caret..]
                .find('\n')
                .map(|idx| self.caret + idx)
                .unwrap_or(self.content.len()),
        };
        self.adjust_scroll();
    }

    /// Wrapped display lines of the draft at the current width.
    pub fn display_lines(&self) -> Vec<&str> {
        layout::wrap_lines(&self.content, self.width)
    }

    /// Text visible in a single-line field, starting at the scroll offset.
    pub fn visible_text(&self) -> &str {
        &self.content[self.scroll..]
    }

    /// Caret cell relative to the top-left of the edit area.
    pub fn cursor_cell(&self) -> (usize, usize) {
        match self.mode {
            EditMode::SingleLine => (str_width(&self.content[self.scroll..self.caret]), 0),
            EditMode::MultiLine => {
                let lines = layout::wrap_ranges(&self.content, self.width);
                let row = line_containing(&lines, self.caret);
                let column = str_width(&self.content[lines[row].start..self.caret]);
                if column >= self.width {
                    (0, row + 1)
                } else {
                    (column, row)
                }
            }
        }
    }

    fn adjust_scroll(&mut self) {
        if self.mode != EditMode::SingleLine {
            self.scroll = 0;
            return;
        }
        if self.caret < self.scroll {
            self.scroll = self.caret;
        }
        // One column is taken by the command prompt.
        let visible = self.width.saturating_sub(1);
        let limit = visible.saturating_sub(SCROLL_MARGIN).max(1);
        let margin = SCROLL_MARGIN.min(limit);
        while str_width(&self.content[self.scroll..self.caret]) > limit {
            match self.content[self.scroll..].chars().next() {
                Some(ch) => self.scroll += ch.len_utf8(),
                None => break,
            }
        }
        while self.scroll > 0 && str_width(&self.content[self.scroll..self.caret]) < margin {
            match self.content[..self.scroll].chars().next_back() {
                Some(ch) => self.scroll -= ch.len_utf8(),
                None => break,
            }
        }
    }
}

fn line_containing(lines: &[std::ops::Range<usize>], offset: usize) -> usize {
    lines
        .iter()
        .rposition(|line| line.start <= offset)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn buffer() -> TextBuffer {
        TextBuffer::new(80)
    }

    #[test]
    fn insert_and_delete_multibyte() {
        let mut buf = buffer();
        buf.insert_char('a');
        buf.insert_char('あ');
        buf.insert_char('0');
        assert_eq!(buf.content().as_bytes(), "aあ0".as_bytes());
        assert_eq!(buf.content().len(), 5);
        assert_eq!(buf.caret(), 5);

        buf.delete_backward();
        assert_eq!(buf.content(), "aあ");
        assert_eq!(buf.caret(), 4);

        buf.delete_backward();
        assert_eq!(buf.content(), "a");
        assert_eq!(buf.caret(), 1);
    }

    #[test]
    fn delete_at_start_is_a_no_op() {
        let mut buf = buffer();
        buf.set_content("a");
        buf.move_backward();
        buf.delete_backward();
        assert_eq!(buf.content(), "a");
        assert_eq!(buf.caret(), 0);
        buf.move_backward();
        assert_eq!(buf.caret(), 0);
    }

    #[test]
    fn editing_in_the_middle_of_wide_text() {
        let mut buf = buffer();
        buf.set_content("あめんぼあかいな、あいうえお");
        for _ in 0..5 {
            buf.move_backward();
        }
        buf.delete_backward();
        assert_eq!(buf.content(), "あめんぼあかいなあいうえお");
        assert_eq!(buf.caret(), "あめんぼあかいな".len());

        buf.move_forward();
        buf.move_forward();
        buf.delete_backward();
        buf.delete_backward();
        buf.insert_char('愛');
        assert_eq!(buf.content(), "あめんぼあかいな愛うえお");
        assert_eq!(buf.caret(), "あめんぼあかいな愛".len());

        buf.move_to_line_bottom();
        buf.insert_char('!');
        buf.move_backward();
        buf.delete_backward();
        buf.insert_char('尾');
        assert_eq!(buf.content(), "あめんぼあかいな愛うえ尾!");
        assert_eq!(buf.caret(), "あめんぼあかいな愛うえ尾".len());
    }

    #[test]
    fn move_forward_stops_at_end() {
        let mut buf = buffer();
        buf.set_content("ab");
        buf.move_forward();
        assert_eq!(buf.caret(), 2);
    }

    #[test]
    fn move_up_then_insert_lands_at_column_zero() {
        let mut buf = buffer();
        buf.set_content("あaい\n");
        buf.move_up();
        assert_eq!(buf.caret(), 0);
        buf.insert_char('う');
        assert_eq!(buf.content(), "うあaい\n");
        assert_eq!(buf.caret(), 'う'.len_utf8());
    }

    #[test]
    fn vertical_moves_keep_the_display_column() {
        let mut buf = buffer();
        buf.set_content("abcdef\nあいう\nxy");
        // caret at end of "xy", column 2
        buf.move_up();
        assert_eq!(&buf.content()[..buf.caret()], "abcdef\nあ");
        buf.move_up();
        assert_eq!(&buf.content()[..buf.caret()], "ab");
        buf.move_up();
        assert_eq!(&buf.content()[..buf.caret()], "ab");

        buf.move_to_line_bottom();
        buf.move_down();
        assert_eq!(&buf.content()[..buf.caret()], "abcdef\nあいう");
        buf.move_down();
        assert_eq!(buf.caret(), buf.content().len());
        buf.move_down();
        assert_eq!(buf.caret(), buf.content().len());
    }

    #[test]
    fn vertical_moves_follow_soft_wraps() {
        let mut buf = TextBuffer::new(4);
        buf.set_content("abcdefgh");
        buf.move_up();
        assert_eq!(buf.caret(), 4);
        buf.move_backward();
        buf.move_down();
        assert_eq!(buf.caret(), 7);
    }

    #[test]
    fn vertical_moves_are_ignored_in_single_line_mode() {
        let mut buf = buffer();
        buf.set_mode(EditMode::SingleLine);
        buf.set_content("ab\ncd");
        buf.move_up();
        assert_eq!(buf.caret(), 5);
    }

    #[test]
    fn line_breaks_are_capped() {
        let mut buf = buffer();
        for _ in 0..6 {
            buf.insert_line_break();
        }
        assert_eq!(buf.content(), "\n\n\n");
        assert_eq!(buf.display_lines().len(), MAX_DRAFT_LINES);
    }

    #[test]
    fn line_top_and_bottom_follow_logical_lines() {
        let mut buf = buffer();
        buf.set_content("first\nsecond\nthird");
        buf.move_up();
        buf.move_to_line_top();
        assert_eq!(&buf.content()[..buf.caret()], "first\n");
        buf.move_to_line_bottom();
        assert_eq!(&buf.content()[..buf.caret()], "first\nsecond");

        buf.set_mode(EditMode::SingleLine);
        buf.move_to_line_top();
        assert_eq!(buf.caret(), 0);
        buf.move_to_line_bottom();
        assert_eq!(buf.caret(), buf.content().len());
    }

    #[test]
    fn seed_places_caret_before_suffix() {
        let mut buf = buffer();
        buf.seed("@alice ", " #sig");
        assert_eq!(buf.content(), "@alice  #sig");
        assert_eq!(buf.caret(), "@alice ".len());
    }

    #[test]
    fn single_line_field_scrolls_to_keep_caret_visible() {
        let mut buf = TextBuffer::new(11);
        buf.set_mode(EditMode::SingleLine);
        for ch in "abcdefghijkl".chars() {
            buf.insert_char(ch);
        }
        // 10 visible columns, caret kept 4 columns away from the right edge.
        assert_eq!(buf.scroll_offset(), 6);
        assert_eq!(buf.cursor_cell(), (6, 0));
        assert_eq!(buf.visible_text(), "ghijkl");

        for _ in 0..4 {
            buf.move_backward();
        }
        assert_eq!(buf.cursor_cell().0, SCROLL_MARGIN.min(6));
        buf.move_to_line_top();
        assert_eq!(buf.scroll_offset(), 0);
        assert_eq!(buf.cursor_cell(), (0, 0));
    }

    #[test]
    fn cursor_cell_wraps_at_full_width() {
        let mut buf = TextBuffer::new(4);
        buf.set_content("abcd");
        assert_eq!(buf.cursor_cell(), (0, 1));
        buf.move_backward();
        assert_eq!(buf.cursor_cell(), (3, 0));
    }

    proptest! {
        #[test]
        fn insert_then_delete_round_trips(text in "\\PC{0,24}", back in 0usize..30, ch in any::<char>()) {
            let mut buf = TextBuffer::new(20);
            buf.set_content(&text);
            for _ in 0..back {
                buf.move_backward();
            }
            let caret = buf.caret();
            buf.insert_char(ch);
            prop_assert_eq!(buf.caret(), caret + ch.len_utf8());
            buf.delete_backward();
            prop_assert_eq!(buf.content(), text.as_str());
            prop_assert_eq!(buf.caret(), caret);
        }

        #[test]
        fn caret_stays_on_char_boundary(text in "\\PC{0,24}", ops in proptest::collection::vec(0u8..9, 0..60)) {
            let mut buf = TextBuffer::new(7);
            buf.set_content(&text);
            for op in ops {
                match op {
                    0 => buf.insert_char('あ'),
                    1 => buf.insert_char('x'),
                    2 => buf.delete_backward(),
                    3 => buf.move_backward(),
                    4 => buf.move_forward(),
                    5 => buf.move_up(),
                    6 => buf.move_down(),
                    7 => buf.insert_line_break(),
                    _ => buf.set_mode(if buf.mode() == EditMode::SingleLine {
                        EditMode::MultiLine
                    } else {
                        EditMode::SingleLine
                    }),
                }
                prop_assert!(buf.content().is_char_boundary(buf.caret()));
                prop_assert!(buf.content().is_char_boundary(buf.scroll_offset()));
                prop_assert!(buf.scroll_offset() <= buf.caret());
            }
        }
    }
}

use std::cell::Cell;
use std::sync::Arc;

use crate::canvas::Canvas;
use crate::model::Post;
use crate::painter::{post_line_count, Painter};

#[derive(Debug)]
pub struct PostEntry {
    pub cursor: String,
    pub post: Arc<Post>,
    lines: Cell<Option<(u16, usize)>>,
}

impl PostEntry {
    pub fn new(cursor: impl Into<String>, post: Arc<Post>) -> Self {
        Self {
            cursor: cursor.into(),
            post,
            lines: Cell::new(None),
        }
    }

    fn line_count(&self, width: u16) -> usize {
        if let Some((cached_width, lines)) = self.lines.get() {
            if cached_width == width {
                return lines;
            }
        }
        let lines = post_line_count(&self.post, width);
        self.lines.set(Some((width, lines)));
        lines
    }
}

#[derive(Debug)]
pub enum Entry {
    Post(PostEntry),
    /// Marks the older end of a loaded run; selecting it pages further back.
    LoadMore,
    /// Takes the sentinel's place once the service has nothing older.
    Empty,
}

impl Entry {
    pub fn post(cursor: impl Into<String>, post: Arc<Post>) -> Self {
        Entry::Post(PostEntry::new(cursor, post))
    }

    pub fn line_count(&self, width: u16) -> usize {
        match self {
            Entry::Post(entry) => entry.line_count(width),
            Entry::LoadMore => 1,
            Entry::Empty => 0,
        }
    }

    pub fn post_id(&self) -> Option<&str> {
        match self {
            Entry::Post(entry) => Some(entry.post.id.as_str()),
            _ => None,
        }
    }

    pub fn as_post(&self) -> Option<&PostEntry> {
        match self {
            Entry::Post(entry) => Some(entry),
            _ => None,
        }
    }

    fn is_boundary(&self) -> bool {
        matches!(self, Entry::LoadMore | Entry::Empty)
    }
}

/// Drops entries repeating the post directly before them.
fn dedup_adjacent(entries: Vec<Entry>) -> Vec<Entry> {
    let mut out: Vec<Entry> = Vec::with_capacity(entries.len());
    for entry in entries {
        if let (Some(prev), Some(id)) = (out.last().and_then(Entry::post_id), entry.post_id()) {
            if prev == id {
                continue;
            }
        }
        out.push(entry);
    }
    out
}

/// A scrollable run of entries with one selected. `scroll` counts display
/// lines from the top of the first entry; `height` is the number of rows the
/// list itself gets, header rows excluded.
#[derive(Debug)]
pub struct Viewport {
    entries: Vec<Entry>,
    selected: usize,
    scroll: usize,
    header_lines: usize,
    width: u16,
    height: u16,
}

impl Viewport {
    /// A paged feed that has not loaded anything yet.
    pub fn new(width: u16, height: u16) -> Self {
        Self::with_entries(vec![Entry::LoadMore], width, height)
    }

    pub fn with_entries(entries: Vec<Entry>, width: u16, height: u16) -> Self {
        Self {
            entries,
            selected: 0,
            scroll: 0,
            header_lines: 0,
            width,
            height,
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected(&self) -> Option<&Entry> {
        self.entries.get(self.selected)
    }

    pub fn selected_post(&self) -> Option<&Arc<Post>> {
        self.selected().and_then(Entry::as_post).map(|entry| &entry.post)
    }

    pub fn scroll_lines(&self) -> usize {
        self.scroll
    }

    pub fn header_lines(&self) -> usize {
        self.header_lines
    }

    /// True while nothing but a boundary marker has been loaded.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Entry::is_boundary)
    }

    pub fn has_more(&self) -> bool {
        self.entries.iter().any(|entry| matches!(entry, Entry::LoadMore))
    }

    /// Cursor of the newest loaded item, the anchor for "check for newer".
    pub fn newest_cursor(&self) -> Option<&str> {
        self.entries
            .iter()
            .find_map(Entry::as_post)
            .map(|entry| entry.cursor.as_str())
    }

    /// Cursor of the oldest loaded item, the anchor for paging back.
    pub fn oldest_cursor(&self) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find_map(Entry::as_post)
            .map(|entry| entry.cursor.as_str())
    }

    fn visible_height(&self) -> usize {
        usize::from(self.height).saturating_sub(self.header_lines)
    }

    fn lines_before(&self, index: usize) -> usize {
        self.entries[..index.min(self.entries.len())]
            .iter()
            .map(|entry| entry.line_count(self.width))
            .sum()
    }

    fn total_lines(&self) -> usize {
        self.lines_before(self.entries.len())
    }

    fn selectable(&self, index: usize) -> bool {
        self.entries
            .get(index)
            .map_or(false, |entry| !matches!(entry, Entry::Empty))
    }

    /// Resizes the area given to header and list, then re-clamps.
    pub fn set_area(&mut self, width: u16, height: u16) {
        if self.width == width && self.height == height {
            return;
        }
        self.width = width;
        self.height = height;
        self.ensure_selected_visible();
    }

    pub fn set_header_lines(&mut self, lines: usize) {
        if self.header_lines == lines {
            return;
        }
        self.header_lines = lines;
        self.ensure_selected_visible();
    }

    /// Scrolls the least amount that brings the whole selected entry into
    /// view. An entry taller than the window is shown from its top.
    pub fn ensure_selected_visible(&mut self) {
        if self.entries.is_empty() {
            self.selected = 0;
            self.scroll = 0;
            return;
        }
        self.selected = self.selected.min(self.entries.len() - 1);
        let top = self.lines_before(self.selected);
        let bottom = top + self.entries[self.selected].line_count(self.width);
        let visible = self.visible_height();
        if bottom > self.scroll + visible {
            self.scroll = bottom.saturating_sub(visible);
        }
        if top < self.scroll {
            self.scroll = top;
        }
    }

    pub fn select_next(&mut self) {
        if self.selectable(self.selected + 1) {
            self.selected += 1;
            self.ensure_selected_visible();
        }
    }

    pub fn select_previous(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.ensure_selected_visible();
        }
    }

    pub fn select_first(&mut self) {
        self.selected = 0;
        self.scroll = 0;
    }

    pub fn select_last(&mut self) {
        let mut last = self.entries.len().saturating_sub(1);
        while last > 0 && !self.selectable(last) {
            last -= 1;
        }
        self.selected = last;
        self.scroll = self.total_lines().saturating_sub(self.visible_height());
        self.ensure_selected_visible();
    }

    pub fn page_down(&mut self) {
        let start = self.lines_before(self.selected);
        let visible = self.visible_height().max(1);
        while self.selectable(self.selected + 1) && self.lines_before(self.selected) < start + visible
        {
            self.selected += 1;
        }
        self.ensure_selected_visible();
    }

    pub fn page_up(&mut self) {
        let start = self.lines_before(self.selected);
        let visible = self.visible_height().max(1);
        while self.selected > 0 && self.lines_before(self.selected) + visible > start {
            self.selected -= 1;
        }
        self.ensure_selected_visible();
    }

    /// Puts newer entries on top. When content is already shown the
    /// selection and scroll shift with it so the view does not jump.
    pub fn prepend_entries(&mut self, new: Vec<Entry>) {
        let mut new = dedup_adjacent(new);
        if let (Some(last_new), Some(first_old)) = (
            new.last().and_then(Entry::post_id),
            self.entries.first().and_then(Entry::post_id),
        ) {
            if last_new == first_old {
                new.pop();
            }
        }
        if new.is_empty() {
            return;
        }
        if self.is_empty() {
            let had_more = !matches!(self.entries.as_slice(), [Entry::Empty]);
            self.entries = new;
            self.entries.push(if had_more {
                Entry::LoadMore
            } else {
                Entry::Empty
            });
            self.selected = 0;
            self.scroll = 0;
            return;
        }
        let added_lines: usize = new.iter().map(|entry| entry.line_count(self.width)).sum();
        let added = new.len();
        new.append(&mut self.entries);
        self.entries = new;
        self.selected += added;
        self.scroll += added_lines;
    }

    /// Splices an older page in front of the trailing sentinel. An empty page
    /// (after dropping the overlap with the loaded run) ends pagination.
    pub fn merge_older_entries(&mut self, new: Vec<Entry>) {
        let Some(boundary) = self.entries.iter().position(Entry::is_boundary) else {
            return;
        };
        let sentinel_selected = self.selected >= boundary;
        let mut new = dedup_adjacent(new);
        if let (Some(last_old), Some(first_new)) = (
            self.entries[..boundary].last().and_then(Entry::post_id),
            new.first().and_then(Entry::post_id),
        ) {
            if last_old == first_new {
                new.remove(0);
            }
        }
        self.entries.truncate(boundary);
        let inserted = new.len();
        self.entries.extend(new);
        self.entries.push(if inserted == 0 {
            Entry::Empty
        } else {
            Entry::LoadMore
        });
        if sentinel_selected {
            self.selected = if inserted > 0 {
                boundary
            } else {
                boundary.saturating_sub(1)
            };
            self.ensure_selected_visible();
        }
    }

    /// Adds an entry at the bottom of a run without a sentinel.
    pub fn push_entry(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Takes the entries out, leaving an unloaded feed behind.
    pub fn take_entries(&mut self) -> Vec<Entry> {
        self.selected = 0;
        self.scroll = 0;
        std::mem::replace(&mut self.entries, vec![Entry::LoadMore])
    }

    pub fn replace_entries(&mut self, entries: Vec<Entry>) {
        self.entries = entries;
        self.selected = 0;
        self.scroll = 0;
    }

    /// Draws the visible entries into `canvas`, which covers the list rows
    /// only. Entries wholly above the window are skipped without painting.
    pub fn render(&self, canvas: &mut Canvas, painter: &Painter) {
        let height = i64::from(canvas.height());
        let mut y = -(self.scroll as i64);
        for (index, entry) in self.entries.iter().enumerate() {
            if y >= height {
                break;
            }
            let lines = entry.line_count(self.width) as i64;
            if y + lines > 0 {
                let selected = index == self.selected;
                match entry {
                    Entry::Post(post) => painter.paint_post(canvas, y, &post.post, selected),
                    Entry::LoadMore => painter.paint_load_more(canvas, y, selected),
                    Entry::Empty => {}
                }
            }
            y += lines;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sample_post;
    use crate::painter::LabelPalette;
    use chrono::Local;
    use proptest::prelude::*;
    use ratatui::buffer::Buffer;
    use ratatui::layout::Rect;

    fn item(id: &str) -> Entry {
        Entry::post(id, Arc::new(sample_post(id, "alice", "hello")))
    }

    fn items(ids: &[&str]) -> Vec<Entry> {
        ids.iter().map(|id| item(id)).collect()
    }

    fn ids(view: &Viewport) -> Vec<String> {
        view.entries()
            .iter()
            .map(|entry| match entry {
                Entry::Post(post) => post.post.id.clone(),
                Entry::LoadMore => "more".to_string(),
                Entry::Empty => "end".to_string(),
            })
            .collect()
    }

    #[test]
    fn prepend_into_unloaded_feed_keeps_position() {
        let mut view = Viewport::new(40, 10);
        view.prepend_entries(items(&["2", "1"]));
        assert_eq!(ids(&view), vec!["2", "1", "more"]);
        assert_eq!(view.selected_index(), 0);
        assert_eq!(view.scroll_lines(), 0);
    }

    #[test]
    fn prepend_onto_content_shifts_selection_and_scroll() {
        let mut view = Viewport::new(40, 10);
        view.prepend_entries(items(&["2", "1"]));
        view.select_next();
        view.prepend_entries(items(&["4", "3"]));
        assert_eq!(ids(&view), vec!["4", "3", "2", "1", "more"]);
        assert_eq!(view.selected_index(), 3);
        // each post is three lines wide at this width
        assert_eq!(view.scroll_lines(), 6);
        assert_eq!(view.selected_post().unwrap().id, "1");
    }

    #[test]
    fn prepend_drops_overlap_with_newest() {
        let mut view = Viewport::new(40, 10);
        view.prepend_entries(items(&["2", "1"]));
        view.prepend_entries(items(&["3", "2"]));
        assert_eq!(ids(&view), vec!["3", "2", "1", "more"]);
        assert_eq!(view.selected_index(), 1);
    }

    #[test]
    fn merge_older_drops_boundary_duplicate() {
        let mut view = Viewport::new(40, 10);
        view.prepend_entries(items(&["5", "4"]));
        view.merge_older_entries(items(&["4", "3", "2"]));
        assert_eq!(ids(&view), vec!["5", "4", "3", "2", "more"]);
    }

    #[test]
    fn merge_older_moves_selection_off_sentinel() {
        let mut view = Viewport::new(40, 6);
        view.prepend_entries(items(&["5", "4"]));
        view.select_last();
        assert!(matches!(view.selected(), Some(Entry::LoadMore)));
        view.merge_older_entries(items(&["3", "2"]));
        assert_eq!(view.selected_index(), 2);
        assert_eq!(view.selected_post().unwrap().id, "3");
        // "3" spans lines 6..9, so it must end at the window's bottom edge
        assert_eq!(view.scroll_lines(), 3);
    }

    #[test]
    fn empty_older_page_ends_pagination() {
        let mut view = Viewport::new(40, 10);
        view.prepend_entries(items(&["2", "1"]));
        view.select_last();
        view.merge_older_entries(items(&["1"]));
        assert_eq!(ids(&view), vec!["2", "1", "end"]);
        assert!(!view.has_more());
        assert_eq!(view.selected_index(), 1);
        view.select_next();
        assert_eq!(view.selected_index(), 1);
    }

    #[test]
    fn keep_visible_scrolls_minimally() {
        let mut view = Viewport::new(40, 7);
        view.prepend_entries(items(&["5", "4", "3", "2", "1"]));
        view.select_next();
        assert_eq!(view.scroll_lines(), 0);
        view.select_next();
        assert_eq!(view.scroll_lines(), 2);
        view.select_previous();
        assert_eq!(view.scroll_lines(), 2);
        view.select_previous();
        assert_eq!(view.scroll_lines(), 0);
    }

    #[test]
    fn header_lines_shrink_the_window() {
        let mut view = Viewport::new(40, 7);
        view.prepend_entries(items(&["3", "2", "1"]));
        view.set_header_lines(4);
        view.select_next();
        assert_eq!(view.scroll_lines(), 3);
    }

    #[test]
    fn select_first_and_last() {
        let mut view = Viewport::new(40, 7);
        view.prepend_entries(items(&["3", "2", "1"]));
        view.select_last();
        assert_eq!(view.selected_index(), 3);
        assert_eq!(view.scroll_lines(), 3);
        view.select_first();
        assert_eq!((view.selected_index(), view.scroll_lines()), (0, 0));
    }

    #[test]
    fn paging_moves_by_a_window() {
        let mut view = Viewport::new(40, 6);
        view.prepend_entries(items(&["6", "5", "4", "3", "2", "1"]));
        view.page_down();
        assert_eq!(view.selected_index(), 2);
        view.page_up();
        assert_eq!(view.selected_index(), 0);
    }

    #[test]
    fn resize_reclamps_scroll() {
        let mut view = Viewport::new(40, 12);
        view.prepend_entries(items(&["3", "2", "1"]));
        view.select_next();
        view.select_next();
        assert_eq!(view.scroll_lines(), 0);
        view.set_area(40, 4);
        assert_eq!(view.scroll_lines(), 5);
    }

    #[test]
    fn cursors_follow_the_loaded_run() {
        let mut view = Viewport::new(40, 10);
        assert!(view.is_empty());
        assert_eq!(view.newest_cursor(), None);
        view.prepend_entries(items(&["3", "2"]));
        assert_eq!(view.newest_cursor(), Some("3"));
        assert_eq!(view.oldest_cursor(), Some("2"));
    }

    #[test]
    fn render_skips_entries_above_window() {
        let palette = LabelPalette::new();
        let painter = Painter::new(&palette, Local::now());
        let mut view = Viewport::new(20, 4);
        view.prepend_entries(items(&["2", "1"]));
        view.select_next();
        let area = Rect::new(0, 0, 20, 4);
        let mut buf = Buffer::empty(area);
        let mut canvas = Canvas::new(&mut buf, area);
        view.render(&mut canvas, &painter);
        assert_eq!(view.scroll_lines(), 2);
        assert_eq!(Canvas::row_text(&buf, 0), "  now");
        assert_eq!(Canvas::row_text(&buf, 1), "  @alice ALICE");
        assert_eq!(Canvas::row_text(&buf, 3), "  now");
    }

    #[derive(Debug, Clone)]
    enum Move {
        Next,
        Previous,
        First,
        Last,
        PageDown,
        PageUp,
    }

    fn moves() -> impl Strategy<Value = Move> {
        prop_oneof![
            Just(Move::Next),
            Just(Move::Previous),
            Just(Move::First),
            Just(Move::Last),
            Just(Move::PageDown),
            Just(Move::PageUp),
        ]
    }

    proptest! {
        #[test]
        fn selection_stays_in_range(
            count in 0usize..12,
            height in 1u16..20,
            steps in proptest::collection::vec(moves(), 0..40),
        ) {
            let mut view = Viewport::new(30, height);
            let ids: Vec<String> = (0..count).rev().map(|id| id.to_string()).collect();
            view.prepend_entries(ids.iter().map(|id| item(id)).collect());
            for step in steps {
                match step {
                    Move::Next => view.select_next(),
                    Move::Previous => view.select_previous(),
                    Move::First => view.select_first(),
                    Move::Last => view.select_last(),
                    Move::PageDown => view.page_down(),
                    Move::PageUp => view.page_up(),
                }
                prop_assert!(view.selected_index() < view.entries().len());
            }
        }

        #[test]
        fn merge_never_leaves_adjacent_duplicates(
            loaded in proptest::collection::vec(0u8..6, 0..8),
            older in proptest::collection::vec(0u8..6, 0..8),
        ) {
            let mut view = Viewport::new(30, 10);
            view.prepend_entries(loaded.iter().map(|id| item(&id.to_string())).collect());
            view.merge_older_entries(older.iter().map(|id| item(&id.to_string())).collect());
            let ids: Vec<Option<&str>> = view.entries().iter().map(Entry::post_id).collect();
            for pair in ids.windows(2) {
                if let (Some(a), Some(b)) = (pair[0], pair[1]) {
                    prop_assert_ne!(a, b);
                }
            }
        }
    }
}

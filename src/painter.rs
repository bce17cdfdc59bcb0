use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::ops::Range;

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use parking_lot::RwLock;
use ratatui::style::Color;

use crate::canvas::Canvas;
use crate::layout::{centered, wrap_lines};
use crate::model::{Post, Profile};

pub const COLOR_BG: Color = Color::Reset;
pub const COLOR_TEXT: Color = Color::White;
pub const COLOR_DIM: Color = Color::Indexed(241);
pub const COLOR_MARKER: Color = Color::Indexed(253);
pub const COLOR_LOWLIGHT: Color = Color::Indexed(238);
pub const COLOR_SENTINEL_SELECTED: Color = Color::Indexed(241);
pub const COLOR_HEADER_BG: Color = Color::Indexed(236);
pub const COLOR_BAR_BG: Color = Color::Indexed(238);
pub const COLOR_BOOSTED_LABEL: Color = Color::Indexed(213);
pub const COLOR_HASHTAG: Color = Color::Blue;
pub const COLOR_FAVOURITE: Color = Color::Yellow;
pub const COLOR_BOOST: Color = Color::Green;
pub const COLOR_NOTICE: Color = Color::Red;
pub const COLOR_REPLY: Color = Color::Cyan;

const LABEL_COLORS: [Color; 18] = [
    Color::Red,
    Color::Green,
    Color::Indexed(39),
    Color::Indexed(40),
    Color::Indexed(63),
    Color::Indexed(65),
    Color::Indexed(69),
    Color::Indexed(99),
    Color::Indexed(109),
    Color::Indexed(118),
    Color::Indexed(123),
    Color::Indexed(125),
    Color::Indexed(129),
    Color::Indexed(149),
    Color::Indexed(159),
    Color::Indexed(166),
    Color::Indexed(215),
    Color::Indexed(226),
];

const LOAD_MORE_LABEL: &str = " ⟳ Load more";

/// Columns taken by the colour gutter and the selection marker.
pub const GUTTER: u16 = 2;

/// Per-author label colours. The colour is derived from a hash of the author
/// id and remembered for the life of the process.
#[derive(Debug, Default)]
pub struct LabelPalette {
    assigned: RwLock<HashMap<String, Color>>,
}

impl LabelPalette {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn color_for(&self, author_id: &str) -> Color {
        if let Some(color) = self.assigned.read().get(author_id) {
            return *color;
        }
        let mut hasher = DefaultHasher::new();
        author_id.hash(&mut hasher);
        let color = LABEL_COLORS[(hasher.finish() % LABEL_COLORS.len() as u64) as usize];
        self.assigned.write().insert(author_id.to_string(), color);
        color
    }
}

pub fn relative_age<Tz: TimeZone>(created: &DateTime<Tz>, now: &DateTime<Tz>) -> String {
    let secs = now
        .clone()
        .signed_duration_since(created.clone())
        .num_seconds();
    if secs <= 30 {
        return "now".to_string();
    }
    if secs <= 5 * 60 {
        return "A few minutes ago".to_string();
    }
    if secs <= 2 * 3600 {
        return format!("{} minutes ago", secs / 60);
    }
    if secs <= 36 * 3600 {
        return format!("{} hours ago", secs / 3600);
    }
    let stamp = format!(
        "{}/{}/{} {:02}:{:02}",
        created.year(),
        created.month(),
        created.day(),
        created.hour(),
        created.minute()
    );
    if secs <= 14 * 86400 {
        let mut days = secs / 86400;
        if now.hour() >= 6 && secs % 86400 > 0 {
            days += 1;
        }
        return format!("{stamp} ({days} days ago)");
    }
    stamp
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Plain,
    Mention,
    Hashtag,
}

fn is_handle_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Splits one display line into plain, `@mention` and `#hashtag` runs.
///
/// A mention starts at `@` followed by a handle character and ends at the
/// first non-handle character. A hashtag starts at a `#` opening the line or
/// at a space followed by `#`, and runs until a space not followed by `#`.
pub fn tokenize(line: &str) -> Vec<(Range<usize>, Token)> {
    let chars: Vec<(usize, char)> = line.char_indices().collect();
    let mut runs: Vec<(Range<usize>, Token)> = Vec::new();
    let mut state = Token::Plain;
    for (i, &(idx, ch)) in chars.iter().enumerate() {
        let next = chars.get(i + 1).map(|(_, c)| *c);
        match state {
            Token::Plain => {
                if let Some(next) = next {
                    if ch == '@' {
                        if is_handle_char(next) {
                            state = Token::Mention;
                        }
                    } else {
                        let after_hash = if ch == ' ' && next == '#' {
                            Some(chars.get(i + 2).map(|(_, c)| *c))
                        } else if ch == '#' && i == 0 {
                            Some(Some(next))
                        } else {
                            None
                        };
                        if let Some(after) = after_hash {
                            if after != Some(' ') {
                                state = Token::Hashtag;
                            }
                        }
                    }
                }
            }
            Token::Mention => {
                if !is_handle_char(ch) {
                    state = Token::Plain;
                }
            }
            Token::Hashtag => {
                if ch == ' ' && next != Some('#') {
                    state = Token::Plain;
                }
            }
        }
        let end = idx + ch.len_utf8();
        match runs.last_mut() {
            Some((range, token)) if *token == state => range.end = end,
            _ => runs.push((idx..end, state)),
        }
    }
    runs
}

fn body_width(width: u16) -> usize {
    usize::from(width.saturating_sub(GUTTER)).max(1)
}

/// Display lines of a post: author line, wrapped body, metadata line.
pub fn post_line_count(post: &Post, width: u16) -> usize {
    2 + wrap_lines(&post.shown().text, body_width(width)).len()
}

fn bio_lines(profile: &Profile, width: u16) -> Vec<String> {
    textwrap::wrap(&profile.bio, usize::from(width).max(1))
        .into_iter()
        .map(|line| line.into_owned())
        .collect()
}

pub fn profile_header_lines(profile: &Profile, width: u16) -> usize {
    3 + bio_lines(profile, width).len()
}

pub struct Painter<'a> {
    palette: &'a LabelPalette,
    now: DateTime<Local>,
}

impl<'a> Painter<'a> {
    pub fn new(palette: &'a LabelPalette, now: DateTime<Local>) -> Self {
        Self { palette, now }
    }

    fn gutter(&self, canvas: &mut Canvas, y: i64, label: Color, selected: bool) {
        canvas.set_cell(0, y, ' ', COLOR_TEXT, label);
        let marker = if selected { COLOR_MARKER } else { COLOR_BG };
        canvas.set_cell(1, y, ' ', COLOR_TEXT, marker);
    }

    /// Draws `post` with its author line at row `y`.
    pub fn paint_post(&self, canvas: &mut Canvas, y: i64, post: &Post, selected: bool) {
        let shown = post.shown();
        let (label, booster) = if post.boost_of.is_some() {
            (
                COLOR_BOOSTED_LABEL,
                Some((&post.author, self.palette.color_for(&post.author.id))),
            )
        } else {
            (self.palette.color_for(&post.author.id), None)
        };

        let mut row = y;
        self.gutter(canvas, row, label, selected);
        let mut x = canvas.text(
            GUTTER,
            row,
            &format!("@{}", shown.author.handle),
            label,
            COLOR_BG,
        );
        if !shown.author.display_name.is_empty() {
            x = canvas.text(
                x,
                row,
                &format!(" {}", shown.author.display_name),
                COLOR_TEXT,
                COLOR_BG,
            );
        }
        if shown.is_favourited() {
            x = canvas.text(x, row, " ★", COLOR_FAVOURITE, COLOR_BG);
        }
        if shown.is_boosted() {
            x = canvas.text(x, row, " ", COLOR_TEXT, COLOR_BG);
            x = canvas.text(x, row, "BT", COLOR_BOOST, COLOR_LOWLIGHT);
        }
        if let Some((by, color)) = booster {
            x = canvas.text(x, row, " Boosted by ", COLOR_NOTICE, COLOR_BG);
            canvas.text(x, row, &format!("@{}", by.handle), color, COLOR_BG);
        }
        row += 1;

        for line in wrap_lines(&shown.text, body_width(canvas.width())) {
            self.gutter(canvas, row, label, selected);
            self.paint_highlighted(canvas, GUTTER, row, line);
            row += 1;
        }

        self.gutter(canvas, row, label, selected);
        let created = shown.created_at.with_timezone(&Local);
        let mut x = canvas.text(
            GUTTER,
            row,
            &relative_age(&created, &self.now),
            COLOR_DIM,
            COLOR_BG,
        );
        if shown.replies_count > 0 {
            x = canvas.text(
                x,
                row,
                &format!(" Re {}", shown.replies_count),
                COLOR_REPLY,
                COLOR_BG,
            );
        }
        if shown.boosts_count > 0 {
            x = canvas.text(
                x,
                row,
                &format!(" BT {}", shown.boosts_count),
                COLOR_BOOST,
                COLOR_BG,
            );
        }
        if shown.favourites_count > 0 {
            canvas.text(
                x,
                row,
                &format!(" Fav {}", shown.favourites_count),
                COLOR_FAVOURITE,
                COLOR_BG,
            );
        }
    }

    fn paint_highlighted(&self, canvas: &mut Canvas, x: u16, y: i64, line: &str) {
        let mut x = x;
        for (range, token) in tokenize(line) {
            let (fg, bg) = match token {
                Token::Plain => (COLOR_TEXT, COLOR_BG),
                Token::Mention => (COLOR_TEXT, COLOR_LOWLIGHT),
                Token::Hashtag => (COLOR_HASHTAG, COLOR_BG),
            };
            x = canvas.text(x, y, &line[range], fg, bg);
        }
    }

    pub fn paint_load_more(&self, canvas: &mut Canvas, y: i64, selected: bool) {
        let bg = if selected {
            COLOR_SENTINEL_SELECTED
        } else {
            COLOR_BG
        };
        canvas.fill_line(0, y, bg);
        canvas.text(0, y, LOAD_MORE_LABEL, COLOR_TEXT, bg);
    }

    pub fn paint_placeholder(&self, canvas: &mut Canvas, y: i64, text: &str) {
        canvas.text(GUTTER, y, text, COLOR_DIM, COLOR_BG);
    }

    pub fn paint_profile_header(&self, canvas: &mut Canvas, profile: &Profile) {
        let width = canvas.width();
        let rows = profile_header_lines(profile, width);
        for row in 0..rows {
            canvas.fill_line(0, row as i64, COLOR_HEADER_BG);
        }

        let label = self.palette.color_for(&profile.id);
        let mut x = canvas.text(
            0,
            0,
            &format!("@{}", profile.handle),
            label,
            COLOR_HEADER_BG,
        );
        x = canvas.text(
            x,
            0,
            &format!(" {}", profile.display_name),
            COLOR_TEXT,
            COLOR_HEADER_BG,
        );
        if profile.locked {
            x = canvas.text(x, 0, " [Locked]", COLOR_NOTICE, COLOR_HEADER_BG);
        }
        if profile.following {
            canvas.text(x, 0, " [Following]", COLOR_BOOST, COLOR_HEADER_BG);
        }

        let mut row = 1;
        for line in bio_lines(profile, width) {
            self.paint_highlighted_on(canvas, row, &line);
            row += 1;
        }
        canvas.text(
            0,
            row,
            &format!("URL: {}", profile.url),
            COLOR_TEXT,
            COLOR_HEADER_BG,
        );
        row += 1;

        let column = usize::from(width) / 3;
        let counters = [
            format!("Posts: {}", profile.posts_count),
            format!("Following: {}", profile.following_count),
            format!("Followers: {}", profile.followers_count),
        ];
        for (i, counter) in counters.iter().enumerate() {
            canvas.text(
                (i * column) as u16,
                row,
                &centered(counter, column),
                COLOR_TEXT,
                COLOR_HEADER_BG,
            );
        }
    }

    fn paint_highlighted_on(&self, canvas: &mut Canvas, y: i64, line: &str) {
        let mut x = 0;
        for (range, token) in tokenize(line) {
            let (fg, bg) = match token {
                Token::Plain => (COLOR_TEXT, COLOR_HEADER_BG),
                Token::Mention => (COLOR_TEXT, COLOR_LOWLIGHT),
                Token::Hashtag => (COLOR_HASHTAG, COLOR_HEADER_BG),
            };
            x = canvas.text(x, y, &line[range], fg, bg);
        }
    }

    pub fn paint_list_header(&self, canvas: &mut Canvas, title: &str) {
        canvas.fill_line(0, 0, COLOR_HEADER_BG);
        canvas.text(0, 0, &format!("List: {title}"), COLOR_TEXT, COLOR_HEADER_BG);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sample_post;
    use chrono::{Duration, Utc};
    use ratatui::buffer::Buffer;
    use ratatui::layout::Rect;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn age_graduates_with_elapsed_time() {
        let now = at(2024, 3, 20, 12, 0);
        assert_eq!(relative_age(&now, &now), "now");
        assert_eq!(
            relative_age(&(now - Duration::seconds(30)), &now),
            "now"
        );
        assert_eq!(
            relative_age(&(now - Duration::minutes(4)), &now),
            "A few minutes ago"
        );
        assert_eq!(
            relative_age(&(now - Duration::minutes(42)), &now),
            "42 minutes ago"
        );
        assert_eq!(
            relative_age(&(now - Duration::hours(30)), &now),
            "30 hours ago"
        );
    }

    #[test]
    fn age_rounds_days_up_after_six() {
        let now = at(2024, 3, 20, 12, 0);
        let created = at(2024, 3, 17, 9, 5);
        assert_eq!(relative_age(&created, &now), "2024/3/17 09:05 (4 days ago)");

        let early = at(2024, 3, 20, 5, 0);
        let created = at(2024, 3, 17, 4, 0);
        assert_eq!(relative_age(&created, &early), "2024/3/17 04:00 (3 days ago)");
    }

    #[test]
    fn old_posts_show_only_the_date() {
        let now = at(2024, 3, 20, 12, 0);
        assert_eq!(relative_age(&at(2024, 1, 2, 8, 30), &now), "2024/1/2 08:30");
    }

    fn tokens(line: &str) -> Vec<(&str, Token)> {
        tokenize(line)
            .into_iter()
            .map(|(range, token)| (&line[range], token))
            .collect()
    }

    #[test]
    fn mentions_end_at_non_handle_chars() {
        assert_eq!(
            tokens("hi @alice_1, bye"),
            vec![
                ("hi ", Token::Plain),
                ("@alice_1", Token::Mention),
                (", bye", Token::Plain),
            ]
        );
        assert_eq!(tokens("mail @ home"), vec![("mail @ home", Token::Plain)]);
    }

    #[test]
    fn hashtags_start_at_line_start_or_after_space() {
        assert_eq!(
            tokens("#rust is #fun"),
            vec![
                ("#rust", Token::Hashtag),
                (" is", Token::Plain),
                (" #fun", Token::Hashtag),
            ]
        );
        assert_eq!(tokens("a#b"), vec![("a#b", Token::Plain)]);
        assert_eq!(
            tokens("#a #b c"),
            vec![("#a #b", Token::Hashtag), (" c", Token::Plain)]
        );
    }

    #[test]
    fn palette_is_stable_per_author() {
        let palette = LabelPalette::new();
        let first = palette.color_for("42");
        assert_eq!(palette.color_for("42"), first);
        assert!(LABEL_COLORS.contains(&first));
    }

    #[test]
    fn post_occupies_author_body_and_meta_lines() {
        let post = sample_post("1", "alice", "0123456789abcdef");
        assert_eq!(post_line_count(&post, 10), 4);
        assert_eq!(post_line_count(&post, 40), 3);
    }

    #[test]
    fn paints_post_rows() {
        let palette = LabelPalette::new();
        let painter = Painter::new(&palette, Local::now());
        let post = sample_post("1", "alice", "hello @bob");
        post.set_favourited(true);
        let area = Rect::new(0, 0, 30, 3);
        let mut buf = Buffer::empty(area);
        let mut canvas = Canvas::new(&mut buf, area);
        painter.paint_post(&mut canvas, 0, &post, true);
        assert_eq!(Canvas::row_text(&buf, 0), "  @alice ALICE ★");
        assert_eq!(Canvas::row_text(&buf, 1), "  hello @bob");
        assert_eq!(Canvas::row_text(&buf, 2), "  now");
        assert_eq!(buf.get(1, 1).bg, COLOR_MARKER);
        assert_eq!(buf.get(8, 1).bg, COLOR_LOWLIGHT);
    }

    #[test]
    fn boost_names_the_booster() {
        let palette = LabelPalette::new();
        let painter = Painter::new(&palette, Local::now());
        let mut boost = sample_post("2", "bob", "");
        boost.boost_of = Some(std::sync::Arc::new(sample_post("1", "alice", "hi")));
        let area = Rect::new(0, 0, 40, 3);
        let mut buf = Buffer::empty(area);
        let mut canvas = Canvas::new(&mut buf, area);
        painter.paint_post(&mut canvas, 0, &boost, false);
        assert_eq!(
            Canvas::row_text(&buf, 0),
            "  @alice ALICE Boosted by @bob"
        );
        assert_eq!(buf.get(0, 0).bg, COLOR_BOOSTED_LABEL);
    }

    #[test]
    fn profile_header_matches_its_line_count() {
        let palette = LabelPalette::new();
        let painter = Painter::new(&palette, Local::now());
        let profile = Profile {
            id: "7".into(),
            handle: "alice".into(),
            display_name: "Alice".into(),
            bio: "writes #rust".into(),
            url: "https://example.social/@alice".into(),
            following: true,
            posts_count: 12,
            ..Profile::default()
        };
        let area = Rect::new(0, 0, 45, 5);
        assert_eq!(profile_header_lines(&profile, area.width), 4);
        let mut buf = Buffer::empty(area);
        let mut canvas = Canvas::new(&mut buf, area);
        painter.paint_profile_header(&mut canvas, &profile);
        assert_eq!(Canvas::row_text(&buf, 0), "@alice Alice [Following]");
        assert_eq!(Canvas::row_text(&buf, 1), "writes #rust");
        assert_eq!(
            Canvas::row_text(&buf, 2),
            "URL: https://example.social/@alice"
        );
        assert!(Canvas::row_text(&buf, 3).contains("Posts: 12"));
        assert_eq!(Canvas::row_text(&buf, 4), "");
    }
}

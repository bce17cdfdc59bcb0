use std::ops::Range;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub fn char_width(ch: char) -> usize {
    UnicodeWidthChar::width(ch).unwrap_or(0)
}

pub fn str_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

/// Hard-wraps `text` into display lines of at most `width` columns.
///
/// Returned ranges are byte ranges into `text`. An embedded line break always
/// ends a line and belongs to neither neighbour, so `"a\n"` yields two lines,
/// the second one empty. The result is never empty.
pub fn wrap_ranges(text: &str, width: usize) -> Vec<Range<usize>> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut start = 0;
    let mut used = 0;
    for (idx, ch) in text.char_indices() {
        if ch == '\n' {
            lines.push(start..idx);
            start = idx + ch.len_utf8();
            used = 0;
            continue;
        }
        let w = char_width(ch);
        if used > 0 && used + w > width {
            lines.push(start..idx);
            start = idx;
            used = 0;
        }
        used += w;
    }
    lines.push(start..text.len());
    lines
}

pub fn wrap_lines(text: &str, width: usize) -> Vec<&str> {
    wrap_ranges(text, width)
        .into_iter()
        .map(|range| &text[range])
        .collect()
}

pub fn line_count(text: &str, width: usize) -> usize {
    wrap_ranges(text, width).len()
}

/// Byte offset inside `line` (relative to `line.start`) whose display column
/// is the largest one not exceeding `column`.
pub fn offset_at_column(text: &str, line: Range<usize>, column: usize) -> usize {
    let mut used = 0;
    let mut offset = line.start;
    for (idx, ch) in text[line.clone()].char_indices() {
        let w = char_width(ch);
        if used + w > column {
            return line.start + idx;
        }
        used += w;
        offset = line.start + idx + ch.len_utf8();
    }
    offset
}

/// Pads `text` on both sides so it occupies `width` columns. When the padding
/// is odd the extra column goes to the left.
pub fn centered(text: &str, width: usize) -> String {
    let used = str_width(text);
    if used >= width {
        return text.to_string();
    }
    let pad = width - used;
    let right = pad / 2;
    let left = pad - right;
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(right))
}

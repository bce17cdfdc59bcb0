use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Style};

use crate::layout::str_width;

/// A clipped drawing surface over part of a frame buffer. Rows are signed so
/// callers can lay out content that starts above the visible area; anything
/// outside `area` is silently skipped.
pub struct Canvas<'a> {
    buf: &'a mut Buffer,
    area: Rect,
}

impl<'a> Canvas<'a> {
    pub fn new(buf: &'a mut Buffer, area: Rect) -> Self {
        let area = area.intersection(buf.area);
        Self { buf, area }
    }

    pub fn width(&self) -> u16 {
        self.area.width
    }

    pub fn height(&self) -> u16 {
        self.area.height
    }

    pub fn area(&self) -> Rect {
        self.area
    }

    /// A canvas over `rows` rows starting at row `top`, sharing this buffer.
    pub fn rows(&mut self, top: u16, rows: u16) -> Canvas<'_> {
        let top = top.min(self.area.height);
        let rows = rows.min(self.area.height - top);
        let area = Rect::new(self.area.x, self.area.y + top, self.area.width, rows);
        Canvas {
            buf: &mut *self.buf,
            area,
        }
    }

    fn row(&self, y: i64) -> Option<u16> {
        if y < 0 || y >= i64::from(self.area.height) {
            None
        } else {
            Some(self.area.y + y as u16)
        }
    }

    pub fn set_cell(&mut self, x: u16, y: i64, ch: char, fg: Color, bg: Color) {
        let Some(row) = self.row(y) else {
            return;
        };
        if x >= self.area.width {
            return;
        }
        self.buf
            .get_mut(self.area.x + x, row)
            .set_char(ch)
            .set_fg(fg)
            .set_bg(bg);
    }

    /// Draws `text` at column `x` of row `y` and returns the column after it.
    pub fn text(&mut self, x: u16, y: i64, text: &str, fg: Color, bg: Color) -> u16 {
        self.styled(x, y, text, Style::default().fg(fg).bg(bg))
    }

    pub fn styled(&mut self, x: u16, y: i64, text: &str, style: Style) -> u16 {
        let advance = x.saturating_add(str_width(text).min(u16::MAX as usize) as u16);
        let Some(row) = self.row(y) else {
            return advance;
        };
        if x >= self.area.width {
            return advance;
        }
        let room = usize::from(self.area.width - x);
        self.buf
            .set_stringn(self.area.x + x, row, text, room, style);
        advance
    }

    pub fn fill_line(&mut self, x: u16, y: i64, bg: Color) {
        if x >= self.area.width {
            return;
        }
        let blank = " ".repeat(usize::from(self.area.width - x));
        self.text(x, y, &blank, Color::Reset, bg);
    }

    #[cfg(test)]
    pub(crate) fn row_text(buf: &Buffer, y: u16) -> String {
        let mut line = String::new();
        for x in buf.area.x..buf.area.x + buf.area.width {
            line.push_str(buf.get(x, y).symbol());
        }
        line.trim_end().to_string()
    }
}

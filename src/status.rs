/// Seconds a transient status message stays up.
pub const STATUS_TTL_SECS: u32 = 3;

/// The one-line status message under the mode bar. A message set with a
/// time-to-live is cleared by the once-per-second tick that brings its
/// counter to zero.
#[derive(Debug, Default, Clone)]
pub struct StatusLine {
    text: String,
    remaining: u32,
}

impl StatusLine {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.remaining = 0;
    }

    pub fn set_with_ttl(&mut self, text: impl Into<String>, seconds: u32) {
        self.text = text.into();
        self.remaining = seconds;
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.remaining = 0;
    }

    /// Advances the countdown by one second. Returns true when the message
    /// was cleared. While `suppressed` the message survives its deadline.
    pub fn tick(&mut self, suppressed: bool) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        if self.remaining == 0 && !suppressed {
            self.text.clear();
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clears_exactly_on_last_tick() {
        let mut status = StatusLine::default();
        status.set_with_ttl("Load!", 3);
        assert!(!status.tick(false));
        assert_eq!(status.text(), "Load!");
        assert!(!status.tick(false));
        assert_eq!(status.text(), "Load!");
        assert!(status.tick(false));
        assert_eq!(status.text(), "");
    }

    #[test]
    fn plain_status_never_expires() {
        let mut status = StatusLine::default();
        status.set("Loading...");
        for _ in 0..10 {
            assert!(!status.tick(false));
        }
        assert_eq!(status.text(), "Loading...");
    }

    #[test]
    fn suppressed_tick_keeps_message() {
        let mut status = StatusLine::default();
        status.set_with_ttl("Posted!", 1);
        assert!(!status.tick(true));
        assert_eq!(status.text(), "Posted!");
        assert!(!status.tick(false));
    }

    #[test]
    fn new_message_restarts_countdown() {
        let mut status = StatusLine::default();
        status.set_with_ttl("first", 2);
        status.tick(false);
        status.set_with_ttl("second", 2);
        assert!(!status.tick(false));
        assert!(status.tick(false));
    }
}

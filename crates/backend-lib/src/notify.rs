//! User-facing notices ("flash messages").

use account_common::Notice;

/// Sink for transient notices shown on the next rendered page
pub trait Notifier {
    fn notify(&mut self, notice: Notice);

    fn info(&mut self, text: &str) {
        self.notify(Notice::info(text));
    }

    fn success(&mut self, text: &str) {
        self.notify(Notice::success(text));
    }

    fn error(&mut self, text: &str) {
        self.notify(Notice::error(text));
    }

    /// Error scoped to one form field
    fn field_error(&mut self, field: &str, text: &str) {
        self.notify(Notice::field_error(field, text));
    }
}

/// Collects notices in memory
impl Notifier for Vec<Notice> {
    fn notify(&mut self, notice: Notice) {
        self.push(notice);
    }
}

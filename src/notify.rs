use tracing::info;

/// Delivery port for timer completion.
///
/// Implementations are fire-and-forget: the signature has no error channel,
/// so a failed beep or OS notification can never propagate back into timer
/// logic. Sinks that fall back through several delivery mechanisms handle
/// that entirely on their side of the boundary.
pub trait NotificationSink: Send {
    fn on_timer_finished(&mut self, label: &str);
}

/// Sink that records completions on the log stream only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn on_timer_finished(&mut self, label: &str) {
        info!(label, "timer finished");
    }
}

/// Sink that drops completions. For embedders wiring notifications
/// somewhere else entirely (e.g. through the event queue).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl NotificationSink for NullNotifier {
    fn on_timer_finished(&mut self, _label: &str) {}
}

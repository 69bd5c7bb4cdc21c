//! User-visible notifications.

/// Surface for one-line error notifications shown to the end user.
pub trait Notifier: Send + Sync + 'static {
    fn error(&self, message: &str);
}

/// Notifier that reports through the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }
}

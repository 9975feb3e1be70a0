//! Failure reporting for watch cycles.

use crate::error::Error;
use crate::reload::{ReloadChannel, ReloadMessage};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::error;

/// Title shown with every failure notification.
pub const ERROR_TITLE: &str = "Compile Error";

/// User-facing notification of a failed cycle.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

/// Rings the terminal bell and prints the notification to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, title: &str, message: &str) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "\x07{title}: {message}");
    }
}

/// Does nothing. Tracing output is the only record.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuietNotifier;

impl Notifier for QuietNotifier {
    fn notify(&self, _title: &str, _message: &str) {}
}

/// Terminal step of a failed cycle.
///
/// Renders the failure, tells the user and any reload subscribers, then
/// bumps the completion counter so the controller (or a test) waiting on
/// the cycle is released.
pub struct ErrorSink {
    notifier: Arc<dyn Notifier>,
    reload: ReloadChannel,
    completed: watch::Sender<u64>,
}

impl ErrorSink {
    pub fn new(notifier: Arc<dyn Notifier>, reload: ReloadChannel) -> Self {
        let (completed, _) = watch::channel(0);
        Self {
            notifier,
            reload,
            completed,
        }
    }

    /// Report one failed cycle; returns the rendered message.
    pub fn report(&self, err: &Error) -> String {
        let description = err.to_string();
        let rendered = format!("{ERROR_TITLE}: {description}");
        error!(recoverable = err.is_recoverable(), "{rendered}");

        self.notifier.notify(ERROR_TITLE, &description);
        self.reload.send(ReloadMessage::Error {
            message: rendered.clone(),
        });
        self.completed.send_modify(|count| *count += 1);
        rendered
    }

    /// Number of failures reported so far, updated after each report.
    #[must_use]
    pub fn completions(&self) -> watch::Receiver<u64> {
        self.completed.subscribe()
    }
}

impl std::fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorSink")
            .field("reported", &*self.completed.borrow())
            .finish_non_exhaustive()
    }
}

//! Reload notifications.
//!
//! The watch controller is the only sender. Anything that wants to react to
//! a finished cycle (the CLI, a dev server) subscribes.

use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::trace;

const CAPACITY: usize = 16;

/// Message sent after every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReloadMessage {
    /// The artifact at `path` was rewritten.
    Reload { path: PathBuf },
    /// The cycle failed; `message` is the rendered error.
    Error { message: String },
}

/// Process-wide broadcast of [`ReloadMessage`]s.
#[derive(Debug, Clone)]
pub struct ReloadChannel {
    tx: broadcast::Sender<ReloadMessage>,
}

impl Default for ReloadChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadChannel {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CAPACITY);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.tx.subscribe()
    }

    /// Send to all current subscribers; returns how many received it.
    pub fn send(&self, message: ReloadMessage) -> usize {
        trace!(?message, "reload broadcast");
        // No subscribers is not an error.
        self.tx.send(message).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_messages_in_order() {
        let channel = ReloadChannel::new();
        let mut rx = channel.subscribe();

        assert_eq!(channel.send(ReloadMessage::Reload { path: "dist/js/main.js".into() }), 1);
        channel.send(ReloadMessage::Error { message: "boom".into() });

        assert_eq!(
            rx.recv().await.unwrap(),
            ReloadMessage::Reload { path: "dist/js/main.js".into() }
        );
        assert_eq!(rx.recv().await.unwrap(), ReloadMessage::Error { message: "boom".into() });
    }

    #[test]
    fn sending_without_subscribers_is_harmless() {
        let channel = ReloadChannel::new();
        assert_eq!(channel.send(ReloadMessage::Error { message: "x".into() }), 0);
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_string(&ReloadMessage::Error { message: "bad".into() }).unwrap();
        assert_eq!(json, r#"{"type":"error","message":"bad"}"#);
    }
}

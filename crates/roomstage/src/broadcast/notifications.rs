//! User-facing notifications.
//!
//! Delivery is someone else's concern: the core only hands notifications to
//! a [`NotificationSink`] and moves on.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// A notification raised by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    /// A style was applied and the result is ready.
    Completion { style: String },
    /// A result was saved locally.
    DownloadComplete { kind: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(flatten)]
    pub kind: NotificationKind,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            NotificationKind::Completion { style } => write!(f, "Your {} room is ready", style),
            NotificationKind::DownloadComplete { kind } => write!(f, "{} saved", kind),
        }
    }
}

/// Fire-and-forget notification delivery.
pub trait NotificationSink: Send + Sync {
    /// Raised by the orchestrator when a style workflow completes.
    fn notify_completion(&self, style: &str);

    /// Raised by the app shell after it has saved a result locally. The
    /// orchestrator itself never downloads anything.
    fn notify_download_complete(&self, kind: &str);
}

/// Broadcasts notifications to any number of subscribers.
#[derive(Clone)]
pub struct NotificationBroadcaster {
    sender: broadcast::Sender<Notification>,
}

impl NotificationBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn send(&self, notification: Notification) {
        // No receivers is fine
        let _ = self.sender.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl Default for NotificationBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}

impl NotificationSink for NotificationBroadcaster {
    fn notify_completion(&self, style: &str) {
        self.send(Notification::new(NotificationKind::Completion {
            style: style.to_string(),
        }));
    }

    fn notify_download_complete(&self, kind: &str) {
        self.send(Notification::new(NotificationKind::DownloadComplete {
            kind: kind.to_string(),
        }));
    }
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify_completion(&self, style: &str) {
        log::info!("Notification: {} style applied", style);
    }

    fn notify_download_complete(&self, kind: &str) {
        log::info!("Notification: {} download complete", kind);
    }
}

use tokio::sync::mpsc::Sender;
use tracing::info;

use crate::{Error, Result};

/// Urgency of a user-visible notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Informational.
    Info,
    /// Something degraded but recoverable.
    Warn,
    /// Something failed.
    Error,
}

/// A user-visible notice destined for whatever surface renders them.
#[derive(Debug, Clone)]
pub struct Notice {
    /// Urgency.
    pub kind: NoticeKind,
    /// Short title.
    pub title: String,
    /// Body text.
    pub text: String,
}

/// Sends user-visible notices to the UI layer.
#[derive(Clone)]
pub struct Dispatcher {
    /// Channel to the rendering surface.
    tx: Sender<Notice>,
}

impl Dispatcher {
    /// Create a new dispatcher from a notice channel.
    pub fn new(tx: Sender<Notice>) -> Self {
        Self { tx }
    }

    /// Send a notice with the given kind, title, and text.
    pub fn send_notice(&self, kind: NoticeKind, title: String, text: String) -> Result<()> {
        // Log every notice at info level regardless of urgency, for traceability.
        info!(kind = ?kind, title = %title, text = %text, "notice");
        self.tx
            .try_send(Notice { kind, title, text })
            .map_err(|_| Error::ChannelClosed)
    }

    /// Convenience helper to send an error notice.
    pub fn send_error(&self, title: &str, text: String) -> Result<()> {
        self.send_notice(NoticeKind::Error, title.to_string(), text)
    }
}

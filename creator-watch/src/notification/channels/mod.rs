//! Outbound delivery channels.
//!
//! Two seams are used by the poller:
//! - [`NotificationSink`] delivers subscriber messages
//! - [`DiagnosticSink`] carries operator-facing failure reports

mod diagnostics;
mod discord;
mod log_sink;

pub use diagnostics::DiagnosticReporter;
pub use discord::{DISCORD_API_BASE, DiscordClient, DiscordDirectMessages, DiscordLogChannel};
pub use log_sink::LogSink;

use async_trait::async_trait;

use crate::Result;

/// A file handed to operators alongside a diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub body: String,
}

impl Attachment {
    pub fn html_page(body: impl Into<String>) -> Self {
        Self {
            file_name: crate::config::ERROR_PAGE_FILE.to_string(),
            body: body.into(),
        }
    }
}

/// Delivery of a message to a single subscriber.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Channel type name, for logs.
    fn channel_type(&self) -> &'static str;

    /// Send `message` to `subscriber`. Failures are reported, never retried
    /// by the caller.
    async fn send(&self, subscriber: &str, message: &str) -> Result<()>;
}

/// Operator-facing diagnostics.
#[async_trait]
pub trait DiagnosticSink: Send + Sync {
    async fn report(&self, message: &str, attachment: Option<&Attachment>) -> Result<()>;
}

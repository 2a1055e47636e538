use async_trait::async_trait;
use tracing::{info, warn};

use super::{Attachment, DiagnosticSink, NotificationSink};
use crate::Result;

/// Sink that only writes to the log. Used when no chat credentials are set.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn channel_type(&self) -> &'static str {
        "log"
    }

    async fn send(&self, subscriber: &str, message: &str) -> Result<()> {
        info!(subscriber, "{}", message);
        Ok(())
    }
}

#[async_trait]
impl DiagnosticSink for LogSink {
    async fn report(&self, message: &str, attachment: Option<&Attachment>) -> Result<()> {
        match attachment {
            Some(attachment) => warn!(
                attachment = %attachment.file_name,
                bytes = attachment.body.len(),
                "{}",
                message
            ),
            None => warn!("{}", message),
        }
        Ok(())
    }
}

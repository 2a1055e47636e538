use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{error, warn};

use super::{Attachment, DiagnosticSink, DiscordLogChannel};
use crate::Result;
use crate::utils::fs::write_atomic;

/// Operator diagnostics: attachments land in the data directory, the message
/// goes to the log channel. Anything that fails degrades to a log line.
#[derive(Debug)]
pub struct DiagnosticReporter {
    attachment_dir: PathBuf,
    log_channel: Option<DiscordLogChannel>,
}

impl DiagnosticReporter {
    pub fn new(attachment_dir: impl Into<PathBuf>, log_channel: Option<DiscordLogChannel>) -> Self {
        Self {
            attachment_dir: attachment_dir.into(),
            log_channel,
        }
    }
}

#[async_trait]
impl DiagnosticSink for DiagnosticReporter {
    async fn report(&self, message: &str, attachment: Option<&Attachment>) -> Result<()> {
        let mut text = message.to_string();
        if let Some(attachment) = attachment {
            let path = self.attachment_dir.join(&attachment.file_name);
            match write_atomic(&path, attachment.body.as_bytes()).await {
                Ok(()) => text.push_str(&format!(" Page saved to {}.", attachment.file_name)),
                Err(e) => error!(error = %e, "Couldn't save diagnostic attachment"),
            }
        }

        match &self.log_channel {
            Some(channel) => {
                if let Err(e) = channel.post(&text).await {
                    warn!(error = %e, "Log channel unavailable: {}", text);
                }
            }
            None => warn!("{}", text),
        }
        Ok(())
    }
}

//! Local alarm hook for subscribers who want more than a message when an
//! account goes live.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{Error, Result};

#[async_trait]
pub trait AlarmHook: Send + Sync {
    async fn ring(&self, account: &str) -> Result<()>;
}

/// Runs a shell command, detached, with `CREATOR_WATCH_ACCOUNT` set.
#[derive(Debug, Clone)]
pub struct CommandAlarm {
    command: String,
}

impl CommandAlarm {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn shell_command(&self) -> tokio::process::Command {
        #[cfg(windows)]
        let mut cmd = {
            let mut cmd = tokio::process::Command::new("cmd");
            cmd.arg("/C").arg(&self.command);
            cmd
        };
        #[cfg(not(windows))]
        let mut cmd = {
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c").arg(&self.command);
            cmd
        };
        cmd.stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        cmd
    }
}

#[async_trait]
impl AlarmHook for CommandAlarm {
    async fn ring(&self, account: &str) -> Result<()> {
        let mut child = self
            .shell_command()
            .env("CREATOR_WATCH_ACCOUNT", account)
            .spawn()
            .map_err(|e| Error::Other(format!("couldn't start alarm command: {e}")))?;

        let account = account.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!(account, "Alarm command finished"),
                Ok(status) => warn!(account, %status, "Alarm command failed"),
                Err(e) => warn!(account, error = %e, "Couldn't wait for alarm command"),
            }
        });
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_command_sees_account() {
        let dir = tempfile::tempdir().expect("tempdir");
        let marker = dir.path().join("rang");
        let alarm = CommandAlarm::new(format!(
            "printf %s \"$CREATOR_WATCH_ACCOUNT\" > '{}'",
            marker.display()
        ));

        alarm.ring("abc").await.unwrap();

        let mut contents = String::new();
        for _ in 0..50 {
            if let Ok(text) = tokio::fs::read_to_string(&marker).await
                && !text.is_empty()
            {
                contents = text;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(contents, "abc");
    }
}

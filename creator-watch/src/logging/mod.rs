//! Logging setup: console plus daily rolling file, reloadable filter,
//! local-time timestamps and retention of old log files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

use crate::utils::fs;
use crate::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "creator_watch=info,profile_scraper=info";

/// Prefix of the rolling log files (`creator-watch.log.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "creator-watch.log";

/// Log retention period in days.
const LOG_RETENTION_DAYS: i64 = 7;

/// Timestamps in the host's local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

pub type FilterHandle = Handle<EnvFilter, tracing_subscriber::Registry>;

/// Runtime handle on the installed logging stack.
pub struct LoggingHandle {
    filter: FilterHandle,
    log_dir: PathBuf,
}

impl LoggingHandle {
    /// Replace the filter directive, e.g. `"creator_watch=debug"`.
    pub fn set_filter(&self, directive: &str) -> Result<()> {
        let new_filter = EnvFilter::try_new(directive)
            .map_err(|e| Error::config(format!("invalid filter directive: {e}")))?;
        self.filter
            .reload(new_filter)
            .map_err(|e| Error::Other(format!("failed to reload filter: {e}")))?;
        info!(directive, "Log filter updated");
        Ok(())
    }

    /// Apply the directive stored in `path`, if there is one. Returns
    /// whether the filter changed.
    pub async fn reload_filter_from(&self, path: &Path) -> Result<bool> {
        match fs::read_trimmed(path).await? {
            Some(directive) if !directive.is_empty() => {
                self.set_filter(&directive)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Re-read the filter file on every SIGHUP until `cancel` fires.
    #[cfg(unix)]
    pub fn start_filter_reload_on_hangup(
        self: &Arc<Self>,
        path: PathBuf,
        cancel: CancellationToken,
    ) {
        use tokio::signal::unix::{SignalKind, signal};

        let handle = Arc::clone(self);
        tokio::spawn(async move {
            let mut hangups = match signal(SignalKind::hangup()) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "Couldn't listen for SIGHUP; log filter is fixed");
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = hangups.recv() => {
                        if received.is_none() {
                            break;
                        }
                        match handle.reload_filter_from(&path).await {
                            Ok(true) => {}
                            Ok(false) => {
                                debug!(path = %path.display(), "No log filter file, keeping the current filter")
                            }
                            Err(e) => warn!(error = %e, "Couldn't reload log filter"),
                        }
                    }
                }
            }
        });
    }

    /// Delete old log files once a day until `cancel` fires.
    pub fn start_retention_cleanup(self: &Arc<Self>, cancel: CancellationToken) {
        let log_dir = self.log_dir.clone();

        tokio::spawn(async move {
            let cleanup_interval = Duration::from_secs(24 * 60 * 60);

            loop {
                if let Err(e) = cleanup_old_logs(&log_dir, LOG_RETENTION_DAYS).await {
                    warn!(error = %e, "Failed to clean up old logs");
                }
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Log retention cleanup task shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(cleanup_interval) => {}
                }
            }
        });
    }
}

/// Delete `creator-watch.log.*` files dated more than `retention_days` ago.
async fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> std::io::Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).date_naive();
    let prefix = format!("{LOG_FILE_PREFIX}.");

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(date) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|name| name.strip_prefix(&prefix))
            .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
        else {
            continue;
        };

        if date < cutoff {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    deleted += 1;
                    debug!(path = %path.display(), "Deleted old log file");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete old log file"),
            }
        }
    }

    if deleted > 0 {
        info!(count = deleted, "Cleaned up old log files");
    }
    Ok(deleted)
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the lifetime of the process or the file
/// writer stops flushing.
pub fn init_logging(log_dir: &Path) -> Result<(Arc<LoggingHandle>, WorkerGuard)> {
    fs::ensure_dir_all_sync_with_op("creating log directory", log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let initial_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (filter_layer, filter_handle) = reload::Layer::new(initial_filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer),
        )
        .try_init()
        .map_err(|e| Error::Other(format!("failed to set global default subscriber: {e}")))?;

    let handle = Arc::new(LoggingHandle {
        filter: filter_handle,
        log_dir: log_dir.to_path_buf(),
    });
    Ok((handle, guard))
}

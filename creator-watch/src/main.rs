use anyhow::Context;
use creator_watch::app::App;
use creator_watch::config::{AppConfig, LOG_FILTER_FILE};
use creator_watch::logging;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let (logging, _guard) = logging::init_logging(&config.log_dir).context("initialising logging")?;

    let cancel = CancellationToken::new();
    logging.start_retention_cleanup(cancel.child_token());

    let filter_file = config.data_file(LOG_FILTER_FILE);
    if let Err(e) = logging.reload_filter_from(&filter_file).await {
        warn!(error = %e, "Ignoring log filter file");
    }
    #[cfg(unix)]
    logging.start_filter_reload_on_hangup(filter_file, cancel.child_token());

    info!(data_dir = %config.data_dir.display(), "Starting creator-watch");
    let app = App::build(config).await.context("starting service")?;

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                shutdown.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    app.run(cancel).await;
    info!("creator-watch stopped");
    Ok(())
}

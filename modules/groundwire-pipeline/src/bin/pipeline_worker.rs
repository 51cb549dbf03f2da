use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use groundwire_common::{CancelFlag, Config};
use groundwire_pipeline::Orchestrator;
use groundwire_store::Db;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("groundwire=info".parse()?))
        .init();

    info!("pipeline worker starting");

    let config = Config::from_env();
    config.log_redacted();

    let db = Db::connect(&config.database_url, config.db_rps).await?;
    db.migrate().await?;

    let stop = CancelFlag::new();
    spawn_signal_handler(stop.clone());

    let orchestrator = Orchestrator::new(db, Duration::from_secs(config.poll_seconds), stop);
    orchestrator.run_forever().await
}

/// SIGTERM/SIGINT request a stop after the current run; nothing is killed
/// mid-stage.
fn spawn_signal_handler(stop: CancelFlag) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("sigterm handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("shutdown signal received, stopping after current run");
        stop.cancel();
    });
}

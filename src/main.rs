//! Worker entry point: loads configuration, runs migrations, and drives the
//! sync worker pool until shutdown.

use std::sync::Arc;

use anyhow::Context;
use migration::{Migrator, MigratorTrait};
use tokio_util::sync::CancellationToken;
use tracing::info;

use hubsync::{
    config::ConfigLoader,
    db::{health_check, init_pool},
    sync::Syncer,
    telemetry::init_tracing,
    worker::WorkerPool,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new().load()?;

    init_tracing(&config)?;
    info!(profile = %config.profile, "starting hubsync");
    if let Ok(redacted) = config.redacted_json() {
        info!(config = %redacted, "loaded configuration");
    }

    let db = Arc::new(init_pool(&config).await?);
    health_check(&db).await?;
    Migrator::up(db.as_ref(), None)
        .await
        .context("failed to run database migrations")?;

    let syncer = Syncer::with_api_base(Arc::clone(&db), config.github_api_base.clone());
    let pool = WorkerPool::new(Arc::clone(&db), syncer, config.worker.clone());

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        signal_token.cancel();
    });

    pool.run(shutdown).await?;
    info!("hubsync stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

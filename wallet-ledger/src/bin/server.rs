//! Wallet HTTP server binary

use anyhow::Context;
use std::future::IntoFuture;
use std::sync::Arc;
use wallet_ledger::{
    api::{self, AppState},
    spawn_synchronizer, Config, LedgerStore, Metrics, RocksGateway, WriteBackSynchronizer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting wallet ledger server");

    let config = match std::env::var("WALLET_CONFIG") {
        Ok(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => Config::from_env()?,
    };
    config.validate()?;

    let metrics = Metrics::new().context("registering metrics")?;
    let store = Arc::new(LedgerStore::new());
    let gateway = Arc::new(RocksGateway::open(&config).context("opening durable store")?);

    let synchronizer = Arc::new(
        WriteBackSynchronizer::new(store.clone(), gateway, &config.sync)
            .with_metrics(metrics.clone()),
    );
    let mut sync_handle = spawn_synchronizer(synchronizer);

    let app = api::router(AppState::new(
        store,
        metrics,
        &config.api_token,
        &config.service_name,
    ));
    let listener = tokio::net::TcpListener::bind(&config.http_listen_addr)
        .await
        .with_context(|| format!("binding {}", config.http_listen_addr))?;
    tracing::info!(addr = %config.http_listen_addr, "Listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    });

    let outcome = tokio::select! {
        served = server.into_future() => Ok(served),
        synced = sync_handle.join() => Err(synced),
    };

    match outcome {
        Ok(served) => {
            served.context("http server")?;
            tracing::info!("Shutting down wallet ledger server");
            sync_handle.shutdown().await.context("final write-back")?;
        }
        Err(synced) => {
            // The synchronizer only ends on its own after a persistence failure.
            // In-memory state can no longer be trusted to reach the store.
            tracing::error!("Write-back synchronizer terminated, exiting");
            synced.context("write-back synchronizer")?;
            anyhow::bail!("write-back synchronizer stopped unexpectedly");
        }
    }

    Ok(())
}

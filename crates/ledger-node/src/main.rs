mod config;
mod constants;
mod routes;
mod service;

use clap::Parser;
use config::Args;
use ledger_core::BlockStore;
use ledger_storage::{MemoryStore, SledStore};
use routes::{router, AppState};
use service::LedgerService;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let addr = args.listen_addr()?;
    let params = args.ledger_params()?;

    let store: Arc<dyn BlockStore> = if args.in_memory {
        info!("using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        let sled = SledStore::open(&args.data_dir)?;
        if let (Some(height), Some(hash)) = (sled.tip_height()?, sled.tip_hash()?) {
            info!("store tip at block {height} ({hash})");
        }
        Arc::new(sled)
    };
    info!(
        "difficulty {}, mining reward {}",
        params.difficulty, params.mining_reward
    );

    // Building the ledger may mine a genesis block.
    let service =
        tokio::task::spawn_blocking(move || Arc::new(LedgerService::open(params, store))).await?;
    info!("ledger loaded and ready");

    let app = router(AppState {
        service: Arc::clone(&service),
    });

    info!("ledger-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal(service))
        .await?;
    info!("ledger-node stopped");
    Ok(())
}

async fn shutdown_signal(service: Arc<LedgerService>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
    service.cancel_mining();
}

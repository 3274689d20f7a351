use anyhow::Context;
use std::sync::Arc;
use verus_ticker_api::{
    api::{self, AppState},
    telemetry, CacheManager, HealthReporter, MarketDataAggregator, RpcTransport, Settings,
    SnapshotSource, VerusRpcClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env
    telemetry::init_tracing(telemetry::DEFAULT_FILTER);

    let settings = Settings::from_env().context("invalid configuration")?;

    let rpc: Arc<dyn RpcTransport> =
        Arc::new(VerusRpcClient::new(&settings.rpc).context("failed to build RPC client")?);
    let source: Arc<dyn SnapshotSource> =
        Arc::new(MarketDataAggregator::new(rpc.clone(), settings.retry));
    let cache = CacheManager::new(source.clone(), settings.cache);
    let health = Arc::new(HealthReporter::new(rpc, cache.clone(), source.clone()));

    tracing::info!(
        rpc_url = %settings.rpc.url,
        bind_addr = %settings.bind_addr,
        ttl_secs = settings.cache.ttl.as_secs(),
        refresh_mode = ?settings.cache.refresh_mode,
        background_refresh = settings.cache.background_refresh,
        "Starting Verus ticker API"
    );

    let background = settings
        .cache
        .background_refresh
        .then(|| cache.spawn_background_refresh());

    let state = AppState {
        cache,
        source,
        health,
    };
    api::start_server(state, settings.bind_addr, shutdown_signal())
        .await
        .context("API server failed")?;

    if let Some(task) = background {
        task.abort();
    }
    tracing::info!("Verus ticker API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

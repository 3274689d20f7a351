//! # Verus Ticker API
//!
//! Serves Verus converter market data in the ticker formats exchange
//! aggregators consume: CoinGecko, CoinMarketCap (symbol and i-address keyed)
//! and Coinpaprika.
//!
//! Market state is read from a single `verusd` over JSON-RPC, assembled into
//! one immutable [`Snapshot`] and cached for one TTL. Concurrent requests for
//! an expired snapshot share a single aggregation run, and a failed refresh
//! keeps serving the last good snapshot.
//!
//! ```no_run
//! use std::sync::Arc;
//! use verus_ticker_api::{
//!     CacheKey, CacheManager, Format, MarketDataAggregator, Settings, VerusRpcClient,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::from_env()?;
//! let rpc = Arc::new(VerusRpcClient::new(&settings.rpc)?);
//! let aggregator = Arc::new(MarketDataAggregator::new(rpc, settings.retry));
//! let cache = CacheManager::new(aggregator, settings.cache);
//!
//! let served = cache.get_snapshot(CacheKey::AllPairs).await?;
//! let tickers = Format::CoinGecko.render(&served.snapshot)?;
//! println!("{}", tickers);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod api;
pub mod cache;
pub mod config;
pub mod constants;
pub mod currencies;
pub mod error;
pub mod formats;
pub mod health;
pub mod metrics;
pub mod rpc;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use aggregator::{MarketDataAggregator, SnapshotSource};
pub use cache::{CacheEntry, CacheManager};
pub use config::{CacheSettings, RefreshMode, RetryPolicy, RpcSettings, Settings};
pub use error::{AdapterError, AggregationError, ConfigError, RpcError};
pub use formats::{Format, TickerFormat};
pub use health::HealthReporter;
pub use metrics::MetricsCollector;
pub use rpc::{RpcTransport, VerusRpcClient};
pub use types::{
    BlockRange, CacheKey, CacheStatus, FetchMetrics, HealthReport, HealthStatus, Ohlc, PoolState,
    Served, Snapshot,
};

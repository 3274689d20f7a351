//! Health and cache status reporting
//!
//! Read-only: a report calls the daemon with `getinfo` and inspects the
//! cache, it never triggers a cache refresh.

use crate::{
    aggregator::SnapshotSource,
    cache::CacheManager,
    constants::HEALTH_CHECK_TIMEOUT_MS,
    rpc::{self, RpcTransport},
    types::{CacheKey, CacheStatus, HealthReport, HealthStatus},
};
use std::sync::Arc;
use std::time::Duration;

pub struct HealthReporter {
    rpc: Arc<dyn RpcTransport>,
    cache: CacheManager,
    source: Arc<dyn SnapshotSource>,
    check_timeout: Duration,
}

impl HealthReporter {
    pub fn new(rpc: Arc<dyn RpcTransport>, cache: CacheManager, source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            rpc,
            cache,
            source,
            check_timeout: Duration::from_millis(HEALTH_CHECK_TIMEOUT_MS),
        }
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    /// Checks the daemon and summarises service health
    pub async fn health(&self) -> HealthReport {
        let check = rpc::block_height(self.rpc.as_ref(), self.check_timeout).await;
        let entry = self.cache.entry(CacheKey::AllPairs);
        let now = self.cache.now_unix_ms();

        let (rpc_reachable, current_block, rpc_error) = match check {
            Ok(height) => (true, Some(height), None),
            // An error object still proves the daemon answered
            Err(e) => (!e.is_retryable(), None, Some(e.to_string())),
        };

        let cache_fresh = entry
            .as_ref()
            .is_some_and(|entry| !entry.stale && !entry.is_expired(now));

        let status = match (rpc_reachable, entry.is_some()) {
            (true, _) if cache_fresh => HealthStatus::Healthy,
            (true, _) | (false, true) => HealthStatus::Degraded,
            (false, false) => HealthStatus::Unhealthy,
        };

        // Only a built snapshot counts; the getinfo call above is not a fetch
        let last_successful_fetch_unix_ms = entry.as_ref().map(|entry| entry.snapshot.fetched_at_unix_ms);

        if status != HealthStatus::Healthy {
            tracing::debug!(?status, rpc_reachable, error = ?rpc_error, "Service not healthy");
        }

        HealthReport {
            status,
            rpc_reachable,
            last_successful_fetch_unix_ms,
            current_block,
            rpc_error,
            metrics: self.source.metrics().await,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Freshness of the global cache entry
    pub fn cache_status(&self) -> CacheStatus {
        let ttl_ms = i64::try_from(self.cache.ttl().as_millis()).unwrap_or(i64::MAX);
        let now = self.cache.now_unix_ms();

        match self.cache.entry(CacheKey::AllPairs) {
            None => CacheStatus {
                cached: false,
                age_ms: 0,
                chain_height: None,
                ttl_ms,
                valid: false,
                stale: false,
                refresh_in_flight: false,
                expires_in_ms: 0,
                pairs_count: 0,
                fetched_at_unix_ms: None,
                height_changed_at_unix_ms: None,
                last_error: None,
            },
            Some(entry) => CacheStatus {
                cached: true,
                age_ms: (now - entry.snapshot.fetched_at_unix_ms).max(0),
                chain_height: Some(entry.snapshot.chain_height),
                ttl_ms,
                valid: !entry.stale && !entry.is_expired(now),
                stale: entry.stale,
                refresh_in_flight: entry.refresh_in_flight,
                expires_in_ms: (entry.expires_at_unix_ms - now).max(0),
                pairs_count: entry.snapshot.pools.len(),
                fetched_at_unix_ms: Some(entry.snapshot.fetched_at_unix_ms),
                height_changed_at_unix_ms: Some(entry.height_changed_at_unix_ms),
                last_error: entry.last_error.clone(),
            },
        }
    }
}

//! Block-height aware snapshot cache
//!
//! One slot per [`CacheKey`]. Each slot holds the current entry behind an
//! `Arc` that is swapped wholesale on refresh, plus the shared future of the
//! refresh in flight, if any. Every caller that finds the entry expired joins
//! that future, so one expiry window costs one aggregation run.

use crate::{
    aggregator::SnapshotSource,
    config::{CacheSettings, RefreshMode},
    error::AggregationError,
    types::{now_unix_ms, CacheKey, Served, Snapshot},
};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

type RefreshResult = Result<Arc<Snapshot>, AggregationError>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshResult>>;

/// Wall clock in unix milliseconds
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Cached snapshot plus freshness bookkeeping
///
/// Immutable once published; every state change publishes a new entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub snapshot: Arc<Snapshot>,
    pub expires_at_unix_ms: i64,
    pub refresh_in_flight: bool,
    /// The last refresh failed and `snapshot` is the last known good one
    pub stale: bool,
    pub last_error: Option<String>,
    /// When `snapshot.chain_height` last moved
    pub height_changed_at_unix_ms: i64,
}

impl CacheEntry {
    pub fn is_expired(&self, now_unix_ms: i64) -> bool {
        now_unix_ms >= self.expires_at_unix_ms
    }
}

#[derive(Default)]
struct Slot {
    entry: RwLock<Option<Arc<CacheEntry>>>,
    in_flight: Mutex<Option<SharedRefresh>>,
}

impl Slot {
    fn current(&self) -> Option<Arc<CacheEntry>> {
        self.entry.read().clone()
    }

    fn publish(&self, entry: CacheEntry) {
        *self.entry.write() = Some(Arc::new(entry));
    }
}

/// How a caller gets its snapshot once the fast path missed
enum Plan {
    /// Another caller refreshed in the meantime
    Fresh(Arc<CacheEntry>),
    /// A refresh was already running
    Join(SharedRefresh),
    /// This caller started the refresh
    Lead(SharedRefresh),
}

struct Inner {
    source: Arc<dyn SnapshotSource>,
    settings: CacheSettings,
    clock: Clock,
    slots: Mutex<HashMap<CacheKey, Arc<Slot>>>,
}

impl Inner {
    fn now(&self) -> i64 {
        (self.clock)()
    }

    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.settings.ttl.as_millis()).unwrap_or(i64::MAX)
    }

    fn slot(&self, key: CacheKey) -> Arc<Slot> {
        self.slots.lock().entry(key).or_default().clone()
    }

    /// Stores the outcome of an aggregation run and hands it to every waiter
    fn complete(&self, key: CacheKey, slot: &Slot, result: Result<Snapshot, AggregationError>) -> RefreshResult {
        let now = self.now();
        let previous = slot.current();

        let outcome = match result {
            Ok(fetched) => {
                let (snapshot, height_changed_at) = match &previous {
                    Some(prev) if prev.snapshot.chain_height == fetched.chain_height => {
                        // Same block: keep the old allocation when nothing moved
                        let pools = if prev.snapshot.pools == fetched.pools {
                            prev.snapshot.pools.clone()
                        } else {
                            fetched.pools
                        };
                        (Snapshot { pools, ..fetched }, prev.height_changed_at_unix_ms)
                    }
                    _ => (fetched, now),
                };

                let snapshot = Arc::new(snapshot);
                slot.publish(CacheEntry {
                    snapshot: snapshot.clone(),
                    expires_at_unix_ms: now.saturating_add(self.ttl_ms()),
                    refresh_in_flight: false,
                    stale: false,
                    last_error: None,
                    height_changed_at_unix_ms: height_changed_at,
                });

                tracing::debug!(
                    ?key,
                    chain_height = snapshot.chain_height,
                    pools = snapshot.pools.len(),
                    "Cache refreshed"
                );
                Ok(snapshot)
            }
            Err(e) => {
                match previous {
                    Some(prev) => {
                        tracing::warn!(
                            ?key,
                            error = %e,
                            chain_height = prev.snapshot.chain_height,
                            "Cache refresh failed, serving last known snapshot"
                        );
                        // Expiry stays in the past so the next request retries
                        slot.publish(CacheEntry {
                            refresh_in_flight: false,
                            stale: true,
                            last_error: Some(e.to_string()),
                            ..(*prev).clone()
                        });
                    }
                    None => tracing::warn!(?key, error = %e, "Cache refresh failed with nothing cached"),
                }
                Err(e)
            }
        };

        *slot.in_flight.lock() = None;
        outcome
    }
}

/// Serves snapshots from memory and refreshes them through a [`SnapshotSource`]
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<Inner>,
}

impl CacheManager {
    pub fn new(source: Arc<dyn SnapshotSource>, settings: CacheSettings) -> Self {
        Self::with_clock(source, settings, Arc::new(now_unix_ms))
    }

    /// Creates a manager reading time from `clock`
    pub fn with_clock(source: Arc<dyn SnapshotSource>, settings: CacheSettings, clock: Clock) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                settings,
                clock,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    pub fn ttl(&self) -> Duration {
        self.inner.settings.ttl
    }

    /// Current time as seen by this manager
    pub fn now_unix_ms(&self) -> i64 {
        self.inner.now()
    }

    /// Returns the cached snapshot, refreshing it first when expired
    ///
    /// A failed refresh falls back to the previous snapshot marked stale.
    ///
    /// # Errors
    /// The aggregation error, when no snapshot has ever been cached for `key`
    pub async fn get_snapshot(&self, key: CacheKey) -> Result<Served, AggregationError> {
        let slot = self.inner.slot(key);
        let current = slot.current();

        if let Some(entry) = &current {
            if !entry.is_expired(self.inner.now()) {
                return Ok(Served {
                    snapshot: entry.snapshot.clone(),
                    stale: false,
                });
            }
        }

        let refresh = match self.plan(key, &slot) {
            Plan::Fresh(entry) => {
                return Ok(Served {
                    snapshot: entry.snapshot.clone(),
                    stale: false,
                })
            }
            Plan::Join(refresh) => {
                if self.inner.settings.refresh_mode == RefreshMode::NonBlocking {
                    if let Some(entry) = current {
                        return Ok(Served {
                            snapshot: entry.snapshot.clone(),
                            stale: true,
                        });
                    }
                }
                refresh
            }
            Plan::Lead(refresh) => refresh,
        };

        match refresh.await {
            Ok(snapshot) => Ok(Served {
                snapshot,
                stale: false,
            }),
            Err(e) => match slot.current() {
                Some(entry) => Ok(Served {
                    snapshot: entry.snapshot.clone(),
                    stale: true,
                }),
                None => Err(e),
            },
        }
    }

    /// Refreshes `key` regardless of expiry, joining a refresh already in flight
    ///
    /// # Errors
    /// The aggregation error of this run; the cached entry is kept as stale
    pub async fn refresh(&self, key: CacheKey) -> Result<Arc<Snapshot>, AggregationError> {
        let slot = self.inner.slot(key);
        let refresh = {
            let mut in_flight = slot.in_flight.lock();
            match in_flight.as_ref() {
                Some(running) => running.clone(),
                None => {
                    let started = self.start(key, &slot);
                    *in_flight = Some(started.clone());
                    started
                }
            }
        };
        refresh.await
    }

    /// Read-only view of the entry for `key`
    pub fn entry(&self, key: CacheKey) -> Option<Arc<CacheEntry>> {
        self.inner.slot(key).current()
    }

    /// Refreshes [`CacheKey::AllPairs`] every TTL until the runtime shuts down
    pub fn spawn_background_refresh(&self) -> JoinHandle<()> {
        let cache = self.clone();
        let ttl = self.ttl();

        tokio::spawn(async move {
            tracing::info!(
                refresh_interval_secs = ttl.as_secs(),
                "Starting background cache refresh"
            );

            let mut interval = tokio::time::interval(ttl);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(e) = cache.refresh(CacheKey::AllPairs).await {
                    tracing::warn!(error = %e, "Background cache refresh failed");
                }
            }
        })
    }

    fn plan(&self, key: CacheKey, slot: &Arc<Slot>) -> Plan {
        let mut in_flight = slot.in_flight.lock();
        if let Some(running) = in_flight.as_ref() {
            return Plan::Join(running.clone());
        }

        // A refresh may have completed between the fast path and taking the lock
        if let Some(entry) = slot.current() {
            if !entry.is_expired(self.inner.now()) {
                return Plan::Fresh(entry);
            }
        }

        let started = self.start(key, slot);
        *in_flight = Some(started.clone());
        Plan::Lead(started)
    }

    /// Spawns the aggregation run and returns a shared handle to its result
    ///
    /// The run lives on its own task, so it completes and clears the slot even
    /// when every caller awaiting it has been dropped. The caller stores the
    /// handle as in flight.
    fn start(&self, key: CacheKey, slot: &Arc<Slot>) -> SharedRefresh {
        if let Some(entry) = slot.current() {
            slot.publish(CacheEntry {
                refresh_in_flight: true,
                ..(*entry).clone()
            });
        }

        let inner = self.inner.clone();
        let slot = slot.clone();
        let task = tokio::spawn(async move {
            let result = AssertUnwindSafe(inner.source.build_snapshot())
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(AggregationError::Aborted("snapshot build panicked".to_string())));
            inner.complete(key, &slot, result)
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(AggregationError::Aborted(e.to_string())))
        }
        .boxed()
        .shared()
    }
}

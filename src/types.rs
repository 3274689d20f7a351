//! Types for the market data model

use crate::{constants::PRICE_DECIMALS, error::AdapterError};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

/// Current wall-clock time in unix milliseconds
pub fn now_unix_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Open, high, low and close of a pair over the volume window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ohlc {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl Ohlc {
    /// Turns a candle of conversion rates into quote-per-base prices
    ///
    /// Inverting swaps the extremes: the new high comes from the old low.
    pub fn inverted(self) -> Self {
        Self {
            open: invert(self.open),
            high: invert(self.low),
            low: invert(self.high),
            close: invert(self.close),
        }
    }

    fn values(&self) -> [Decimal; 4] {
        [self.open, self.high, self.low, self.close]
    }
}

/// `1 / value`, zero stays zero
fn invert(value: Decimal) -> Decimal {
    if value.is_zero() {
        return Decimal::ZERO;
    }
    Decimal::ONE
        .checked_div(value)
        .map(|inverse| inverse.round_dp(PRICE_DECIMALS).normalize())
        .unwrap_or(Decimal::ZERO)
}

/// State of one tradable pair inside a converter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolState {
    /// Converter i-address when known, else its fully-qualified name
    pub pool_id: String,
    /// Converter fully-qualified name
    pub pool_name: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub base_currency_id: String,
    pub quote_currency_id: String,
    pub base_reserve: Decimal,
    pub quote_reserve: Decimal,
    /// `quote_reserve / base_reserve`, `None` while the pool holds no base reserve
    pub price: Option<Decimal>,
    /// Base-currency volume of base->quote conversions in the volume window
    pub volume_24h: Decimal,
    /// The same conversions measured in the quote currency
    pub quote_volume_24h: Decimal,
    /// Candle of base->quote conversions, quote per base; `None` when the daemon reported none
    pub ohlc: Option<Ohlc>,
    /// USD value of the converter reserves backing this pair
    pub liquidity_usd: Decimal,
    /// Converter i-address
    pub identity_address: Option<String>,
}

impl PoolState {
    /// Price implied by the reserves
    pub fn implied_price(base_reserve: Decimal, quote_reserve: Decimal) -> Option<Decimal> {
        if base_reserve > Decimal::ZERO {
            quote_reserve.checked_div(base_reserve)
        } else {
            None
        }
    }

    /// Composite `{base}_{quote}` symbol key
    pub fn symbol_key(&self) -> String {
        format!("{}_{}", self.base_currency, self.quote_currency)
    }

    /// True when any conversion happened in the volume window
    pub fn has_volume(&self) -> bool {
        self.volume_24h > Decimal::ZERO || self.quote_volume_24h > Decimal::ZERO
    }

    /// Checks the structural invariants every renderer relies on
    pub fn check_invariants(&self) -> Result<(), AdapterError> {
        let mut fields = vec![
            ("base_reserve", self.base_reserve),
            ("quote_reserve", self.quote_reserve),
            ("volume_24h", self.volume_24h),
            ("quote_volume_24h", self.quote_volume_24h),
            ("liquidity_usd", self.liquidity_usd),
        ];
        if let Some(ohlc) = &self.ohlc {
            fields.extend(ohlc.values().map(|value| ("ohlc", value)));
        }
        for (field, value) in fields {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(AdapterError::NegativeValue {
                    pool_id: self.pool_id.clone(),
                    field,
                    value: value.to_string(),
                });
            }
        }
        if self.price.is_some() && self.base_reserve.is_zero() {
            return Err(AdapterError::PriceWithoutReserve {
                pool_id: self.pool_id.clone(),
                base_reserve: self.base_reserve.to_string(),
            });
        }
        Ok(())
    }
}

/// Block window the volume figures cover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
    pub interval: u64,
}

/// One consistent capture of chain height and pool states
///
/// Never mutated after construction. `pools` is shared so an unchanged
/// refresh can reuse the previous allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub chain_height: u64,
    pub pools: Arc<Vec<PoolState>>,
    pub fetched_at_unix_ms: i64,
    pub block_range: BlockRange,
    pub converter_count: usize,
}

impl Snapshot {
    /// Checks every pool's invariants
    pub fn check_invariants(&self) -> Result<(), AdapterError> {
        self.pools.iter().try_for_each(PoolState::check_invariants)
    }
}

/// Logical cache keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// All pairs across all active converters, shared by every format
    AllPairs,
}

/// A snapshot handed out by the cache
#[derive(Debug, Clone)]
pub struct Served {
    pub snapshot: Arc<Snapshot>,
    /// True when the snapshot is past its TTL because a refresh failed or is still running
    pub stale: bool,
}

/// Overall health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Daemon reachable and cache fresh
    Healthy,
    /// Daemon reachable but the cache is stale or empty, or unreachable but a snapshot is being served
    Degraded,
    /// Daemon unreachable and nothing to serve
    Unhealthy,
}

/// Aggregation latency and success figures
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchMetrics {
    pub source: String,
    pub latency_p50_ms: f64,
    pub latency_p99_ms: f64,
    pub success_rate: f64,
    pub total_requests: u64,
    pub failed_requests: u64,
}

/// Health reporter output
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub rpc_reachable: bool,
    pub last_successful_fetch_unix_ms: Option<i64>,
    pub current_block: Option<u64>,
    pub rpc_error: Option<String>,
    pub metrics: FetchMetrics,
    pub version: &'static str,
}

/// Cache freshness summary
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub cached: bool,
    pub age_ms: i64,
    pub chain_height: Option<u64>,
    pub ttl_ms: i64,
    pub valid: bool,
    pub stale: bool,
    pub refresh_in_flight: bool,
    pub expires_in_ms: i64,
    pub pairs_count: usize,
    pub fetched_at_unix_ms: Option<i64>,
    pub height_changed_at_unix_ms: Option<i64>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(base_reserve: Decimal, quote_reserve: Decimal) -> PoolState {
        PoolState {
            pool_id: "iPool".to_string(),
            pool_name: "Bridge.vETH".to_string(),
            base_currency: "VRSC".to_string(),
            quote_currency: "DAI.vETH".to_string(),
            base_currency_id: "iVRSC".to_string(),
            quote_currency_id: "iDAI".to_string(),
            base_reserve,
            quote_reserve,
            price: PoolState::implied_price(base_reserve, quote_reserve),
            volume_24h: Decimal::ZERO,
            quote_volume_24h: Decimal::ZERO,
            ohlc: None,
            liquidity_usd: Decimal::ZERO,
            identity_address: Some("iPool".to_string()),
        }
    }

    #[test]
    fn test_implied_price() {
        assert_eq!(
            PoolState::implied_price(Decimal::from(4), Decimal::from(10)),
            Some(Decimal::new(25, 1))
        );
        assert_eq!(PoolState::implied_price(Decimal::ZERO, Decimal::from(10)), None);
    }

    #[test]
    fn test_invariants() {
        assert!(pool(Decimal::from(1), Decimal::from(2)).check_invariants().is_ok());
        assert!(matches!(
            pool(Decimal::from(-1), Decimal::from(2)).check_invariants(),
            Err(AdapterError::NegativeValue { field: "base_reserve", .. })
        ));

        let mut broken = pool(Decimal::ZERO, Decimal::from(2));
        broken.price = Some(Decimal::ONE);
        assert!(matches!(
            broken.check_invariants(),
            Err(AdapterError::PriceWithoutReserve { .. })
        ));

        let mut negative_candle = pool(Decimal::from(1), Decimal::from(2));
        negative_candle.ohlc = Some(Ohlc {
            open: Decimal::ONE,
            high: Decimal::ONE,
            low: Decimal::from(-1),
            close: Decimal::ONE,
        });
        assert!(matches!(
            negative_candle.check_invariants(),
            Err(AdapterError::NegativeValue { field: "ohlc", .. })
        ));
    }

    #[test]
    fn test_inverted_candle_swaps_high_and_low() {
        let raw = Ohlc {
            open: Decimal::new(5, 1),
            high: Decimal::new(625, 3),
            low: Decimal::new(4, 1),
            close: Decimal::ZERO,
        };
        let inverted = raw.inverted();

        assert_eq!(inverted.open, Decimal::from(2));
        assert_eq!(inverted.high, Decimal::new(25, 1));
        assert_eq!(inverted.low, Decimal::new(16, 1));
        assert_eq!(inverted.close, Decimal::ZERO);
    }

    #[test]
    fn test_has_volume() {
        let mut idle = pool(Decimal::from(1), Decimal::from(2));
        assert!(!idle.has_volume());
        idle.quote_volume_24h = Decimal::ONE;
        assert!(idle.has_volume());
    }
}

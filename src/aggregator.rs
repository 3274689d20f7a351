//! Market data aggregation
//!
//! Turns the daemon's converter, volume and currency state into one
//! [`Snapshot`]. Aggregation is all-or-nothing: the first required call that
//! fails aborts the run and no partial snapshot is produced.

use crate::{
    config::RetryPolicy,
    constants::{PRICE_DECIMALS, SYSTEM_ID, USD_REFERENCE_CONVERTER, USD_REFERENCE_CURRENCY, VOLUME_WINDOW_BLOCKS},
    currencies,
    error::{AggregationError, RpcError},
    metrics::MetricsCollector,
    rpc::{self, RpcTransport},
    types::{now_unix_ms, BlockRange, FetchMetrics, Ohlc, PoolState, Snapshot},
};
use async_trait::async_trait;
use futures::future::{try_join, try_join_all};
use parking_lot::RwLock;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;

/// Keys of a `getcurrencyconverters` entry that are not the converter's i-address
const CONVERTER_META_KEYS: &[&str] = &["fullyqualifiedname", "height", "output", "lastnotarization"];

/// Anything that can produce a fresh snapshot
///
/// The cache depends on this trait only, so tests can count and script
/// aggregation runs without a daemon.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Builds a complete snapshot or fails without side effects on the caller
    async fn build_snapshot(&self) -> Result<Snapshot, AggregationError>;

    /// Name used in logs and metrics
    fn source_name(&self) -> &'static str;

    /// Latency and success figures of previous runs
    async fn metrics(&self) -> FetchMetrics {
        FetchMetrics::empty(self.source_name())
    }
}

#[derive(Debug, Clone)]
struct Reserve {
    currency_id: String,
    symbol: String,
    amount: Decimal,
    weight: Decimal,
}

#[derive(Debug, Clone)]
struct Converter {
    name: String,
    id: Option<String>,
    supply: Decimal,
    reserves: Vec<Reserve>,
}

#[derive(Debug, Clone)]
struct VolumePair {
    from: String,
    to: String,
    volume: Decimal,
    /// Raw conversion-rate candle as reported by the daemon
    ohlc: Option<Ohlc>,
}

/// Volume pairs per volume currency symbol
type ConverterVolumes = HashMap<String, Vec<VolumePair>>;

/// Builds snapshots from a `verusd` RPC transport
pub struct MarketDataAggregator {
    rpc: Arc<dyn RpcTransport>,
    retry: RetryPolicy,
    /// Currency names resolved through `getcurrency`; on-chain names never change
    names: RwLock<HashMap<String, String>>,
    metrics: MetricsCollector,
}

impl MarketDataAggregator {
    pub fn new(rpc: Arc<dyn RpcTransport>, retry: RetryPolicy) -> Self {
        Self {
            rpc,
            retry,
            names: RwLock::new(HashMap::new()),
            metrics: MetricsCollector::new("verusd"),
        }
    }

    /// Calls the daemon, retrying transport failures with exponential backoff
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let timeout = self.rpc.default_timeout();
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 1;

        loop {
            match self.rpc.call(method, params.clone(), timeout).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    tracing::warn!(
                        method,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %e,
                        "RPC call failed, retrying"
                    );
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(self.retry.max_backoff);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn collect(&self) -> Result<Snapshot, AggregationError> {
        let chain_height = rpc::block_height(
            &RetryingTransport { aggregator: self },
            self.rpc.default_timeout(),
        )
        .await?;

        let block_range = BlockRange {
            start: chain_height.saturating_sub(VOLUME_WINDOW_BLOCKS),
            end: chain_height,
            interval: VOLUME_WINDOW_BLOCKS,
        };

        let converters = self.converters().await?;
        tracing::debug!(
            chain_height,
            converters = converters.len(),
            "Fetched converter list"
        );

        let volumes = try_join_all(
            converters
                .iter()
                .map(|converter| self.converter_volumes(converter, block_range)),
        );
        let liquidity = async {
            let vrsc_usd = self.vrsc_usd_price().await?;
            try_join_all(
                converters
                    .iter()
                    .map(|converter| self.converter_liquidity(converter, vrsc_usd)),
            )
            .await
        };
        let (volumes, liquidity) = try_join(volumes, liquidity).await?;

        let mut pools: Vec<PoolState> = converters
            .iter()
            .zip(volumes.iter())
            .zip(liquidity)
            .flat_map(|((converter, volumes), liquidity_usd)| {
                converter_pools(converter, volumes, liquidity_usd)
            })
            .collect();

        // Canonical order, fixed for every format
        pools.sort_by(|a, b| {
            (&a.pool_name, &a.base_currency, &a.quote_currency)
                .cmp(&(&b.pool_name, &b.base_currency, &b.quote_currency))
        });

        Ok(Snapshot {
            chain_height,
            pools: Arc::new(pools),
            fetched_at_unix_ms: now_unix_ms(),
            block_range,
            converter_count: converters.len(),
        })
    }

    /// Active converters, excluded chains dropped, reserve symbols resolved
    async fn converters(&self) -> Result<Vec<Converter>, AggregationError> {
        const METHOD: &str = "getcurrencyconverters";
        let raw = self.call(METHOD, json!([SYSTEM_ID])).await?;
        let entries = raw
            .as_array()
            .ok_or_else(|| AggregationError::invalid_data(METHOD, "expected an array"))?;

        let mut converters = Vec::with_capacity(entries.len());
        for entry in entries {
            let name = entry
                .get("fullyqualifiedname")
                .and_then(Value::as_str)
                .ok_or_else(|| AggregationError::invalid_data(METHOD, "converter without fullyqualifiedname"))?;

            if currencies::is_excluded_chain(name) {
                tracing::debug!(converter = name, "Skipping excluded converter");
                continue;
            }

            let id = entry.as_object().and_then(|fields| {
                fields
                    .keys()
                    .find(|key| !CONVERTER_META_KEYS.contains(&key.as_str()))
                    .cloned()
            });

            let raw_reserves = entry
                .pointer("/lastnotarization/currencystate/reservecurrencies")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();

            let supply = entry
                .pointer("/lastnotarization/currencystate/supply")
                .and_then(decimal_from)
                .unwrap_or(Decimal::ZERO);

            let mut reserves = Vec::with_capacity(raw_reserves.len());
            for reserve in raw_reserves {
                let currency_id = reserve
                    .get("currencyid")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AggregationError::invalid_data(METHOD, format!("{}: reserve without currencyid", name)))?;
                let amount = reserve
                    .get("reserves")
                    .and_then(decimal_from)
                    .ok_or_else(|| AggregationError::invalid_data(METHOD, format!("{}: reserve {} without amount", name, currency_id)))?;
                if amount.is_sign_negative() && !amount.is_zero() {
                    return Err(AggregationError::invalid_data(
                        METHOD,
                        format!("{}: negative reserve {} for {}", name, amount, currency_id),
                    ));
                }

                reserves.push(Reserve {
                    currency_id: currency_id.to_string(),
                    symbol: self.currency_name(currency_id).await?,
                    amount,
                    weight: reserve.get("weight").and_then(decimal_from).unwrap_or(Decimal::ZERO),
                });
            }

            converters.push(Converter {
                name: name.to_string(),
                id,
                supply,
                reserves,
            });
        }

        Ok(converters)
    }

    /// Symbol for a currency: registry first, then memoised `getcurrency`
    async fn currency_name(&self, currency_id: &str) -> Result<String, AggregationError> {
        if let Some(symbol) = currencies::vrsc_symbol(currency_id) {
            return Ok(symbol.to_string());
        }
        if let Some(name) = self.names.read().get(currency_id) {
            return Ok(name.clone());
        }

        const METHOD: &str = "getcurrency";
        let info = self.call(METHOD, json!([currency_id])).await?;
        let name = info
            .get("fullyqualifiedname")
            .or_else(|| info.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| AggregationError::invalid_data(METHOD, format!("no name for {}", currency_id)))?
            .to_string();

        tracing::debug!(currency_id, name = %name, "Resolved currency name");
        self.names.write().insert(currency_id.to_string(), name.clone());
        Ok(name)
    }

    /// One `getcurrencystate` call per reserve currency of the converter
    async fn converter_volumes(
        &self,
        converter: &Converter,
        range: BlockRange,
    ) -> Result<ConverterVolumes, AggregationError> {
        let window = format!("{}, {}, {}", range.start, range.end, range.interval);

        let per_currency = try_join_all(converter.reserves.iter().map(|reserve| {
            let params = json!([converter.name, window, reserve.symbol]);
            async move {
                let state = self.call("getcurrencystate", params).await?;
                let pairs = parse_volume_pairs(&state)?;
                Ok::<_, AggregationError>((reserve.symbol.clone(), pairs))
            }
        }))
        .await?;

        Ok(per_currency.into_iter().collect())
    }

    /// Units of `convert_to` one unit of `currency` buys, as `estimateconversion` quotes it
    async fn estimate_conversion(
        &self,
        currency: &str,
        convert_to: &str,
        via: Option<&str>,
    ) -> Result<Decimal, AggregationError> {
        const METHOD: &str = "estimateconversion";
        let mut request = json!({"currency": currency, "convertto": convert_to, "amount": 1});
        if let Some(via) = via {
            request["via"] = json!(via);
        }

        let estimate = self.call(METHOD, json!([request])).await?;
        let rate = estimate
            .get("estimatedcurrencyout")
            .and_then(decimal_from)
            .ok_or_else(|| {
                AggregationError::invalid_data(METHOD, format!("no estimate for {} -> {}", currency, convert_to))
            })?;
        if rate.is_sign_negative() && !rate.is_zero() {
            return Err(AggregationError::invalid_data(
                METHOD,
                format!("negative estimate {} for {} -> {}", rate, currency, convert_to),
            ));
        }
        Ok(rate)
    }

    /// VRSC priced in the USD reference stablecoin
    async fn vrsc_usd_price(&self) -> Result<Decimal, AggregationError> {
        let price = self
            .estimate_conversion(SYSTEM_ID, USD_REFERENCE_CURRENCY, Some(USD_REFERENCE_CONVERTER))
            .await?;
        tracing::debug!(vrsc_usd = %price, "Estimated VRSC price");
        Ok(price)
    }

    /// Total USD value of a converter: supply x basket price in VRSC x VRSC price
    async fn converter_liquidity(&self, converter: &Converter, vrsc_usd: Decimal) -> Result<Decimal, AggregationError> {
        if converter.supply <= Decimal::ZERO || vrsc_usd.is_zero() {
            return Ok(Decimal::ZERO);
        }

        let basket = converter.id.as_deref().unwrap_or(&converter.name);
        let vrsc_per_unit = self.estimate_conversion(basket, SYSTEM_ID, None).await?;

        converter
            .supply
            .checked_mul(vrsc_per_unit)
            .and_then(|vrsc| vrsc.checked_mul(vrsc_usd))
            .map(|usd| usd.round_dp(PRICE_DECIMALS))
            .ok_or_else(|| {
                AggregationError::invalid_data(
                    "estimateconversion",
                    format!("{}: liquidity overflows", converter.name),
                )
            })
    }
}

#[async_trait]
impl SnapshotSource for MarketDataAggregator {
    async fn build_snapshot(&self) -> Result<Snapshot, AggregationError> {
        let start = Instant::now();
        let result = self.collect().await;
        self.metrics.record_request(start.elapsed(), result.is_ok()).await;

        match &result {
            Ok(snapshot) => tracing::info!(
                chain_height = snapshot.chain_height,
                pools = snapshot.pools.len(),
                converters = snapshot.converter_count,
                latency_ms = start.elapsed().as_millis() as u64,
                "Built market snapshot"
            ),
            Err(e) => tracing::warn!(error = %e, "Failed to build market snapshot"),
        }
        result
    }

    fn source_name(&self) -> &'static str {
        "verusd"
    }

    async fn metrics(&self) -> FetchMetrics {
        self.metrics.get_metrics().await
    }
}

/// Routes typed gateway helpers through the aggregator's retry policy
struct RetryingTransport<'a> {
    aggregator: &'a MarketDataAggregator,
}

#[async_trait]
impl RpcTransport for RetryingTransport<'_> {
    async fn call(&self, method: &str, params: Value, _timeout: std::time::Duration) -> Result<Value, RpcError> {
        self.aggregator.call(method, params).await
    }

    fn default_timeout(&self) -> std::time::Duration {
        self.aggregator.rpc.default_timeout()
    }
}

fn parse_volume_pairs(state: &Value) -> Result<Vec<VolumePair>, AggregationError> {
    const METHOD: &str = "getcurrencystate";
    let items = state
        .as_array()
        .ok_or_else(|| AggregationError::invalid_data(METHOD, "expected an array"))?;

    let Some(raw_pairs) = items
        .iter()
        .find_map(|item| item.pointer("/conversiondata/volumepairs"))
        .and_then(Value::as_array)
    else {
        return Ok(Vec::new());
    };

    raw_pairs
        .iter()
        .map(|pair| {
            let field = |key: &str| {
                pair.get(key)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| AggregationError::invalid_data(METHOD, format!("volume pair without {}", key)))
            };
            let volume = pair.get("volume").and_then(decimal_from).unwrap_or(Decimal::ZERO);
            if volume.is_sign_negative() && !volume.is_zero() {
                return Err(AggregationError::invalid_data(METHOD, format!("negative volume {}", volume)));
            }
            Ok(VolumePair {
                from: field("currency")?,
                to: field("convertto")?,
                volume,
                ohlc: parse_ohlc(pair)?,
            })
        })
        .collect()
}

/// Candle fields of a volume pair; absent when the daemon sent none of them
fn parse_ohlc(pair: &Value) -> Result<Option<Ohlc>, AggregationError> {
    const KEYS: [&str; 4] = ["open", "high", "low", "close"];
    if KEYS.iter().all(|key| pair.get(key).is_none()) {
        return Ok(None);
    }

    let mut values = [Decimal::ZERO; 4];
    for (value, key) in values.iter_mut().zip(KEYS) {
        *value = pair.get(key).and_then(decimal_from).unwrap_or(Decimal::ZERO);
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AggregationError::invalid_data(
                "getcurrencystate",
                format!("negative {} {}", key, value),
            ));
        }
    }

    let [open, high, low, close] = values;
    Ok(Some(Ohlc { open, high, low, close }))
}

fn find_pair<'a>(volumes: &'a ConverterVolumes, measured_in: &str, from: &str, to: &str) -> Option<&'a VolumePair> {
    volumes
        .get(measured_in)
        .and_then(|pairs| pairs.iter().find(|p| p.from == from && p.to == to))
}

/// Share of the converter's liquidity held by two of its reserves
fn pair_liquidity(converter: &Converter, base: &Reserve, quote: &Reserve, converter_usd: Decimal) -> Decimal {
    let total_weight: Decimal = converter.reserves.iter().map(|r| r.weight).sum();
    if base.weight <= Decimal::ZERO || quote.weight <= Decimal::ZERO || total_weight <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    (base.weight + quote.weight)
        .checked_div(total_weight)
        .and_then(|share| share.checked_mul(converter_usd))
        .map(|usd| usd.round_dp(PRICE_DECIMALS))
        .unwrap_or(Decimal::ZERO)
}

/// Every ordered pair of distinct reserves is one pool
fn converter_pools(converter: &Converter, volumes: &ConverterVolumes, converter_usd: Decimal) -> Vec<PoolState> {
    let pool_id = converter.id.clone().unwrap_or_else(|| converter.name.clone());
    let mut pools = Vec::new();

    for base in &converter.reserves {
        for quote in &converter.reserves {
            if base.currency_id == quote.currency_id {
                continue;
            }
            let volume_in = |measured_in: &str| {
                find_pair(volumes, measured_in, &base.symbol, &quote.symbol)
                    .map(|p| p.volume)
                    .unwrap_or(Decimal::ZERO)
            };
            // The quote-currency call carries the candle
            let ohlc = find_pair(volumes, &quote.symbol, &base.symbol, &quote.symbol)
                .and_then(|p| p.ohlc)
                .map(Ohlc::inverted);

            pools.push(PoolState {
                pool_id: pool_id.clone(),
                pool_name: converter.name.clone(),
                base_currency: base.symbol.clone(),
                quote_currency: quote.symbol.clone(),
                base_currency_id: base.currency_id.clone(),
                quote_currency_id: quote.currency_id.clone(),
                base_reserve: base.amount,
                quote_reserve: quote.amount,
                price: PoolState::implied_price(base.amount, quote.amount),
                volume_24h: volume_in(&base.symbol),
                quote_volume_24h: volume_in(&quote.symbol),
                ohlc,
                liquidity_usd: pair_liquidity(converter, base, quote, converter_usd),
                identity_address: converter.id.clone(),
            });
        }
    }
    pools
}

/// Reads a JSON number or numeric string as a decimal
fn decimal_from(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Decimal::from)
            .or_else(|| n.as_u64().map(Decimal::from))
            .or_else(|| n.as_f64().and_then(Decimal::from_f64))
            .map(|d| d.round_dp(PRICE_DECIMALS).normalize()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::mock::{self, MockTransport, BRIDGE_ID, DAI_ID, MYSTERY_ID, VRSC_ID};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn aggregator(transport: Arc<MockTransport>, retry: RetryPolicy) -> MarketDataAggregator {
        MarketDataAggregator::new(transport, retry)
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_build_snapshot_from_daemon() {
        let transport = Arc::new(MockTransport::daemon(3_000_000));
        let snapshot = aggregator(transport, RetryPolicy::none())
            .build_snapshot()
            .await
            .unwrap();

        assert_eq!(snapshot.chain_height, 3_000_000);
        assert_eq!(snapshot.block_range.start, 3_000_000 - 1440);
        assert_eq!(snapshot.converter_count, 3);

        let keys: Vec<(&str, &str, &str)> = snapshot
            .pools
            .iter()
            .map(|p| (p.pool_name.as_str(), p.base_currency.as_str(), p.quote_currency.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("Bridge.vETH", "DAI.vETH", "VRSC"),
                ("Bridge.vETH", "VRSC", "DAI.vETH"),
                ("Legacy", "DAI.vETH", "VRSC"),
                ("Legacy", "VRSC", "DAI.vETH"),
                ("Pure", "Mystery", "VRSC"),
                ("Pure", "VRSC", "Mystery"),
            ]
        );

        let vrsc_dai = &snapshot.pools[1];
        assert_eq!(vrsc_dai.pool_id, BRIDGE_ID);
        assert_eq!(vrsc_dai.identity_address.as_deref(), Some(BRIDGE_ID));
        assert_eq!(vrsc_dai.base_currency_id, VRSC_ID);
        assert_eq!(vrsc_dai.quote_currency_id, DAI_ID);
        assert_eq!(vrsc_dai.base_reserve, Decimal::from(1000));
        assert_eq!(vrsc_dai.quote_reserve, Decimal::from(2000));
        assert_eq!(vrsc_dai.price, Some(Decimal::from(2)));
        assert_eq!(vrsc_dai.volume_24h, Decimal::from(150));
        assert_eq!(vrsc_dai.quote_volume_24h, Decimal::from(300));
        assert_eq!(vrsc_dai.liquidity_usd, Decimal::from(1000));
        assert_eq!(
            vrsc_dai.ohlc,
            Some(Ohlc {
                open: Decimal::from(2),
                high: Decimal::new(25, 1),
                low: Decimal::new(16, 1),
                close: Decimal::from(2),
            })
        );

        let dai_vrsc = &snapshot.pools[0];
        assert_eq!(dai_vrsc.volume_24h, Decimal::from(80));
        assert_eq!(dai_vrsc.quote_volume_24h, Decimal::from(40));

        let legacy = &snapshot.pools[3];
        assert_eq!(legacy.pool_id, "Legacy");
        assert_eq!(legacy.identity_address, None);

        let mystery_vrsc = &snapshot.pools[4];
        assert_eq!(mystery_vrsc.base_currency_id, MYSTERY_ID);
        assert_eq!(mystery_vrsc.price, None);
        assert_eq!(mystery_vrsc.ohlc, None);
        assert!(!mystery_vrsc.has_volume());
        assert_eq!(snapshot.pools[5].price, Some(Decimal::ZERO));
        assert_eq!(snapshot.pools[5].volume_24h, Decimal::from(5));
    }

    #[tokio::test]
    async fn test_liquidity_is_priced_through_vrsc() {
        let transport = Arc::new(MockTransport::daemon(10));
        let snapshot = aggregator(transport.clone(), RetryPolicy::none())
            .build_snapshot()
            .await
            .unwrap();

        // One VRSC/USD estimate plus one per active converter
        assert_eq!(transport.call_count("estimateconversion"), 4);
        assert!(snapshot.pools.iter().all(|p| p.liquidity_usd == Decimal::from(1000)));
    }

    #[tokio::test]
    async fn test_failed_estimate_fails_the_whole_snapshot() {
        let daemon = mock::verus_daemon(10);
        let transport = Arc::new(MockTransport::with_handler(move |method, params| {
            if method == "estimateconversion" && params[0]["currency"] == "Legacy" {
                return Err(RpcError::protocol(method, -5, "Cannot find currency"));
            }
            daemon(method, params)
        }));

        let err = aggregator(transport, RetryPolicy::none())
            .build_snapshot()
            .await
            .unwrap_err();
        assert!(matches!(err, AggregationError::Rpc(RpcError::Protocol { code: -5, .. })));
    }

    #[test]
    fn test_pair_liquidity_splits_by_weight() {
        let reserve = |symbol: &str, weight: i64| Reserve {
            currency_id: format!("i{}", symbol),
            symbol: symbol.to_string(),
            amount: Decimal::from(100),
            weight: Decimal::new(weight, 2),
        };
        let converter = Converter {
            name: "Basket".to_string(),
            id: None,
            supply: Decimal::from(10),
            reserves: vec![reserve("A", 50), reserve("B", 25), reserve("C", 25)],
        };
        let usd = Decimal::from(400);

        assert_eq!(pair_liquidity(&converter, &converter.reserves[0], &converter.reserves[1], usd), Decimal::from(300));
        assert_eq!(pair_liquidity(&converter, &converter.reserves[1], &converter.reserves[2], usd), Decimal::from(200));

        let mut unweighted = converter.clone();
        unweighted.reserves[2].weight = Decimal::ZERO;
        assert_eq!(pair_liquidity(&unweighted, &unweighted.reserves[0], &unweighted.reserves[2], usd), Decimal::ZERO);
    }

    #[test]
    fn test_parse_ohlc() {
        assert_eq!(parse_ohlc(&json!({"volume": 1})).unwrap(), None);
        assert_eq!(
            parse_ohlc(&json!({"open": 1, "close": "0.5"})).unwrap(),
            Some(Ohlc {
                open: Decimal::ONE,
                high: Decimal::ZERO,
                low: Decimal::ZERO,
                close: Decimal::new(5, 1),
            })
        );
        assert!(parse_ohlc(&json!({"low": -1})).is_err());
    }

    #[tokio::test]
    async fn test_currency_names_are_memoised() {
        let transport = Arc::new(MockTransport::daemon(10));
        let aggregator = aggregator(transport.clone(), RetryPolicy::none());

        aggregator.build_snapshot().await.unwrap();
        aggregator.build_snapshot().await.unwrap();

        assert_eq!(transport.call_count("getcurrency"), 1);
        assert_eq!(transport.call_count("getinfo"), 2);
    }

    #[tokio::test]
    async fn test_any_failed_call_fails_the_whole_snapshot() {
        let daemon = mock::verus_daemon(10);
        let transport = Arc::new(MockTransport::with_handler(move |method, params| {
            if method == "getcurrencystate" && params[0] == "Pure" {
                return Err(RpcError::protocol(method, -8, "state unavailable"));
            }
            daemon(method, params)
        }));

        let err = aggregator(transport, RetryPolicy::none())
            .build_snapshot()
            .await
            .unwrap_err();
        assert!(matches!(err, AggregationError::Rpc(RpcError::Protocol { code: -8, .. })));
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried() {
        let daemon = mock::verus_daemon(10);
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = failures.clone();
        let transport = Arc::new(MockTransport::with_handler(move |method, params| {
            if method == "getinfo" && counter.fetch_add(1, Ordering::SeqCst) < 2 {
                return Err(RpcError::transport(method, "connection reset"));
            }
            daemon(method, params)
        }));

        let snapshot = aggregator(transport.clone(), fast_retry(3)).build_snapshot().await;
        assert!(snapshot.is_ok());
        assert_eq!(transport.call_count("getinfo"), 3);
    }

    #[tokio::test]
    async fn test_protocol_errors_are_not_retried() {
        let transport = Arc::new(MockTransport::with_handler(|method, _| {
            Err(RpcError::protocol(method, -28, "Loading block index"))
        }));

        let err = aggregator(transport.clone(), fast_retry(3))
            .build_snapshot()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "RPC_PROTOCOL");
        assert_eq!(transport.call_count("getinfo"), 1);
    }

    #[tokio::test]
    async fn test_negative_reserve_is_invalid_data() {
        let transport = Arc::new(MockTransport::with_handler(|method, _| match method {
            "getinfo" => Ok(json!({"blocks": 5})),
            "getcurrencyconverters" => Ok(json!([{
                "fullyqualifiedname": "Broken",
                "lastnotarization": {"currencystate": {"reservecurrencies": [
                    {"currencyid": VRSC_ID, "reserves": -1.0}
                ]}}
            }])),
            _ => Ok(json!([])),
        }));

        let err = aggregator(transport, RetryPolicy::none())
            .build_snapshot()
            .await
            .unwrap_err();
        assert!(matches!(err, AggregationError::InvalidData { .. }));
    }

    #[tokio::test]
    async fn test_metrics_record_runs() {
        let transport = Arc::new(MockTransport::daemon(10));
        let aggregator = aggregator(transport.clone(), RetryPolicy::none());

        aggregator.build_snapshot().await.unwrap();
        transport.set_down(true);
        assert!(aggregator.build_snapshot().await.is_err());

        let metrics = aggregator.metrics().await;
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.failed_requests, 1);
    }

    #[test]
    fn test_decimal_from() {
        assert_eq!(decimal_from(&json!(12)), Some(Decimal::from(12)));
        assert_eq!(decimal_from(&json!(0.5)), Some(Decimal::new(5, 1)));
        assert_eq!(decimal_from(&json!("1.25")), Some(Decimal::new(125, 2)));
        assert_eq!(decimal_from(&json!(null)), None);
    }
}

//! Coinpaprika `allTickers` document

use super::{candle, fmt8, is_listed, TickerFormat, SENTINEL};
use crate::{currencies, error::AdapterError, types::Snapshot};
use serde_json::{json, Value};

const SUCCESS_CODE: &str = "200000";

/// Tickers named by ERC20 symbol, highest volume first
pub struct Coinpaprika;

impl TickerFormat for Coinpaprika {
    fn name(&self) -> &'static str {
        "coinpaprika"
    }

    fn render(&self, snapshot: &Snapshot) -> Result<Value, AdapterError> {
        snapshot.check_invariants()?;

        let mut listed: Vec<_> = snapshot.pools.iter().filter(|pool| is_listed(pool)).collect();
        // Stable, so equal volumes keep canonical order
        listed.sort_by(|a, b| b.volume_24h.cmp(&a.volume_24h));

        let tickers: Vec<Value> = listed
            .into_iter()
            .map(|pool| {
                let symbol = format!(
                    "{}-{}",
                    currencies::erc20_symbol(&pool.base_currency_id, &pool.base_currency),
                    currencies::erc20_symbol(&pool.quote_currency_id, &pool.quote_currency),
                );
                // Last traded close, the reserve ratio when nothing closed
                let last = pool
                    .ohlc
                    .map(|ohlc| ohlc.close)
                    .filter(|close| !close.is_zero())
                    .or(pool.price)
                    .map(fmt8)
                    .unwrap_or_else(|| SENTINEL.to_string());
                let [high, low, open] = candle(pool);
                json!({
                    "symbol": symbol,
                    "symbolName": symbol,
                    "volume": fmt8(pool.volume_24h),
                    "last": last,
                    "high": high,
                    "low": low,
                    "open": open,
                })
            })
            .collect();

        Ok(json!({
            "code": SUCCESS_CODE,
            "data": {
                "time": snapshot.fetched_at_unix_ms,
                "ticker": tickers,
            }
        }))
    }
}

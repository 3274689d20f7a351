//! CoinGecko DEX tickers

use super::{candle, fmt8, is_listed, TickerFormat};
use crate::{error::AdapterError, types::Snapshot};
use serde_json::{json, Value};

/// One object per priced, listed pool, in canonical pool order
pub struct CoinGecko;

impl TickerFormat for CoinGecko {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    fn render(&self, snapshot: &Snapshot) -> Result<Value, AdapterError> {
        snapshot.check_invariants()?;

        let tickers: Vec<Value> = snapshot
            .pools
            .iter()
            .filter(|pool| is_listed(pool))
            .filter_map(|pool| {
                let price = fmt8(pool.price?);
                let [high, low, open] = candle(pool);
                Some(json!({
                    "ticker_id": format!("{}-{}", pool.base_currency, pool.quote_currency),
                    "base_currency": pool.base_currency,
                    "target_currency": pool.quote_currency,
                    "pool_id": pool.pool_id,
                    "last_price": price,
                    "base_volume": fmt8(pool.volume_24h),
                    "target_volume": fmt8(pool.quote_volume_24h),
                    "bid": price,
                    "ask": price,
                    "high": high,
                    "low": low,
                    "open": open,
                    "liquidity_in_usd": fmt8(pool.liquidity_usd),
                }))
            })
            .collect();

        Ok(Value::Array(tickers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::mock::pool;
    use crate::formats::fixtures::*;
    use crate::formats::SENTINEL;
    use crate::types::Ohlc;
    use rust_decimal::Decimal;

    #[test]
    fn test_ticker_fields() {
        let rendered = CoinGecko.render(&market()).unwrap();
        let tickers = rendered.as_array().unwrap();
        let deep = &tickers[1];

        assert_eq!(deep["ticker_id"], "VRSC-DAI.vETH");
        assert_eq!(deep["base_currency"], "VRSC");
        assert_eq!(deep["target_currency"], "DAI.vETH");
        assert_eq!(deep["pool_id"], "iDeep");
        assert_eq!(deep["last_price"], "2.00000000");
        assert_eq!(deep["bid"], "2.00000000");
        assert_eq!(deep["ask"], "2.00000000");
        assert_eq!(deep["base_volume"], "5.00000000");
        assert_eq!(deep["target_volume"], "10.00000000");
        assert_eq!(deep["high"], SENTINEL);
        assert_eq!(deep["liquidity_in_usd"], "0.00000000");
    }

    #[test]
    fn test_candle_and_liquidity() {
        let mut traded = pool("Bridge.vETH", ("VRSC", VRSC_ID), ("DAI.vETH", DAI_ID), 1000, 2000);
        traded.ohlc = Some(Ohlc {
            open: Decimal::new(19, 1),
            high: Decimal::new(25, 1),
            low: Decimal::new(16, 1),
            close: Decimal::from(2),
        });
        traded.liquidity_usd = Decimal::new(123456, 2);

        let rendered = CoinGecko.render(&snapshot(vec![traded])).unwrap();
        let ticker = &rendered[0];
        assert_eq!(ticker["open"], "1.90000000");
        assert_eq!(ticker["high"], "2.50000000");
        assert_eq!(ticker["low"], "1.60000000");
        assert_eq!(ticker["last_price"], "2.00000000");
        assert_eq!(ticker["liquidity_in_usd"], "1234.56000000");
    }

    #[test]
    fn test_basket_pairs_are_excluded() {
        let rendered = CoinGecko.render(&market()).unwrap();
        let ids: Vec<&str> = rendered
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["ticker_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["VRSC-vETH", "VRSC-DAI.vETH", "VRSC-DAI.vETH"]);
    }

    #[test]
    fn test_pool_without_identity_is_listed() {
        let rendered = CoinGecko.render(&market()).unwrap();
        let legacy = rendered
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["pool_id"] == "Legacy");
        assert!(legacy.is_some());
    }

    #[test]
    fn test_unpriced_pools_are_omitted() {
        let unpriced = pool("Pure", ("Mystery", "iMystery"), ("VRSC", VRSC_ID), 0, 500);
        let rendered = CoinGecko.render(&snapshot(vec![unpriced])).unwrap();
        assert_eq!(rendered, json!([]));
    }
}

//! CoinMarketCap tickers keyed by Verus i-address

use super::{coinmarketcap::select_pairs, fmt8, is_listed, TickerFormat};
use crate::{error::AdapterError, types::Snapshot};
use serde_json::{json, Map, Value};

/// Object keyed `{base_currency_id}_{quote_currency_id}`
pub struct CoinMarketCapIAddress;

impl TickerFormat for CoinMarketCapIAddress {
    fn name(&self) -> &'static str {
        "coinmarketcap_iaddress"
    }

    fn render(&self, snapshot: &Snapshot) -> Result<Value, AdapterError> {
        snapshot.check_invariants()?;

        let listed = snapshot.pools.iter().filter(|pool| {
            pool.identity_address.is_some() && pool.price.is_some() && is_listed(pool)
        });

        let key = |pool: &crate::types::PoolState| {
            format!("{}_{}", pool.base_currency_id, pool.quote_currency_id)
        };

        let tickers: Map<String, Value> = select_pairs(listed, key)
            .into_iter()
            .map(|(key, pool)| {
                let ticker = json!({
                    "base_id": pool.base_currency_id,
                    "base_name": pool.base_currency,
                    "base_symbol": pool.base_currency,
                    "quote_id": pool.quote_currency_id,
                    "quote_name": pool.quote_currency,
                    "quote_symbol": pool.quote_currency,
                    "last_price": pool.price.map(fmt8),
                    "base_volume": fmt8(pool.volume_24h),
                    "quote_volume": fmt8(pool.quote_volume_24h),
                });
                (key, ticker)
            })
            .collect();

        Ok(Value::Object(tickers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::fixtures::*;

    #[test]
    fn test_keys_are_currency_ids() {
        let rendered = CoinMarketCapIAddress.render(&market()).unwrap();
        let key = format!("{}_{}", VRSC_ID, DAI_ID);

        assert_eq!(rendered[&key]["base_id"], VRSC_ID);
        assert_eq!(rendered[&key]["quote_id"], DAI_ID);
        assert_eq!(rendered[&key]["quote_symbol"], "DAI.vETH");
        assert_eq!(rendered[&key]["last_price"], "2.00000000");
    }

    #[test]
    fn test_pool_without_identity_is_excluded() {
        let mut only_legacy = market().pools.as_ref().clone();
        only_legacy.retain(|pool| pool.pool_name == "Legacy");
        let rendered = CoinMarketCapIAddress.render(&snapshot(only_legacy)).unwrap();
        assert_eq!(rendered, json!({}));
    }
}

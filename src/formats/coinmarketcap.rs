//! CoinMarketCap DEX tickers

use super::{fmt8, is_listed, TickerFormat};
use crate::{currencies, error::AdapterError, types::PoolState, types::Snapshot};
use serde_json::{json, Map, Value};
use std::collections::btree_map::{BTreeMap, Entry};

/// Object keyed `{base}_{quote}` by display symbol
pub struct CoinMarketCap;

/// Keeps one pool per key
///
/// The pool with the greater quote reserve wins a collision; on a tie the
/// first in canonical order stays.
pub(super) fn select_pairs<'a, I, K>(pools: I, key: K) -> BTreeMap<String, &'a PoolState>
where
    I: IntoIterator<Item = &'a PoolState>,
    K: Fn(&PoolState) -> String,
{
    let mut selected = BTreeMap::new();
    for pool in pools {
        match selected.entry(key(pool)) {
            Entry::Vacant(slot) => {
                slot.insert(pool);
            }
            Entry::Occupied(mut slot) => {
                if pool.quote_reserve > slot.get().quote_reserve {
                    tracing::debug!(
                        key = %slot.key(),
                        kept = %pool.pool_id,
                        dropped = %slot.get().pool_id,
                        "Pair key collision"
                    );
                    slot.insert(pool);
                }
            }
        }
    }
    selected
}

impl TickerFormat for CoinMarketCap {
    fn name(&self) -> &'static str {
        "coinmarketcap"
    }

    fn render(&self, snapshot: &Snapshot) -> Result<Value, AdapterError> {
        snapshot.check_invariants()?;

        let listed = snapshot
            .pools
            .iter()
            .filter(|pool| pool.price.is_some() && is_listed(pool));

        let tickers: Map<String, Value> = select_pairs(listed, PoolState::symbol_key)
            .into_iter()
            .map(|(key, pool)| {
                let ticker = json!({
                    "base_id": currency_id(&pool.base_currency_id),
                    "base_name": pool.base_currency,
                    "base_symbol": currencies::erc20_symbol(&pool.base_currency_id, &pool.base_currency),
                    "quote_id": currency_id(&pool.quote_currency_id),
                    "quote_name": pool.quote_currency,
                    "quote_symbol": currencies::erc20_symbol(&pool.quote_currency_id, &pool.quote_currency),
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

/// ERC20 contract address for bridged currencies, else the i-address
fn currency_id(id: &str) -> &str {
    currencies::lookup(id).map_or(id, |known| known.eth_address)
}

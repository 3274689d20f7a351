//! Ticker format adapters
//!
//! Each adapter maps a [`Snapshot`] to one third-party JSON schema. Adapters
//! are pure: they never call out, never re-sort pools and never swallow an
//! invalid snapshot.

mod coingecko;
mod coinmarketcap;
mod coinpaprika;
mod iaddress;

pub use coingecko::CoinGecko;
pub use coinmarketcap::CoinMarketCap;
pub use coinpaprika::Coinpaprika;
pub use iaddress::CoinMarketCapIAddress;

use crate::{
    constants::PRICE_DECIMALS,
    currencies,
    error::AdapterError,
    types::{PoolState, Snapshot},
};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;

/// Rendered for schema fields the market model does not carry
pub const SENTINEL: &str = "0.00000000";

/// A renderer for one external ticker schema
pub trait TickerFormat: Send + Sync {
    /// Route segment the format is served under
    fn name(&self) -> &'static str;

    /// Renders the snapshot
    ///
    /// # Errors
    /// `AdapterError` when the snapshot breaks a structural invariant
    fn render(&self, snapshot: &Snapshot) -> Result<Value, AdapterError>;
}

/// Route-selected ticker formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    CoinGecko,
    CoinMarketCap,
    Coinpaprika,
    CoinMarketCapIAddress,
}

impl Format {
    pub const ALL: [Format; 4] = [
        Format::CoinGecko,
        Format::CoinMarketCap,
        Format::Coinpaprika,
        Format::CoinMarketCapIAddress,
    ];

    pub fn adapter(self) -> &'static dyn TickerFormat {
        match self {
            Format::CoinGecko => &CoinGecko,
            Format::CoinMarketCap => &CoinMarketCap,
            Format::Coinpaprika => &Coinpaprika,
            Format::CoinMarketCapIAddress => &CoinMarketCapIAddress,
        }
    }

    pub fn name(self) -> &'static str {
        self.adapter().name()
    }

    pub fn from_route(route: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|format| format.name() == route)
    }

    pub fn render(self, snapshot: &Snapshot) -> Result<Value, AdapterError> {
        self.adapter().render(snapshot)
    }
}

/// `high`, `low` and `open` of a pool, sentinels when the daemon reported no candle
fn candle(pool: &PoolState) -> [String; 3] {
    match &pool.ohlc {
        Some(ohlc) => [fmt8(ohlc.high), fmt8(ohlc.low), fmt8(ohlc.open)],
        None => [SENTINEL.to_string(), SENTINEL.to_string(), SENTINEL.to_string()],
    }
}

/// Fixed 8-decimal string, never scientific notation
pub fn fmt8(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(PRICE_DECIMALS, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", PRICE_DECIMALS as usize, rounded)
}

/// Number of pairs in a rendered document
pub fn pair_count(rendered: &Value) -> usize {
    match rendered {
        Value::Array(items) => items.len(),
        Value::Object(map) => match map.get("data").and_then(|d| d.get("ticker")) {
            Some(Value::Array(tickers)) => tickers.len(),
            _ => map.len(),
        },
        _ => 0,
    }
}

/// Pools eligible for the exchange-listing formats: traded in the window,
/// no basket currency on either side, not on an excluded chain
fn is_listed(pool: &PoolState) -> bool {
    pool.has_volume()
        && !currencies::is_converter_currency(&pool.base_currency_id)
        && !currencies::is_converter_currency(&pool.quote_currency_id)
        && !currencies::is_excluded_chain(&pool.pool_name)
}

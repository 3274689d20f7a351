//! Constants for the Verus ticker API
//!
//! Compile-time defaults. Every value that an operator may want to change is
//! also exposed through [`crate::config::Settings`], which falls back to the
//! values below.

/// How long a cached snapshot is served before it becomes refreshable (in seconds)
pub const CACHE_TTL_SECS: u64 = 60;

/// RPC request timeout (in milliseconds)
pub const RPC_TIMEOUT_MS: u64 = 30_000;

/// Timeout for the `/health` daemon check (in milliseconds)
pub const HEALTH_CHECK_TIMEOUT_MS: u64 = 5_000;

/// Maximum number of attempts for a single RPC call that fails at the transport level
pub const MAX_RETRY_ATTEMPTS: u32 = 2;

/// Initial backoff delay for retries (in milliseconds)
pub const INITIAL_BACKOFF_MS: u64 = 250;

/// Maximum backoff delay for retries (in milliseconds)
pub const MAX_BACKOFF_MS: u64 = 2_000;

/// Default daemon host
pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";

/// Default daemon RPC port (VRSC mainnet)
pub const DEFAULT_RPC_PORT: u16 = 27486;

/// Default daemon RPC user
pub const DEFAULT_RPC_USER: &str = "user";

/// Default daemon RPC password
pub const DEFAULT_RPC_PASSWORD: &str = "password";

/// Default HTTP bind address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8765";

/// System whose converters are listed
pub const SYSTEM_ID: &str = "VRSC";

/// Currency treated as one US dollar when pricing liquidity
pub const USD_REFERENCE_CURRENCY: &str = "DAI.vETH";

/// Converter the VRSC/USD rate is estimated through
pub const USD_REFERENCE_CONVERTER: &str = "Bridge.vETH";

/// Volume window and interval, in blocks (~24h at one-minute blocks)
pub const VOLUME_WINDOW_BLOCKS: u64 = 1440;

/// Fixed-point precision used by every rendered number
pub const PRICE_DECIMALS: u32 = 8;

/// User agent for RPC requests
pub const USER_AGENT: &str = "verus-ticker-api/0.1.0";

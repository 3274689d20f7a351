//! Runtime settings
//!
//! Values are read from the process environment (after an optional `.env` file
//! has been loaded by the binary) and fall back to the defaults in
//! [`crate::constants`].

use crate::{
    constants::{
        CACHE_TTL_SECS, DEFAULT_BIND_ADDR, DEFAULT_RPC_HOST, DEFAULT_RPC_PASSWORD,
        DEFAULT_RPC_PORT, DEFAULT_RPC_USER, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS,
        MAX_RETRY_ATTEMPTS, RPC_TIMEOUT_MS,
    },
    error::ConfigError,
};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// How callers behave when they find a refresh already in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Wait for the in-flight refresh and share its result
    #[default]
    Await,
    /// Return the previous snapshot immediately when one exists
    NonBlocking,
}

impl FromStr for RefreshMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "await" | "blocking" => Ok(Self::Await),
            "non_blocking" | "non-blocking" | "nonblocking" => Ok(Self::NonBlocking),
            other => Err(format!("unknown refresh mode '{}'", other)),
        }
    }
}

/// Daemon connection settings
#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub url: String,
    pub user: String,
    pub password: String,
    pub timeout: Duration,
}

/// Retry policy applied by the aggregator to transport failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRY_ATTEMPTS,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Cache settings
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub refresh_mode: RefreshMode,
    pub background_refresh: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(CACHE_TTL_SECS),
            refresh_mode: RefreshMode::default(),
            background_refresh: true,
        }
    }
}

/// All service settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub rpc: RpcSettings,
    pub retry: RetryPolicy,
    pub cache: CacheSettings,
}

impl Settings {
    /// Loads settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = match lookup("VERUS_RPC_URL").filter(|v| !v.trim().is_empty()) {
            Some(url) => url,
            None => {
                let host = lookup("VERUS_RPC_HOST").unwrap_or_else(|| DEFAULT_RPC_HOST.to_string());
                let port: u16 = parse_or("VERUS_RPC_PORT", &lookup, DEFAULT_RPC_PORT)?;
                format!("http://{}:{}", host, port)
            }
        };

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::invalid(
                "VERUS_RPC_URL",
                url,
                "expected an http:// or https:// URL",
            ));
        }

        let rpc = RpcSettings {
            url,
            user: lookup("VERUS_RPC_USER").unwrap_or_else(|| DEFAULT_RPC_USER.to_string()),
            password: lookup("VERUS_RPC_PASSWORD")
                .unwrap_or_else(|| DEFAULT_RPC_PASSWORD.to_string()),
            timeout: Duration::from_millis(parse_or(
                "VERUS_RPC_TIMEOUT_MS",
                &lookup,
                RPC_TIMEOUT_MS,
            )?),
        };

        let max_attempts: u32 = parse_or("RPC_MAX_RETRIES", &lookup, MAX_RETRY_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err(ConfigError::invalid("RPC_MAX_RETRIES", "0", "must be at least 1"));
        }
        let retry = RetryPolicy {
            max_attempts,
            ..RetryPolicy::default()
        };

        let ttl_secs: u64 = parse_or("CACHE_TTL_SECS", &lookup, CACHE_TTL_SECS)?;
        if ttl_secs == 0 {
            return Err(ConfigError::invalid("CACHE_TTL_SECS", "0", "must be positive"));
        }
        let cache = CacheSettings {
            ttl: Duration::from_secs(ttl_secs),
            refresh_mode: parse_or("CACHE_REFRESH_MODE", &lookup, RefreshMode::default())?,
            background_refresh: parse_bool_or("CACHE_BACKGROUND_REFRESH", &lookup, true)?,
        };

        let bind_addr = parse_or(
            "BIND_ADDR",
            &lookup,
            DEFAULT_BIND_ADDR
                .parse::<SocketAddr>()
                .map_err(|e| ConfigError::invalid("BIND_ADDR", DEFAULT_BIND_ADDR, e.to_string()))?,
        )?;

        Ok(Self {
            bind_addr,
            rpc,
            retry,
            cache,
        })
    }
}

fn parse_or<T, F>(key: &'static str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, raw.clone(), e.to_string())),
        _ => Ok(default),
    }
}

fn parse_bool_or<F>(key: &'static str, lookup: &F, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::invalid(key, v, "expected a boolean")),
        },
    }
}

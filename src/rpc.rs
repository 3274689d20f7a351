//! JSON-RPC gateway to the Verus daemon

use crate::{
    config::RpcSettings,
    constants::USER_AGENT,
    error::RpcError,
    types::now_unix_ms,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// Last observed outcome of talking to the daemon
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reachability {
    pub last_success_unix_ms: Option<i64>,
    pub last_failure_unix_ms: Option<i64>,
    /// Transport error of the last call, cleared once the daemon answers again
    pub last_error: Option<String>,
}

impl Reachability {
    /// True when the most recent call got an answer from the daemon
    pub fn is_reachable(&self) -> bool {
        match (self.last_success_unix_ms, self.last_failure_unix_ms) {
            (Some(ok), Some(failed)) => ok >= failed,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// Trait for JSON-RPC transports
///
/// The production implementation talks HTTP to `verusd`; tests drive the
/// aggregator and the health reporter through [`mock::MockTransport`].
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Issues one JSON-RPC call and returns its `result`
    ///
    /// # Errors
    /// * `RpcError::Transport` - connection refused, reset or timed out
    /// * `RpcError::Protocol` - the daemon returned an error object
    /// * `RpcError::Malformed` - the payload could not be decoded
    async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value, RpcError>;

    /// Timeout applied when the caller has no specific requirement
    fn default_timeout(&self) -> Duration;

    /// Reachability as observed by previous calls
    fn reachability(&self) -> Reachability {
        Reachability::default()
    }
}

/// Fetches the current chain height via `getinfo`
pub async fn block_height(
    transport: &dyn RpcTransport,
    timeout: Duration,
) -> Result<u64, RpcError> {
    let info = transport.call("getinfo", json!([]), timeout).await?;
    info.get("blocks")
        .and_then(Value::as_u64)
        .ok_or_else(|| RpcError::malformed("getinfo", "missing numeric 'blocks' field"))
}

/// HTTP JSON-RPC client for `verusd`
pub struct VerusRpcClient {
    client: Client,
    url: String,
    user: String,
    password: String,
    timeout: Duration,
    next_id: AtomicU64,
    last_success_ms: AtomicI64,
    last_failure_ms: AtomicI64,
    last_error: Mutex<Option<String>>,
}

impl VerusRpcClient {
    /// Creates a new client
    pub fn new(settings: &RpcSettings) -> Result<Self, RpcError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RpcError::transport("client", e.to_string()))?;

        Ok(Self {
            client,
            url: settings.url.clone(),
            user: settings.user.clone(),
            password: settings.password.clone(),
            timeout: settings.timeout,
            next_id: AtomicU64::new(1),
            last_success_ms: AtomicI64::new(0),
            last_failure_ms: AtomicI64::new(0),
            last_error: Mutex::new(None),
        })
    }

    /// Daemon URL this client posts to
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send(&self, method: &str, body: &Value, timeout: Duration) -> Result<Value, RpcError> {
        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.password))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| map_reqwest_error(method, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(method, e))?;

        decode_response(method, status.as_u16(), &text)
    }

    fn record(&self, outcome: &Result<Value, RpcError>) {
        let now = now_unix_ms();
        match outcome {
            // Any decoded answer, error object included, means the daemon is up
            Ok(_) | Err(RpcError::Protocol { .. }) | Err(RpcError::Malformed { .. }) => {
                self.last_success_ms.store(now, Ordering::Release);
                *self.last_error.lock() = None;
            }
            Err(e @ RpcError::Transport { .. }) => {
                self.last_failure_ms.store(now, Ordering::Release);
                *self.last_error.lock() = Some(e.to_string());
            }
        }
    }
}

#[async_trait]
impl RpcTransport for VerusRpcClient {
    async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::debug!(method, id, "RPC call");
        let outcome = self.send(method, &body, timeout).await;
        self.record(&outcome);

        if let Err(e) = &outcome {
            tracing::warn!(method, id, error = %e, "RPC call failed");
        }
        outcome
    }

    fn default_timeout(&self) -> Duration {
        self.timeout
    }

    fn reachability(&self) -> Reachability {
        let as_option = |ms: i64| (ms > 0).then_some(ms);
        Reachability {
            last_success_unix_ms: as_option(self.last_success_ms.load(Ordering::Acquire)),
            last_failure_unix_ms: as_option(self.last_failure_ms.load(Ordering::Acquire)),
            last_error: self.last_error.lock().clone(),
        }
    }
}

fn map_reqwest_error(method: &str, error: reqwest::Error) -> RpcError {
    if error.is_timeout() {
        RpcError::timeout(method)
    } else {
        RpcError::transport(method, error.to_string())
    }
}

/// Decodes a JSON-RPC response body
///
/// `verusd` answers errors with HTTP 500 and a JSON body, so the error object
/// is checked before the status code.
fn decode_response(method: &str, status: u16, text: &str) -> Result<Value, RpcError> {
    let envelope: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) if (200..300).contains(&status) => {
            return Err(RpcError::malformed(method, format!("invalid JSON: {}", e)));
        }
        Err(_) => {
            return Err(RpcError::protocol(
                method,
                i64::from(status),
                format!("HTTP {}: {}", status, truncate(text, 200)),
            ));
        }
    };

    let object = envelope
        .as_object()
        .ok_or_else(|| RpcError::malformed(method, "response is not a JSON object"))?;

    if let Some(error) = object.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(-1);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(RpcError::protocol(method, code, message));
    }

    if !(200..300).contains(&status) {
        return Err(RpcError::protocol(
            method,
            i64::from(status),
            format!("HTTP {} without error object", status),
        ));
    }

    object
        .get("result")
        .cloned()
        .ok_or_else(|| RpcError::malformed(method, "missing 'result' field"))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;

    type Handler = Box<dyn Fn(&str, &Value) -> Result<Value, RpcError> + Send + Sync>;

    /// Mock transport for testing
    pub struct MockTransport {
        handler: Handler,
        calls: std::sync::Mutex<HashMap<String, usize>>,
        down: AtomicBool,
        delay: Option<Duration>,
        last_success_ms: AtomicI64,
    }

    impl MockTransport {
        pub fn with_handler<F>(handler: F) -> Self
        where
            F: Fn(&str, &Value) -> Result<Value, RpcError> + Send + Sync + 'static,
        {
            Self {
                handler: Box::new(handler),
                calls: std::sync::Mutex::new(HashMap::new()),
                down: AtomicBool::new(false),
                delay: None,
                last_success_ms: AtomicI64::new(0),
            }
        }

        /// A daemon serving [`verus_daemon`] at `height`
        pub fn daemon(height: u64) -> Self {
            Self::with_handler(verus_daemon(height))
        }

        /// A daemon that refuses every connection
        pub fn unreachable() -> Self {
            let transport = Self::daemon(0);
            transport.set_down(true);
            transport
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }

        pub fn call_count(&self, method: &str) -> usize {
            self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
        }

        pub fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().values().sum()
        }
    }

    #[async_trait]
    impl RpcTransport for MockTransport {
        async fn call(&self, method: &str, params: Value, _timeout: Duration) -> Result<Value, RpcError> {
            *self.calls.lock().unwrap().entry(method.to_string()).or_insert(0) += 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.down.load(Ordering::SeqCst) {
                return Err(RpcError::transport(method, "connection refused"));
            }
            let outcome = (self.handler)(method, &params);
            if !matches!(outcome, Err(RpcError::Transport { .. })) {
                self.last_success_ms.store(now_unix_ms(), Ordering::SeqCst);
            }
            outcome
        }

        fn default_timeout(&self) -> Duration {
            Duration::from_secs(1)
        }

        fn reachability(&self) -> Reachability {
            let last_success = self.last_success_ms.load(Ordering::SeqCst);
            Reachability {
                last_success_unix_ms: (last_success > 0).then_some(last_success),
                ..Reachability::default()
            }
        }
    }

    pub const VRSC_ID: &str = "i5w5MuNik5NtLcYmNzcvaoixooEebB6MGV";
    pub const DAI_ID: &str = "iGBs4DWztRNvNEJBt4mqHszLxfKTNHTkhM";
    pub const BRIDGE_ID: &str = "i3f7tSctFkiPpiedY8QR5Tep9p4qDVebDx";
    pub const PURE_ID: &str = "iHax5qYQGbcMGqJKKrPorpzUBX2oFFXGnY";
    pub const MYSTERY_ID: &str = "iMysteryCurrency4z9Qx8GhT1pLkVbN";

    fn converter(name: &str, id: Option<&str>, reserves: &[(&str, f64)]) -> Value {
        let reserve_currencies: Vec<Value> = reserves
            .iter()
            .map(|(currency_id, amount)| {
                json!({
                    "currencyid": currency_id,
                    "weight": 1.0 / reserves.len() as f64,
                    "reserves": amount,
                    "priceinreserve": 1.0,
                })
            })
            .collect();

        let mut value = json!({
            "fullyqualifiedname": name,
            "height": 100,
            "output": {"txid": "00", "voutnum": 0},
            "lastnotarization": {
                "currencystate": {
                    "supply": 1000.0,
                    "reservecurrencies": reserve_currencies,
                }
            }
        });
        if let Some(id) = id {
            value[id] = json!({"name": name, "currencyid": id});
        }
        value
    }

    /// Every pair carries the same raw candle, 0.5 quoted as the conversion rate
    fn volume_pairs(pairs: &[(&str, &str, f64)]) -> Value {
        let pairs: Vec<Value> = pairs
            .iter()
            .map(|(from, to, volume)| {
                json!({
                    "currency": from,
                    "convertto": to,
                    "volume": volume,
                    "open": 0.5,
                    "high": 0.625,
                    "low": 0.4,
                    "close": 0.5,
                })
            })
            .collect();
        json!([{ "conversiondata": { "volumepairs": pairs }, "totalvolume": 0 }])
    }

    /// Canned `verusd` answering the calls the aggregator makes
    ///
    /// Converters: `Bridge.vETH` (VRSC 1000 / DAI.vETH 2000), `Legacy` with
    /// no i-address (VRSC 100 / DAI.vETH 300), `Pure` (VRSC 500 / Mystery 0,
    /// Mystery only resolvable through `getcurrency`) and the excluded
    /// `Bridge.CHIPS`. Every basket unit is worth 0.5 VRSC and VRSC is worth
    /// 2 DAI, so each converter holds 1000 USD.
    pub fn verus_daemon(height: u64) -> impl Fn(&str, &Value) -> Result<Value, RpcError> + Send + Sync {
        move |method, params| match method {
            "getinfo" => Ok(json!({"blocks": height, "version": 1000000})),
            "getcurrencyconverters" => Ok(json!([
                converter("Bridge.vETH", Some(BRIDGE_ID), &[(VRSC_ID, 1000.0), (DAI_ID, 2000.0)]),
                converter("Pure", Some(PURE_ID), &[(VRSC_ID, 500.0), (MYSTERY_ID, 0.0)]),
                converter("Legacy", None, &[(VRSC_ID, 100.0), (DAI_ID, 300.0)]),
                converter("Bridge.CHIPS", Some("iChipsBridge"), &[(VRSC_ID, 1.0), ("iChips", 1.0)]),
            ])),
            "getcurrency" => match params[0].as_str() {
                Some(MYSTERY_ID) => Ok(json!({"fullyqualifiedname": "Mystery", "name": "Mystery"})),
                _ => Err(RpcError::protocol("getcurrency", -5, "Invalid currency")),
            },
            "getcurrencystate" => {
                let name = params[0].as_str().unwrap_or_default();
                let volume_currency = params[2].as_str().unwrap_or_default();
                Ok(match (name, volume_currency) {
                    ("Bridge.vETH", "VRSC") => volume_pairs(&[
                        ("VRSC", "DAI.vETH", 150.0),
                        ("DAI.vETH", "VRSC", 40.0),
                    ]),
                    ("Bridge.vETH", "DAI.vETH") => volume_pairs(&[
                        ("VRSC", "DAI.vETH", 300.0),
                        ("DAI.vETH", "VRSC", 80.0),
                    ]),
                    ("Legacy", "VRSC") => volume_pairs(&[("VRSC", "DAI.vETH", 10.0)]),
                    ("Legacy", "DAI.vETH") => volume_pairs(&[("VRSC", "DAI.vETH", 30.0)]),
                    ("Pure", "VRSC") => volume_pairs(&[("VRSC", "Mystery", 5.0)]),
                    _ => volume_pairs(&[]),
                })
            }
            "estimateconversion" => {
                let request = &params[0];
                let rate = match (request["currency"].as_str(), request["convertto"].as_str()) {
                    (Some("VRSC"), Some("DAI.vETH")) => 2.0,
                    (Some(_), Some("VRSC")) => 0.5,
                    _ => return Err(RpcError::protocol(method, -8, "Cannot convert")),
                };
                Ok(json!({"estimatedcurrencyout": rate}))
            }
            other => Err(RpcError::protocol(other, -32601, "Method not found")),
        }
    }
}

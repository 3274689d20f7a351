//! Error types for the Verus ticker API

use thiserror::Error;

/// Errors returned by the RPC gateway
///
/// All variants are `Clone` so a single aggregation failure can be handed to
/// every caller waiting on the same in-flight refresh.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RpcError {
    /// Connection refused, reset, or timed out
    #[error("Transport error calling {method}: {message}")]
    Transport {
        method: String,
        message: String,
        timed_out: bool,
    },

    /// The daemon answered with a JSON-RPC error object
    #[error("RPC error {code} from {method}: {message}")]
    Protocol {
        code: i64,
        message: String,
        method: String,
    },

    /// The payload could not be decoded
    #[error("Malformed response from {method}: {message}")]
    Malformed { method: String, message: String },
}

impl RpcError {
    /// Creates a Transport error
    pub fn transport(method: &str, message: impl Into<String>) -> Self {
        Self::Transport {
            method: method.to_string(),
            message: message.into(),
            timed_out: false,
        }
    }

    /// Creates a Transport error for a call that hit its timeout
    pub fn timeout(method: &str) -> Self {
        Self::Transport {
            method: method.to_string(),
            message: "request timed out".to_string(),
            timed_out: true,
        }
    }

    /// Creates a Protocol error
    pub fn protocol(method: &str, code: i64, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
            method: method.to_string(),
        }
    }

    /// Creates a Malformed error
    pub fn malformed(method: &str, message: impl Into<String>) -> Self {
        Self::Malformed {
            method: method.to_string(),
            message: message.into(),
        }
    }

    /// The RPC method that failed
    pub fn method(&self) -> &str {
        match self {
            Self::Transport { method, .. }
            | Self::Protocol { method, .. }
            | Self::Malformed { method, .. } => method,
        }
    }

    /// Numeric code: the daemon's code for protocol errors, -1 otherwise
    pub fn code(&self) -> i64 {
        match self {
            Self::Protocol { code, .. } => *code,
            _ => -1,
        }
    }

    /// Only transport failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Machine-readable code used in HTTP error bodies
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transport {
                timed_out: true, ..
            } => "RPC_TIMEOUT",
            Self::Transport { .. } => "RPC_TRANSPORT",
            Self::Protocol { .. } => "RPC_PROTOCOL",
            Self::Malformed { .. } => "RPC_MALFORMED",
        }
    }
}

/// Errors that abort building a snapshot
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AggregationError {
    /// A required RPC call failed
    #[error("Aggregation failed: {0}")]
    Rpc(#[from] RpcError),

    /// A response decoded but lacked data the snapshot requires
    #[error("Aggregation failed: invalid data from {method}: {message}")]
    InvalidData { method: String, message: String },

    /// The refresh task died before producing a result
    #[error("Aggregation aborted: {0}")]
    Aborted(String),
}

impl AggregationError {
    /// Creates an InvalidData error
    pub fn invalid_data(method: &str, message: impl Into<String>) -> Self {
        Self::InvalidData {
            method: method.to_string(),
            message: message.into(),
        }
    }

    /// Machine-readable code used in HTTP error bodies
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Rpc(e) => e.error_code(),
            Self::InvalidData { .. } => "AGGREGATION_INVALID_DATA",
            Self::Aborted(_) => "AGGREGATION_ABORTED",
        }
    }

    /// True when the root cause was an RPC timeout
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Rpc(RpcError::Transport {
                timed_out: true,
                ..
            })
        )
    }
}

/// A snapshot violated a structural invariant and cannot be rendered
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdapterError {
    #[error("Pool {pool_id} has negative {field}: {value}")]
    NegativeValue {
        pool_id: String,
        field: &'static str,
        value: String,
    },

    #[error("Pool {pool_id} has a price but base reserve {base_reserve}")]
    PriceWithoutReserve {
        pool_id: String,
        base_reserve: String,
    },
}

/// Invalid configuration values
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(key: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

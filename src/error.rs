//! Unified error types for the market maker.

use rust_decimal::Decimal;
use thiserror::Error;

/// Unified error type for the market maker.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Risk input validation error.
    #[error("risk error: {0}")]
    Risk(#[from] RiskError),

    /// Order execution error.
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Market data error.
    #[error("market error: {0}")]
    Market(#[from] MarketError),

    /// Order record persistence error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors. Raised once at startup, never mid-tick.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Path that failed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Config file is not valid YAML for the expected schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Environment variables could not be parsed.
    #[error("failed to parse environment: {0}")]
    Env(#[from] envy::Error),

    /// A required key is absent.
    #[error("missing required config key: {0}")]
    Missing(&'static str),

    /// A key has an out-of-range value.
    #[error("invalid config value for {key}: {reason}")]
    Invalid {
        /// Offending key.
        key: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Risk computation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    /// Malformed EV input. Never retried.
    #[error("validation error: {0}")]
    Validation(String),
}

/// Errors reported by an exchange client implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    /// Network or exchange hiccup; safe to retry.
    #[error("transient exchange failure: {0}")]
    Transient(String),

    /// The exchange refused the request outright.
    #[error("rejected by exchange: {0}")]
    Rejected(String),

    /// The client does not implement this operation.
    #[error("operation not supported by exchange client: {0}")]
    Unsupported(&'static str),
}

impl ExchangeError {
    /// Whether the retry loop should try again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExchangeError::Transient(_))
    }
}

/// Order execution errors.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Order parameters are malformed.
    #[error("invalid order parameters: {0}")]
    InvalidOrder(String),

    /// Quote too far from fair value. Not retried.
    #[error("price {price} outside band: {distance_bps} bps from fair value {fair_value} (max {max_bps})")]
    PriceBand {
        /// Requested limit price.
        price: Decimal,
        /// Fair value the band was measured against.
        fair_value: Decimal,
        /// Distance from fair value in basis points.
        distance_bps: Decimal,
        /// Configured maximum.
        max_bps: Decimal,
    },

    /// Fair value for the band check could not be fetched.
    #[error("price band check failed for {token_id}: {source}")]
    PriceBandUnavailable {
        /// Instrument that was queried.
        token_id: String,
        /// Underlying exchange error.
        source: ExchangeError,
    },

    /// Non-retryable rejection from the exchange.
    #[error("order rejected: {0}")]
    Rejected(ExchangeError),

    /// Retry budget spent.
    #[error("{operation} failed after {attempts} attempts: {last}")]
    Exhausted {
        /// "order placement" or "order cancel".
        operation: &'static str,
        /// Attempts made.
        attempts: u32,
        /// Last underlying error.
        last: ExchangeError,
    },

    /// Exchange client cannot cancel orders.
    #[error("cancel_order not available on exchange client")]
    CancelUnsupported,

    /// Order record could not be persisted or read.
    #[error("order store error: {0}")]
    Store(#[from] StoreError),
}

/// Market input errors.
#[derive(Error, Debug)]
pub enum MarketError {
    /// Market source could not be read.
    #[error("failed to load markets from {path}: {reason}")]
    LoadFailed {
        /// Source path.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to parse market data.
    #[error("failed to parse market data: {0}")]
    ParseError(String),

    /// Fair value outside [0, 1].
    #[error("market {market_id} fair value {value} outside [0, 1]")]
    FairValueOutOfRange {
        /// Market identifier.
        market_id: String,
        /// Offending value.
        value: Decimal,
    },
}

/// Order record persistence errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("io error on {path}: {source}")]
    Io {
        /// File involved.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Record could not be (de)serialized.
    #[error("json error on {path}: {source}")]
    Json {
        /// File involved.
        path: String,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// A record already exists for this id under the other mode.
    #[error("order {client_order_id} already persisted as {existing}, refusing to write {attempted}")]
    StatusConflict {
        /// Client-side id.
        client_order_id: String,
        /// Status on disk.
        existing: String,
        /// Status being written.
        attempted: String,
    },
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(ExchangeError::Transient("timeout".into()).is_retryable());
        assert!(!ExchangeError::Rejected("bad price".into()).is_retryable());
        assert!(!ExchangeError::Unsupported("cancel_order").is_retryable());
    }

    #[test]
    fn exhausted_error_carries_last_cause() {
        let err = ExecutionError::Exhausted {
            operation: "order placement",
            attempts: 3,
            last: ExchangeError::Transient("502".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("502"));
    }
}

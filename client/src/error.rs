use serde::Serialize;
use solana_client::client_error::{ClientError, ClientErrorKind};
use std::fmt;
use thiserror::Error;

/// Stable, caller-facing error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "NETWORK_ERROR")]
    Network,
    #[serde(rename = "TIMEOUT_ERROR")]
    Timeout,
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    #[serde(rename = "PROOF_ERROR")]
    Proof,
    #[serde(rename = "PRICE_ERROR")]
    Price,
    #[serde(rename = "PRICE_FETCH_ERROR")]
    PriceFetch,
    #[serde(rename = "CONFIG_ERROR")]
    Config,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Network => "NETWORK_ERROR",
            ErrorCode::Timeout => "TIMEOUT_ERROR",
            ErrorCode::Validation => "VALIDATION_ERROR",
            ErrorCode::Proof => "PROOF_ERROR",
            ErrorCode::Price => "PRICE_ERROR",
            ErrorCode::PriceFetch => "PRICE_FETCH_ERROR",
            ErrorCode::Config => "CONFIG_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("{message}")]
    Validation {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Proof error: {0}")]
    Proof(String),

    #[error("No price data available: {0}")]
    Price(String),

    #[error("Failed to fetch price for {pair}")]
    PriceFetch {
        /// Requested pair, as given by the caller
        pair: String,
        #[source]
        source: Box<OracleError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl OracleError {
    pub fn validation(message: impl Into<String>) -> Self {
        OracleError::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with(message: impl Into<String>, details: serde_json::Value) -> Self {
        OracleError::Validation {
            message: message.into(),
            details: Some(details),
        }
    }

    /// Wrap `self` as the coarse "could not produce a quote" error for `pair`.
    /// An error that is already a `PriceFetch` is returned unchanged.
    pub fn into_price_fetch(self, pair: impl fmt::Display) -> Self {
        match self {
            err @ OracleError::PriceFetch { .. } => err,
            other => OracleError::PriceFetch {
                pair: pair.to_string(),
                source: Box::new(other),
            },
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            OracleError::Network(_) => ErrorCode::Network,
            OracleError::Timeout(_) => ErrorCode::Timeout,
            OracleError::Validation { .. } => ErrorCode::Validation,
            OracleError::Proof(_) => ErrorCode::Proof,
            OracleError::Price(_) => ErrorCode::Price,
            OracleError::PriceFetch { .. } => ErrorCode::PriceFetch,
            OracleError::Config(_) => ErrorCode::Config,
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            OracleError::Validation { details, .. } => details.clone(),
            OracleError::PriceFetch { pair, source } => Some(serde_json::json!({
                "pair": pair,
                "cause": {
                    "code": source.code(),
                    "message": source.to_string(),
                    "details": source.details(),
                },
            })),
            _ => None,
        }
    }

    /// Innermost error of a `PriceFetch` chain
    pub fn root_cause(&self) -> &OracleError {
        match self {
            OracleError::PriceFetch { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Failures worth another aggregation attempt within the same fetch
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OracleError::Network(_) | OracleError::Timeout(_) | OracleError::Price(_)
        )
    }
}

impl From<ClientError> for OracleError {
    fn from(err: ClientError) -> Self {
        match err.kind() {
            ClientErrorKind::Reqwest(e) if e.is_timeout() => OracleError::Timeout(e.to_string()),
            _ => OracleError::Network(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, OracleError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TradingPair;
    use std::error::Error as _;

    #[test]
    fn test_price_fetch_is_not_wrapped_twice() {
        let err = OracleError::Price("all sources failed".to_string())
            .into_price_fetch(TradingPair::SolUsd)
            .into_price_fetch(TradingPair::SolUsd);

        assert_eq!(err.code(), ErrorCode::PriceFetch);
        assert_eq!(err.root_cause().code(), ErrorCode::Price);
        assert!(matches!(err.source(), Some(_)));
    }

    #[test]
    fn test_price_fetch_details_carry_cause() {
        let err = OracleError::validation("Price cannot be NaN").into_price_fetch(TradingPair::BtcUsd);
        let details = err.details().unwrap();

        assert_eq!(details["pair"], "BTC/USD");
        assert_eq!(details["cause"]["code"], "VALIDATION_ERROR");
        assert_eq!(details["cause"]["message"], "Price cannot be NaN");
        assert_eq!(err.to_string(), "Failed to fetch price for BTC/USD");
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(OracleError::Network("refused".into()).is_retryable());
        assert!(OracleError::Timeout("slow".into()).is_retryable());
        assert!(OracleError::Price("empty".into()).is_retryable());
        assert!(!OracleError::validation("bad").is_retryable());
        assert!(!OracleError::Proof("bad".into()).is_retryable());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorCode::Network.to_string(), "NETWORK_ERROR");
        assert_eq!(ErrorCode::Timeout.as_str(), "TIMEOUT_ERROR");
        assert_eq!(
            serde_json::to_value(ErrorCode::PriceFetch).unwrap(),
            serde_json::json!("PRICE_FETCH_ERROR")
        );
    }
}

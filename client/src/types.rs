//! Core data types shared across the client
//!
//! - `TradingPair`: the supported markets, serialized as `"SOL/USD"` etc.
//! - `PriceData`: a quote as returned to callers
//! - `PriceUpdate`: what subscribers receive on each tick
//! - `ValidationResult`: outcome of a non-raising validator check

use crate::error::OracleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trading pairs supported by the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TradingPair {
    #[serde(rename = "SOL/USD")]
    SolUsd,
    #[serde(rename = "BTC/USD")]
    BtcUsd,
    #[serde(rename = "ETH/USD")]
    EthUsd,
}

impl TradingPair {
    pub const ALL: [TradingPair; 3] = [TradingPair::SolUsd, TradingPair::BtcUsd, TradingPair::EthUsd];

    pub fn as_str(&self) -> &'static str {
        match self {
            TradingPair::SolUsd => "SOL/USD",
            TradingPair::BtcUsd => "BTC/USD",
            TradingPair::EthUsd => "ETH/USD",
        }
    }

    pub fn supported_symbols() -> Vec<&'static str> {
        Self::ALL.iter().map(TradingPair::as_str).collect()
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradingPair {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::validation::validate_trading_pair(s)
    }
}

/// A price quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceData {
    /// Price value, finite and non-negative
    pub price: f64,

    /// Unix timestamp in milliseconds
    pub timestamp: i64,

    /// Confidence score in [0, 1]
    pub confidence: f64,

    /// Attestation bytes, present only on a freshly fetched quote
    pub proof: Option<Vec<u8>>,
}

/// Streaming notification delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub pair: TradingPair,
    pub price: f64,
    /// Unix timestamp in milliseconds when the update was built
    pub timestamp: i64,
}

/// Outcome of a non-throwing validator check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(error.into()),
        }
    }

    /// Convert into a `Validation` error when the check failed
    pub fn into_result(self) -> crate::error::Result<()> {
        if self.is_valid {
            return Ok(());
        }
        Err(OracleError::validation(
            self.error.unwrap_or_else(|| "Validation failed".to_string()),
        ))
    }
}

/// Current unix time in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

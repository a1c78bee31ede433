//! Auryx price oracle client
//!
//! Cached, validated trading-pair quotes with optional proofs, an RPC
//! connection health monitor, and polling subscriptions that fan each price
//! update out to every registered callback.

pub mod adjusted;
pub mod cache;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod oracle;
pub mod price_aggregator;
pub mod proof;
pub mod transport;
pub mod types;
pub mod validation;

#[cfg(test)]
mod testing;

pub use adjusted::{AdjustedPriceFeed, PriceFeed};
pub use client::{OracleClient, OracleClientBuilder, Subscription};
pub use config::{LogLevel, OracleConfig};
pub use connection::{BackoffPolicy, ConnectionManager};
pub use error::{ErrorCode, OracleError, Result};
pub use oracle::Oracle;
pub use price_aggregator::{MockPriceSource, PriceAggregator, PriceSource};
pub use proof::{MockProofGenerator, ProofGenerator};
pub use transport::{RpcTransport, SolanaTransport};
pub use types::{PriceData, PriceUpdate, TradingPair, ValidationResult};

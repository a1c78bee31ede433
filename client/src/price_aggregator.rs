//! Price Aggregator
//!
//! Combines quotes from one or more weighted price sources into a single
//! price for a trading pair.
//!
//! # Architecture
//! ```text
//! Source A (w=2) → $50.10
//!         ↓
//! Source B (w=1) → $49.90  →  [Aggregator]  →  (2×50.10 + 1×49.90) / 3
//!         ↓
//! (failed source)          →  logged, skipped
//! ```
//!
//! The aggregator does not judge the quotes themselves; the oracle
//! validates the combined price before it is cached.

use crate::{
    error::{OracleError, Result},
    types::TradingPair,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Default relative spread of the mock source (±0.5%)
pub const DEFAULT_MOCK_JITTER: f64 = 0.01;

/// A single weighted price feed
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;

    /// Relative weight in the aggregate, positive and finite
    fn weight(&self) -> f64;

    async fn get_price(&self, pair: TradingPair) -> Result<f64>;
}

/// Development source: fixed base prices with random jitter
#[derive(Debug, Clone)]
pub struct MockPriceSource {
    name: String,
    weight: f64,
    jitter: f64,
}

impl MockPriceSource {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
            jitter: DEFAULT_MOCK_JITTER,
        }
    }

    /// Set the relative spread of the jitter (0 disables it)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn base_price(pair: TradingPair) -> f64 {
        match pair {
            TradingPair::SolUsd => 50.0,
            TradingPair::BtcUsd => 35_000.0,
            TradingPair::EthUsd => 2_000.0,
        }
    }
}

#[async_trait]
impl PriceSource for MockPriceSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    async fn get_price(&self, pair: TradingPair) -> Result<f64> {
        let base = Self::base_price(pair);
        let variation = (rand::random::<f64>() - 0.5) * self.jitter * base;
        Ok(base + variation)
    }
}

/// Weighted combination of price sources
#[derive(Clone, Default)]
pub struct PriceAggregator {
    sources: Vec<Arc<dyn PriceSource>>,
}

impl PriceAggregator {
    /// An aggregator with no sources
    pub fn new() -> Self {
        Self::default()
    }

    /// The development setup: a single jittered mock source
    pub fn mock() -> Self {
        Self {
            sources: vec![Arc::new(MockPriceSource::new("mock", 1.0))],
        }
    }

    /// Register a source. Fails if its weight is not positive and finite.
    pub fn add_source(&mut self, source: Arc<dyn PriceSource>) -> Result<()> {
        let weight = source.weight();
        if !weight.is_finite() || weight <= 0.0 {
            return Err(OracleError::validation(format!(
                "Source {} has invalid weight {}",
                source.name(),
                weight
            )));
        }

        debug!("Registered price source {} (weight {})", source.name(), weight);
        self.sources.push(source);
        Ok(())
    }

    pub fn with_source(mut self, source: Arc<dyn PriceSource>) -> Result<Self> {
        self.add_source(source)?;
        Ok(self)
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Weighted price across every source that answered.
    ///
    /// # Errors
    /// * `Price` - no sources registered, or every source failed
    pub async fn aggregate(&self, pair: TradingPair) -> Result<f64> {
        debug!(%pair, sources = self.sources.len(), "Aggregating price");

        let mut quotes = Vec::with_capacity(self.sources.len());
        let mut errors = Vec::new();

        for source in &self.sources {
            match source.get_price(pair).await {
                Ok(price) => {
                    debug!("{} price for {}: {}", source.name(), pair, price);
                    quotes.push((price, source.weight()));
                }
                Err(e) => {
                    warn!("{} error for {}: {}", source.name(), pair, e);
                    errors.push(format!("{}: {}", source.name(), e));
                }
            }
        }

        if quotes.is_empty() {
            error!(%pair, "No source prices available");
            return Err(OracleError::Price(if errors.is_empty() {
                format!("No price sources registered for {}", pair)
            } else {
                format!("All sources failed for {}: [{}]", pair, errors.join(", "))
            }));
        }

        Ok(Self::weighted_mean(&quotes))
    }

    fn weighted_mean(quotes: &[(f64, f64)]) -> f64 {
        let total_weight: f64 = quotes.iter().map(|(_, weight)| weight).sum();
        quotes.iter().map(|(price, weight)| price * weight).sum::<f64>() / total_weight
    }
}

//! Per-pair price multipliers layered over another feed

use crate::{
    client::OracleClient,
    error::{OracleError, Result},
    types::{PriceData, TradingPair},
    validation::validate_price,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Anything that can produce a quote for a pair
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn get_price(&self, pair: TradingPair) -> Result<PriceData>;
}

#[async_trait]
impl PriceFeed for OracleClient {
    async fn get_price(&self, pair: TradingPair) -> Result<PriceData> {
        OracleClient::get_price(self, pair).await
    }
}

/// Wraps a feed and scales each pair's price by a configured factor.
/// Pairs without a factor pass through unchanged.
pub struct AdjustedPriceFeed<F> {
    base: F,
    adjustments: RwLock<HashMap<TradingPair, f64>>,
}

impl<F: PriceFeed> AdjustedPriceFeed<F> {
    pub fn new(base: F) -> Self {
        Self {
            base,
            adjustments: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_adjustment(self, pair: TradingPair, factor: f64) -> Result<Self> {
        self.set_adjustment(pair, factor)?;
        Ok(self)
    }

    /// Replace the factor for `pair`. It must be positive and finite.
    pub fn set_adjustment(&self, pair: TradingPair, factor: f64) -> Result<()> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(OracleError::validation_with(
                "Adjustment factor must be positive and finite",
                serde_json::json!({ "pair": pair, "factor": factor.to_string() }),
            ));
        }
        self.adjustments.write().insert(pair, factor);
        debug!(%pair, factor, "Updated price adjustment");
        Ok(())
    }

    pub fn adjustment(&self, pair: TradingPair) -> f64 {
        self.adjustments.read().get(&pair).copied().unwrap_or(1.0)
    }

    pub fn base(&self) -> &F {
        &self.base
    }
}

#[async_trait]
impl<F: PriceFeed> PriceFeed for AdjustedPriceFeed<F> {
    async fn get_price(&self, pair: TradingPair) -> Result<PriceData> {
        let mut quote = self.base.get_price(pair).await?;
        quote.price *= self.adjustment(pair);
        validate_price(quote.price).map_err(|e| e.into_price_fetch(pair))?;
        Ok(quote)
    }
}

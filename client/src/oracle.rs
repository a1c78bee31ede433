//! Oracle
//!
//! Produces validated price quotes for a trading pair.
//!
//! # Fetch Path
//! ```text
//! fetch_price(pair)
//!   → cache fresh?  → quote { confidence, proof: None }
//!   → otherwise     → aggregate (retry with backoff, timeout) → validate price
//!                   → generate proof (timeout) → verify? (timeout)
//!                   → validate quote → cache → quote { proof }
//! ```
//!
//! Proofs are produced once per fresh observation; cache hits never pay
//! for them. A price only reaches the cache once its proof and the quote
//! checks have passed.

use crate::{
    cache::{CacheLookup, CacheStats, CachedPrice, PriceCache},
    config::OracleConfig,
    connection::ConnectionManager,
    error::{OracleError, Result},
    price_aggregator::PriceAggregator,
    proof::ProofGenerator,
    types::{PriceData, TradingPair},
    validation::{validate_price, validate_quote_within, validate_trading_pair},
};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Confidence attached to every quote
// TODO: derive from source agreement once the aggregator reports spread
pub const DEFAULT_CONFIDENCE: f64 = 0.99;

/// Delay before the first aggregation retry
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Cap on the exponential part of a retry delay
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

/// Backoff before aggregation retry number `attempt` (1-based):
/// `RETRY_BASE_DELAY × 2^(attempt-1)`, capped, plus up to 20% jitter.
pub fn retry_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let base = RETRY_BASE_DELAY
        .saturating_mul(1u32 << exponent)
        .min(RETRY_MAX_DELAY);

    let jitter_cap_ms = (base.as_millis() as u64) / 5;
    let jitter_ms = if jitter_cap_ms > 0 {
        rand::thread_rng().gen_range(0..=jitter_cap_ms)
    } else {
        0
    };
    base + Duration::from_millis(jitter_ms)
}

/// Cache-backed quote producer
///
/// Combines the price cache, the source aggregator and the proof generator.
/// The connection manager is consulted for logging only; quotes come from
/// the price sources whether or not the RPC endpoint is reachable.
pub struct Oracle {
    cache: PriceCache,
    aggregator: PriceAggregator,
    proofs: Arc<dyn ProofGenerator>,
    connection: Arc<ConnectionManager>,
    timeout: Duration,
    max_retries: u32,
    validate_proofs: bool,

    /// Oldest accepted quote age (ms), the configured cache duration
    max_quote_age_ms: i64,
}

impl Oracle {
    /// Create an oracle over the given collaborators
    ///
    /// # Arguments
    /// * `config` - Cache duration, timeout, retry and proof settings
    /// * `connection` - Shared connection health monitor
    /// * `aggregator` - Price sources to combine
    /// * `proofs` - Proof generator for fresh quotes
    pub fn new(
        config: &OracleConfig,
        connection: Arc<ConnectionManager>,
        aggregator: PriceAggregator,
        proofs: Arc<dyn ProofGenerator>,
    ) -> Self {
        Self {
            cache: PriceCache::new(config.cache_duration()),
            aggregator,
            proofs,
            connection,
            timeout: config.timeout(),
            max_retries: config.max_retries,
            validate_proofs: config.validate_proofs,
            max_quote_age_ms: i64::try_from(config.cache_duration_ms).unwrap_or(i64::MAX),
        }
    }

    /// Validate a raw symbol, then fetch it.
    ///
    /// An unsupported symbol fails with a `Validation` error before the
    /// cache or any source is touched.
    ///
    /// # Example
    /// ```rust,ignore
    /// let quote = oracle.fetch_symbol("SOL/USD").await?;
    /// ```
    pub async fn fetch_symbol(&self, symbol: &str) -> Result<PriceData> {
        let pair = validate_trading_pair(symbol)?;
        self.fetch_price(pair).await
    }

    /// Quote for `pair`, from cache when fresh.
    ///
    /// # How it works:
    /// 1. Fresh cache entry: return it with `proof: None`
    /// 2. Otherwise aggregate, validate, prove and verify under the pair's
    ///    fetch gate, then cache the price
    ///
    /// # Returns
    /// - Cached quote: `proof` is `None`
    /// - Fresh quote: `proof` is `Some`
    ///
    /// # Errors
    /// * `PriceFetch` - aggregation, validation or proof failed; the cause
    ///   is kept as the error source and nothing is cached
    pub async fn fetch_price(&self, pair: TradingPair) -> Result<PriceData> {
        let lookup = self
            .cache
            .get_price_with_cache(pair, || self.fetch_fresh_quote(pair))
            .await
            .map_err(|e| e.into_price_fetch(pair))?;

        match lookup {
            CacheLookup::Hit(cached) => {
                debug!(%pair, "Serving price from cache");
                Ok(PriceData {
                    price: cached.price,
                    timestamp: cached.timestamp,
                    confidence: DEFAULT_CONFIDENCE,
                    proof: None,
                })
            }
            CacheLookup::Fetched(_, quote) => Ok(quote),
        }
    }

    async fn fetch_fresh_quote(&self, pair: TradingPair) -> Result<(CachedPrice, PriceData)> {
        if !self.connection.is_connected() {
            debug!(%pair, "Fetching while the RPC connection is down");
        }

        let price = self.aggregate_with_retry(pair).await?;
        validate_price(price)?;

        let entry = CachedPrice::now(price);
        let proof = self.generate_proof(pair, entry).await?;

        let quote = PriceData {
            price,
            timestamp: entry.timestamp,
            confidence: DEFAULT_CONFIDENCE,
            proof: Some(proof),
        };
        validate_quote_within(&quote, self.max_quote_age_ms)?;
        Ok((entry, quote))
    }

    async fn aggregate_with_retry(&self, pair: TradingPair) -> Result<f64> {
        let mut attempt = 0;
        loop {
            let outcome = self
                .bounded("price aggregation", pair, self.aggregator.aggregate(pair))
                .await;

            match outcome {
                Ok(price) => return Ok(price),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = retry_delay(attempt);
                    warn!(
                        %pair,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying price aggregation"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn generate_proof(&self, pair: TradingPair, entry: CachedPrice) -> Result<Vec<u8>> {
        let proof = self
            .bounded(
                "proof generation",
                pair,
                self.proofs.generate(pair, entry.price, entry.timestamp),
            )
            .await?;

        if self.validate_proofs {
            let verified = self
                .bounded(
                    "proof verification",
                    pair,
                    self.proofs.verify(pair, entry.price, entry.timestamp, &proof),
                )
                .await?;
            if !verified {
                return Err(OracleError::Proof(format!(
                    "Proof for {} failed verification",
                    pair
                )));
            }
        }

        Ok(proof)
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        pair: TradingPair,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| {
                OracleError::Timeout(format!(
                    "{} for {} exceeded {:?}",
                    operation, pair, self.timeout
                ))
            })?
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached price. Idempotent.
    pub fn cleanup(&self) {
        self.cache.clear_all();
    }
}

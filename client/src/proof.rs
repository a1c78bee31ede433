//! Price Proofs
//!
//! Attestations bound to a `(pair, price, timestamp)` observation. The
//! oracle asks for one on every fresh fetch and, when `validateProofs` is
//! set, checks it before the price is cached.

use crate::{error::Result, types::TradingPair};
use async_trait::async_trait;

/// Produces and checks attestations for freshly observed prices
#[async_trait]
pub trait ProofGenerator: Send + Sync {
    async fn generate(&self, pair: TradingPair, price: f64, timestamp: i64) -> Result<Vec<u8>>;

    async fn verify(
        &self,
        pair: TradingPair,
        price: f64,
        timestamp: i64,
        proof: &[u8],
    ) -> Result<bool>;
}

/// Development attestation: `"{pair}:{price}:{timestamp}"` as bytes.
/// Carries no cryptographic guarantee.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockProofGenerator;

impl MockProofGenerator {
    fn attestation(pair: TradingPair, price: f64, timestamp: i64) -> Vec<u8> {
        format!("{}:{}:{}", pair, price, timestamp).into_bytes()
    }
}

#[async_trait]
impl ProofGenerator for MockProofGenerator {
    async fn generate(&self, pair: TradingPair, price: f64, timestamp: i64) -> Result<Vec<u8>> {
        Ok(Self::attestation(pair, price, timestamp))
    }

    async fn verify(
        &self,
        pair: TradingPair,
        price: f64,
        timestamp: i64,
        proof: &[u8],
    ) -> Result<bool> {
        Ok(Self::attestation(pair, price, timestamp) == proof)
    }
}

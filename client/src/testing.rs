//! Scripted collaborators for unit tests

use crate::{
    config::{LogLevel, OracleConfig},
    error::{OracleError, Result},
    price_aggregator::PriceSource,
    proof::{MockProofGenerator, ProofGenerator},
    transport::RpcTransport,
    types::TradingPair,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

static NEXT_TRANSPORT: AtomicUsize = AtomicUsize::new(0);

/// Transport whose probe outcomes are queued up front
pub struct ScriptedTransport {
    name: String,
    outcomes: Mutex<VecDeque<bool>>,
    fallback: bool,
    probes: AtomicUsize,
}

impl ScriptedTransport {
    fn build(outcomes: VecDeque<bool>, fallback: bool) -> Arc<Self> {
        let id = NEXT_TRANSPORT.fetch_add(1, Ordering::Relaxed);
        Arc::new(Self {
            name: format!("scripted://{}", id),
            outcomes: Mutex::new(outcomes),
            fallback,
            probes: AtomicUsize::new(0),
        })
    }

    pub fn healthy() -> Arc<Self> {
        Self::build(VecDeque::new(), true)
    }

    pub fn unreachable() -> Arc<Self> {
        Self::build(VecDeque::new(), false)
    }

    /// Play `outcomes` in order, then keep succeeding
    pub fn with_outcomes(outcomes: impl IntoIterator<Item = bool>) -> Arc<Self> {
        Self::build(outcomes.into_iter().collect(), true)
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    fn endpoint(&self) -> String {
        self.name.clone()
    }

    async fn probe(&self) -> Result<u64> {
        let call = self.probes.fetch_add(1, Ordering::SeqCst);
        let ok = self.outcomes.lock().pop_front().unwrap_or(self.fallback);
        if ok {
            Ok(250_000_000 + call as u64)
        } else {
            Err(OracleError::Network("connection refused".to_string()))
        }
    }
}

/// Price source with a fixed quote, optional failures and optional latency
pub struct StubSource {
    price: f64,
    weight: f64,
    failures_left: AtomicUsize,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl StubSource {
    pub fn fixed(price: f64) -> Arc<Self> {
        Self::flaky(price, 0)
    }

    /// Fail the first `failures` calls, then return `price`
    pub fn flaky(price: f64, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            price,
            weight: 1.0,
            failures_left: AtomicUsize::new(failures),
            latency: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Self::flaky(0.0, usize::MAX)
    }

    pub fn slow(price: f64, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            price,
            weight: 1.0,
            failures_left: AtomicUsize::new(0),
            latency: Some(latency),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn weighted(price: f64, weight: f64) -> Arc<Self> {
        Arc::new(Self {
            price,
            weight,
            failures_left: AtomicUsize::new(0),
            latency: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for StubSource {
    fn name(&self) -> &str {
        "stub"
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    async fn get_price(&self, pair: TradingPair) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(OracleError::Network(format!("stub source unavailable for {}", pair)));
        }

        Ok(self.price)
    }
}

/// Proof generator whose output never verifies
pub struct RejectingProofGenerator;

#[async_trait]
impl ProofGenerator for RejectingProofGenerator {
    async fn generate(&self, _pair: TradingPair, _price: f64, _timestamp: i64) -> Result<Vec<u8>> {
        Ok(b"forged".to_vec())
    }

    async fn verify(
        &self,
        _pair: TradingPair,
        _price: f64,
        _timestamp: i64,
        _proof: &[u8],
    ) -> Result<bool> {
        Ok(false)
    }
}

/// Mock proofs that take their time to produce or to check
pub struct SlowProofGenerator {
    generate_latency: Duration,
    verify_latency: Duration,
}

impl SlowProofGenerator {
    pub fn slow_generate(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            generate_latency: latency,
            verify_latency: Duration::ZERO,
        })
    }

    pub fn slow_verify(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            generate_latency: Duration::ZERO,
            verify_latency: latency,
        })
    }
}

#[async_trait]
impl ProofGenerator for SlowProofGenerator {
    async fn generate(&self, pair: TradingPair, price: f64, timestamp: i64) -> Result<Vec<u8>> {
        tokio::time::sleep(self.generate_latency).await;
        MockProofGenerator.generate(pair, price, timestamp).await
    }

    async fn verify(
        &self,
        pair: TradingPair,
        price: f64,
        timestamp: i64,
        proof: &[u8],
    ) -> Result<bool> {
        tokio::time::sleep(self.verify_latency).await;
        MockProofGenerator.verify(pair, price, timestamp, proof).await
    }
}

/// Configuration with short timings for tests
pub fn test_config() -> OracleConfig {
    OracleConfig {
        rpc_endpoint: "http://localhost:8899".to_string(),
        cache_duration_ms: 60_000,
        max_retries: 0,
        timeout_ms: 1_000,
        log_level: LogLevel::Debug,
        update_interval_ms: 10,
        ..OracleConfig::default()
    }
}

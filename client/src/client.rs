//! Public client
//!
//! Wraps the oracle and the connection manager, and fans price updates out
//! to subscribers.
//!
//! # Subscription Lifecycle (per pair)
//! ```text
//! Idle ──first subscribe──▶ Polling ──last unsubscribe──▶ Idle
//! ```
//! A pair has a polling task exactly when it has at least one subscriber.
//! Each tick fetches a quote and delivers one `PriceUpdate` to every
//! callback still registered at delivery time. Tick failures are logged and
//! the task keeps running.

use crate::{
    config::OracleConfig,
    connection::{BackoffPolicy, ConnectionManager},
    error::Result,
    oracle::Oracle,
    price_aggregator::PriceAggregator,
    proof::{MockProofGenerator, ProofGenerator},
    transport::{RpcTransport, SolanaTransport},
    types::{now_millis, PriceData, PriceUpdate, TradingPair},
    validation::validate_trading_pair,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Subscriber callback
pub type PriceCallback = Arc<dyn Fn(&PriceUpdate) + Send + Sync>;

struct Subscriber {
    id: u64,
    callback: PriceCallback,
}

struct PollingTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Per-pair polling tasks, keyed by the pair they serve
#[derive(Default)]
struct PollingTasks {
    tasks: HashMap<TradingPair, PollingTask>,
}

impl PollingTasks {
    fn set(&mut self, pair: TradingPair, task: PollingTask) {
        if let Some(previous) = self.tasks.insert(pair, task) {
            Self::stop(pair, previous);
        }
    }

    fn is_active(&self, pair: TradingPair) -> bool {
        self.tasks.contains_key(&pair)
    }

    fn clear(&mut self, pair: TradingPair) -> bool {
        match self.tasks.remove(&pair) {
            Some(task) => {
                Self::stop(pair, task);
                true
            }
            None => false,
        }
    }

    fn clear_all(&mut self) {
        let pairs: Vec<TradingPair> = self.tasks.keys().copied().collect();
        for pair in pairs {
            self.clear(pair);
        }
    }

    /// Signal the task to exit. A fetch already in flight is left to
    /// complete so its result still reaches the cache.
    fn stop(pair: TradingPair, task: PollingTask) {
        let _ = task.shutdown.send(());
        drop(task.handle);
        debug!(%pair, "Stopped price updates");
    }
}

#[derive(Default)]
struct Registry {
    subscribers: HashMap<TradingPair, Vec<Subscriber>>,
    polling: PollingTasks,
}

struct ClientInner {
    config: OracleConfig,
    oracle: Oracle,
    connection: Arc<ConnectionManager>,
    registry: Mutex<Registry>,
    next_subscription_id: AtomicU64,
}

/// Price oracle client
///
/// Cheap to clone; clones share the cache, subscriptions and connection.
#[derive(Clone)]
pub struct OracleClient {
    inner: Arc<ClientInner>,
}

impl OracleClient {
    /// Client against the configured Solana RPC endpoint with the
    /// development price source and proof generator.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// * `Config` - the configuration fails `OracleConfig::validate`, or the
    ///   commitment level is unknown
    ///
    /// # Example
    /// ```rust,ignore
    /// let client = OracleClient::new(OracleConfig::default())?;
    /// let quote = client.get_price(TradingPair::SolUsd).await?;
    /// ```
    pub fn new(config: OracleConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: OracleConfig) -> OracleClientBuilder {
        OracleClientBuilder::new(config)
    }

    pub fn config(&self) -> &OracleConfig {
        &self.inner.config
    }

    pub fn oracle(&self) -> &Oracle {
        &self.inner.oracle
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.inner.connection
    }

    /// Current quote for `pair`
    ///
    /// # Returns
    /// - A cached quote (`proof: None`) while the last fetch is fresh
    /// - Otherwise a freshly aggregated quote carrying its proof
    ///
    /// # Errors
    /// * `PriceFetch` - the quote could not be produced; see `root_cause()`
    pub async fn get_price(&self, pair: TradingPair) -> Result<PriceData> {
        self.inner.get_price(pair).await
    }

    /// Validate a raw symbol such as `"SOL/USD"`, then fetch it
    pub async fn get_price_for_symbol(&self, symbol: &str) -> Result<PriceData> {
        match validate_trading_pair(symbol) {
            Ok(pair) => self.get_price(pair).await,
            Err(e) => {
                error!(symbol, error = %e, "Rejected price request");
                Err(e.into_price_fetch(symbol))
            }
        }
    }

    /// Register `callback` for updates on `pair`.
    ///
    /// The first subscriber of a pair starts its polling task. Must be
    /// called from within a Tokio runtime.
    ///
    /// # Arguments
    /// * `pair` - Pair to follow
    /// * `callback` - Called once per successful tick, outside any lock
    ///
    /// # Example
    /// ```rust,ignore
    /// let subscription = client.subscribe(TradingPair::BtcUsd, |update| {
    ///     println!("{} → ${}", update.pair, update.price);
    /// });
    /// // ...
    /// subscription.unsubscribe();
    /// ```
    pub fn subscribe<F>(&self, pair: TradingPair, callback: F) -> Subscription
    where
        F: Fn(&PriceUpdate) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscription_id.fetch_add(1, Ordering::Relaxed);

        let mut registry = self.inner.registry.lock();
        let subscribers = registry.subscribers.entry(pair).or_default();
        subscribers.push(Subscriber {
            id,
            callback: Arc::new(callback),
        });
        let count = subscribers.len();
        debug!(%pair, subscribers = count, "New subscription added");

        if count == 1 {
            let task = spawn_polling(
                Arc::downgrade(&self.inner),
                pair,
                self.inner.config.update_interval(),
            );
            registry.polling.set(pair, task);
            debug!(%pair, "Started price updates");
        }

        Subscription {
            pair,
            id,
            client: Arc::downgrade(&self.inner),
            active: AtomicBool::new(true),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    /// Whether `pair` currently has a polling task
    pub fn is_polling(&self, pair: TradingPair) -> bool {
        self.inner.registry.lock().polling.is_active(pair)
    }

    pub fn subscriber_count(&self, pair: TradingPair) -> usize {
        self.inner
            .registry
            .lock()
            .subscribers
            .get(&pair)
            .map_or(0, Vec::len)
    }

    /// Stop every polling task, drop all subscriptions, clear the cache and
    /// reset the connection. Idempotent.
    pub fn cleanup(&self) {
        info!("Cleaning up Auryx client...");
        {
            let mut registry = self.inner.registry.lock();
            registry.polling.clear_all();
            registry.subscribers.clear();
        }
        self.inner.oracle.cleanup();
        self.inner.connection.cleanup();
    }
}

impl ClientInner {
    async fn get_price(&self, pair: TradingPair) -> Result<PriceData> {
        debug!(%pair, "Fetching price");
        self.oracle.fetch_price(pair).await.map_err(|e| {
            let err = e.into_price_fetch(pair);
            error!(%pair, error = %err, cause = %err.root_cause(), "Failed to fetch price");
            err
        })
    }

    fn unsubscribe(&self, pair: TradingPair, id: u64) -> bool {
        let mut registry = self.registry.lock();

        let Some(subscribers) = registry.subscribers.get_mut(&pair) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        if subscribers.len() == before {
            return false;
        }

        debug!(%pair, subscribers = subscribers.len(), "Unsubscribed");
        if subscribers.is_empty() {
            registry.subscribers.remove(&pair);
            registry.polling.clear(pair);
        }
        true
    }

    /// Deliver `update` to every callback registered for its pair.
    ///
    /// Registration is re-checked right before each callback runs, and no
    /// lock is held while a callback executes.
    fn broadcast(&self, update: &PriceUpdate) -> usize {
        let ids: Vec<u64> = self
            .registry
            .lock()
            .subscribers
            .get(&update.pair)
            .map(|subs| subs.iter().map(|s| s.id).collect())
            .unwrap_or_default();

        let mut delivered = 0;
        for id in ids {
            let callback = self
                .registry
                .lock()
                .subscribers
                .get(&update.pair)
                .and_then(|subs| subs.iter().find(|s| s.id == id))
                .map(|s| Arc::clone(&s.callback));

            let Some(callback) = callback else { continue };
            match catch_unwind(AssertUnwindSafe(|| callback(update))) {
                Ok(()) => delivered += 1,
                Err(_) => error!(pair = %update.pair, subscription = id, "Subscriber callback panicked"),
            }
        }
        delivered
    }
}

fn spawn_polling(client: Weak<ClientInner>, pair: TradingPair, interval: Duration) -> PollingTask {
    let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick fires immediately; updates start one interval in
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {}
            }

            let Some(client) = client.upgrade() else { break };

            let quote = match client.get_price(pair).await {
                Ok(quote) => quote,
                Err(e) => {
                    error!(%pair, error = %e, "Error updating price");
                    continue;
                }
            };

            // Stopped while the fetch was in flight: the quote is cached,
            // but nobody is told about it
            if !matches!(shutdown_rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)) {
                break;
            }

            let update = PriceUpdate {
                pair,
                price: quote.price,
                timestamp: now_millis(),
            };
            let delivered = client.broadcast(&update);
            debug!(%pair, price = update.price, delivered, "Broadcast price update");
        }

        debug!(%pair, "Price update task exiting");
    });

    PollingTask { shutdown, handle }
}

/// Handle returned by [`OracleClient::subscribe`]
///
/// Dropping the handle keeps the subscription alive; call
/// [`Subscription::unsubscribe`] to end it.
pub struct Subscription {
    pair: TradingPair,
    id: u64,
    client: Weak<ClientInner>,
    active: AtomicBool,
}

impl Subscription {
    pub fn pair(&self) -> TradingPair {
        self.pair
    }

    /// Remove this callback. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        debug!(pair = %self.pair, "Unsubscribing");
        if let Some(client) = self.client.upgrade() {
            client.unsubscribe(self.pair, self.id);
        }
    }
}

/// Assembles an [`OracleClient`] from its collaborators
pub struct OracleClientBuilder {
    config: OracleConfig,
    transport: Option<Arc<dyn RpcTransport>>,
    aggregator: Option<PriceAggregator>,
    proofs: Option<Arc<dyn ProofGenerator>>,
    backoff: BackoffPolicy,
}

impl OracleClientBuilder {
    pub fn new(config: OracleConfig) -> Self {
        Self {
            config,
            transport: None,
            aggregator: None,
            proofs: None,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn transport(mut self, transport: Arc<dyn RpcTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn aggregator(mut self, aggregator: PriceAggregator) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn proof_generator(mut self, proofs: Arc<dyn ProofGenerator>) -> Self {
        self.proofs = Some(proofs);
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn build(self) -> Result<OracleClient> {
        self.config.validate()?;
        info!("Initializing Auryx client...");

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(SolanaTransport::from_config(&self.config)?),
        };
        let connection = Arc::new(ConnectionManager::new(transport, self.backoff));
        let oracle = Oracle::new(
            &self.config,
            Arc::clone(&connection),
            self.aggregator.unwrap_or_else(PriceAggregator::mock),
            self.proofs.unwrap_or_else(|| Arc::new(MockProofGenerator)),
        );

        Ok(OracleClient {
            inner: Arc::new(ClientInner {
                config: self.config,
                oracle,
                connection,
                registry: Mutex::new(Registry::default()),
                next_subscription_id: AtomicU64::new(0),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::testing::{test_config, ScriptedTransport, StubSource};

    fn client_with(source: Arc<StubSource>) -> OracleClient {
        OracleClient::builder(test_config())
            .transport(ScriptedTransport::healthy())
            .aggregator(PriceAggregator::new().with_source(source).unwrap())
            .build()
            .unwrap()
    }

    fn recorder() -> (
        Arc<Mutex<Vec<PriceUpdate>>>,
        impl Fn(&PriceUpdate) + Clone + Send + Sync + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |update: &PriceUpdate| sink.lock().push(update.clone()))
    }

    #[tokio::test]
    async fn test_get_price_for_valid_pair() {
        let client = client_with(StubSource::fixed(50.0));

        let quote = client.get_price(TradingPair::SolUsd).await.unwrap();

        assert_eq!(quote.price, 50.0);
        assert!(quote.timestamp > 0);
    }

    #[tokio::test]
    async fn test_get_price_for_invalid_symbol() {
        let source = StubSource::fixed(50.0);
        let client = client_with(source.clone());

        let err = client.get_price_for_symbol("INVALID/PAIR").await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::PriceFetch);
        assert_eq!(err.root_cause().code(), ErrorCode::Validation);
        assert!(err.details().unwrap()["cause"]["details"]["supported"].is_array());
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_get_price_failure_is_price_fetch_error() {
        let client = client_with(StubSource::failing());

        let err = client.get_price(TradingPair::EthUsd).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::PriceFetch);
        assert_eq!(err.root_cause().code(), ErrorCode::Price);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_tick_reaches_every_subscriber_once() {
        let client = client_with(StubSource::fixed(35_000.0));

        let recorders: Vec<_> = (0..3).map(|_| recorder()).collect();
        let subscriptions: Vec<_> = recorders
            .iter()
            .map(|(_, callback)| client.subscribe(TradingPair::BtcUsd, callback.clone()))
            .collect();

        // One 10ms interval elapses
        tokio::time::sleep(Duration::from_millis(15)).await;

        let first = recorders[0].0.lock().clone();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].pair, TradingPair::BtcUsd);
        assert_eq!(first[0].price, 35_000.0);
        for (seen, _) in &recorders {
            assert_eq!(*seen.lock(), first);
        }

        for subscription in &subscriptions {
            subscription.unsubscribe();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_follows_subscriber_count() {
        let client = client_with(StubSource::fixed(35_000.0));
        assert!(!client.is_polling(TradingPair::BtcUsd));

        let first = client.subscribe(TradingPair::BtcUsd, |_| {});
        let second = client.subscribe(TradingPair::BtcUsd, |_| {});
        assert!(client.is_polling(TradingPair::BtcUsd));
        assert_eq!(client.subscriber_count(TradingPair::BtcUsd), 2);

        first.unsubscribe();
        assert!(client.is_polling(TradingPair::BtcUsd));
        assert_eq!(client.subscriber_count(TradingPair::BtcUsd), 1);

        second.unsubscribe();
        assert!(!client.is_polling(TradingPair::BtcUsd));
        assert_eq!(client.subscriber_count(TradingPair::BtcUsd), 0);

        // Resubscribing starts a fresh task
        let third = client.subscribe(TradingPair::BtcUsd, |_| {});
        assert!(client.is_polling(TradingPair::BtcUsd));
        third.unsubscribe();
        assert!(!client.is_polling(TradingPair::BtcUsd));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_is_idempotent() {
        let client = client_with(StubSource::fixed(50.0));
        let (_, callback) = recorder();

        let keep = client.subscribe(TradingPair::SolUsd, |_| {});
        let subscription = client.subscribe(TradingPair::SolUsd, callback);

        subscription.unsubscribe();
        subscription.unsubscribe();

        assert_eq!(client.subscriber_count(TradingPair::SolUsd), 1);
        assert!(client.is_polling(TradingPair::SolUsd));

        keep.unsubscribe();
        keep.unsubscribe();
        assert!(!client.is_polling(TradingPair::SolUsd));
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_callback_is_not_invoked() {
        let client = client_with(StubSource::fixed(50.0));
        let (kept_seen, kept) = recorder();
        let (removed_seen, removed) = recorder();

        let keep = client.subscribe(TradingPair::SolUsd, kept);
        let gone = client.subscribe(TradingPair::SolUsd, removed);
        gone.unsubscribe();

        tokio::time::sleep(Duration::from_millis(35)).await;

        assert_eq!(kept_seen.lock().len(), 3);
        assert!(removed_seen.lock().is_empty());
        keep.unsubscribe();
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_failures_do_not_stop_polling() {
        // The first tick's fetch fails, later ticks succeed
        let client = client_with(StubSource::flaky(2_000.0, 1));
        let (seen, callback) = recorder();

        let subscription = client.subscribe(TradingPair::EthUsd, callback);
        tokio::time::sleep(Duration::from_millis(25)).await;

        assert!(client.is_polling(TradingPair::EthUsd));
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(seen.lock()[0].price, 2_000.0);
        subscription.unsubscribe();
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_callback_does_not_stop_others() {
        let client = client_with(StubSource::fixed(50.0));
        let (seen, callback) = recorder();

        let noisy = client.subscribe(TradingPair::SolUsd, |_| panic!("subscriber bug"));
        let quiet = client.subscribe(TradingPair::SolUsd, callback);
        tokio::time::sleep(Duration::from_millis(25)).await;

        assert_eq!(seen.lock().len(), 2);
        assert!(client.is_polling(TradingPair::SolUsd));
        noisy.unsubscribe();
        quiet.unsubscribe();
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_may_unsubscribe_itself() {
        let client = client_with(StubSource::fixed(50.0));
        let calls = Arc::new(AtomicU64::new(0));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let subscription = {
            let calls = Arc::clone(&calls);
            let slot = Arc::clone(&slot);
            client.subscribe(TradingPair::SolUsd, move |update| {
                assert_eq!(update.pair, TradingPair::SolUsd);
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(subscription) = slot.lock().as_ref() {
                    subscription.unsubscribe();
                }
            })
        };
        *slot.lock() = Some(subscription);

        tokio::time::sleep(Duration::from_millis(45)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!client.is_polling(TradingPair::SolUsd));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_stops_everything() {
        let client = client_with(StubSource::fixed(50.0));
        let (seen, callback) = recorder();

        let subscription = client.subscribe(TradingPair::SolUsd, callback.clone());
        client.subscribe(TradingPair::EthUsd, callback);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(client.is_connected());

        client.cleanup();
        client.cleanup();

        assert!(!client.is_polling(TradingPair::SolUsd));
        assert!(!client.is_polling(TradingPair::EthUsd));
        assert_eq!(client.subscriber_count(TradingPair::SolUsd), 0);
        assert!(!client.is_connected());
        assert_eq!(client.oracle().cache_stats().total_entries, 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(seen.lock().is_empty());

        // Unsubscribing after cleanup is still safe
        subscription.unsubscribe();
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_failed_probes_leave_client_disconnected() {
        let transport = ScriptedTransport::unreachable();
        let client = OracleClient::builder(test_config())
            .transport(transport.clone())
            .build()
            .unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(!client.is_connected());
        assert!(!client.connection().has_pending_retry());
        assert_eq!(transport.probe_count(), 6);

        // Quotes still come from the price sources
        assert!(client.get_price(TradingPair::SolUsd).await.is_ok());
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let config = OracleConfig {
            timeout_ms: 0,
            ..test_config()
        };
        let err = OracleClient::builder(config)
            .transport(ScriptedTransport::healthy())
            .build()
            .err()
            .unwrap();

        assert_eq!(err.code(), ErrorCode::Config);
    }
}

//! In-Memory Price Cache
//!
//! Short-lived cache of the last fresh price per trading pair.
//!
//! # Architecture
//! ```text
//! Request → Check Cache → Fresh? → Return (no network, no proof)
//!              ↓
//!            Stale/empty? → Fetch → Store → Return
//! ```
//!
//! # Cache Strategy
//! - One slot per supported pair, created up front
//! - An entry is fresh iff `now - timestamp < ttl`
//! - Stale entries are never evicted; they are bypassed and overwritten
//! - Each slot has a fetch gate so only one fetch per pair runs at a time;
//!   callers queued behind it see the entry it stored
//! - Nothing is stored unless the whole fetch succeeds, so a price whose
//!   later checks fail is never served from the cache

use crate::{error::Result, types::{now_millis, TradingPair}};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Cached observation for one pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CachedPrice {
    pub price: f64,

    /// Unix timestamp (ms) of the fetch that produced this entry
    pub timestamp: i64,
}

impl CachedPrice {
    /// Entry stamped with the current time
    pub fn now(price: f64) -> Self {
        Self {
            price,
            timestamp: now_millis(),
        }
    }

    pub fn is_fresh(&self, now: i64, ttl: Duration) -> bool {
        now - self.timestamp < ttl.as_millis() as i64
    }
}

/// Result of a cache-through lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T = ()> {
    /// Served from a fresh entry
    Hit(CachedPrice),
    /// Fetched and stored by this call, with whatever the fetch produced
    /// alongside the entry
    Fetched(CachedPrice, T),
}

#[derive(Default)]
struct Slot {
    fetch_gate: tokio::sync::Mutex<()>,
    entry: Mutex<Option<CachedPrice>>,
}

/// Per-pair price cache
pub struct PriceCache {
    slots: HashMap<TradingPair, Slot>,

    /// Staleness threshold
    ttl: Duration,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: TradingPair::ALL
                .into_iter()
                .map(|pair| (pair, Slot::default()))
                .collect(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn slot(&self, pair: TradingPair) -> &Slot {
        // Every pair gets a slot in `new`
        &self.slots[&pair]
    }

    /// Fresh entry for `pair`, if any
    pub fn get_price(&self, pair: TradingPair) -> Option<CachedPrice> {
        let entry = (*self.slot(pair).entry.lock())?;
        entry.is_fresh(now_millis(), self.ttl).then_some(entry)
    }

    pub fn set_price(&self, pair: TradingPair, price: f64, timestamp: i64) -> CachedPrice {
        let entry = CachedPrice { price, timestamp };
        *self.slot(pair).entry.lock() = Some(entry);
        debug!(%pair, price, "Cached price (ttl: {:?})", self.ttl);
        entry
    }

    /// Drop every entry
    pub fn clear_all(&self) {
        for slot in self.slots.values() {
            *slot.entry.lock() = None;
        }
        debug!("Cleared all cached prices");
    }

    pub fn stats(&self) -> CacheStats {
        let now = now_millis();
        let entries: Vec<CachedPrice> = self
            .slots
            .values()
            .filter_map(|slot| *slot.entry.lock())
            .collect();

        CacheStats {
            total_entries: entries.len(),
            fresh_entries: entries.iter().filter(|e| e.is_fresh(now, self.ttl)).count(),
            ttl_ms: self.ttl.as_millis() as u64,
        }
    }

    /// Return the fresh entry for `pair`, or run `fetch_fn` and store the
    /// entry it produces.
    ///
    /// The pair's fetch gate is held from the freshness check until the
    /// store, so concurrent callers for one pair trigger a single fetch.
    ///
    /// # Arguments
    /// * `pair` - Pair to look up
    /// * `fetch_fn` - Produces the entry to cache plus any extra output
    ///   (such as a proof) that is handed back but not cached
    ///
    /// # Errors
    /// Whatever `fetch_fn` returns. A failed fetch leaves the slot untouched.
    ///
    /// # Example
    /// ```rust,ignore
    /// let lookup = cache
    ///     .get_price_with_cache(TradingPair::SolUsd, || async {
    ///         Ok((CachedPrice::now(50.0), ()))
    ///     })
    ///     .await?;
    /// ```
    pub async fn get_price_with_cache<F, Fut, T>(
        &self,
        pair: TradingPair,
        fetch_fn: F,
    ) -> Result<CacheLookup<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(CachedPrice, T)>>,
    {
        let _gate = self.slot(pair).fetch_gate.lock().await;

        if let Some(cached) = self.get_price(pair) {
            debug!(%pair, "Cache HIT");
            return Ok(CacheLookup::Hit(cached));
        }

        debug!(%pair, "Cache MISS, fetching");
        let (entry, extra) = fetch_fn().await?;
        let entry = self.set_price(pair, entry.price, entry.timestamp);
        Ok(CacheLookup::Fetched(entry, extra))
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Pairs with an entry, fresh or stale
    pub total_entries: usize,

    pub fresh_entries: usize,

    /// Staleness threshold in milliseconds
    pub ttl_ms: u64,
}

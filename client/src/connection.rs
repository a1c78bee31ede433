//! Connection Health Monitoring
//!
//! Keeps a "connected" belief about the RPC transport and heals it with
//! exponential backoff.
//!
//! # State Machine
//! ```text
//! probe ok   → connected, attempts = 0 (stop)
//! probe fail → disconnected → attempts < max? → sleep(base × 2^attempts)
//!                                               → attempts += 1 → probe
//!                           → attempts ≥ max? → stay disconnected (stop)
//! ```
//!
//! Once the attempt cap is reached nothing is scheduled again until a caller
//! invokes [`ConnectionManager::update_connection`].

use crate::transport::RpcTransport;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Base delay before the first reconnect attempt
pub const RECONNECT_INTERVAL: Duration = Duration::from_millis(1000);

/// Reconnect attempts before the manager gives up
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Exponential backoff schedule for reconnects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_interval: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_interval: RECONNECT_INTERVAL,
            max_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retrying after `attempt` previous retries, or `None`
    /// once the cap is reached
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        Some(
            self.base_interval
                .saturating_mul(2u32.saturating_pow(attempt)),
        )
    }
}

#[derive(Debug, Default)]
struct ConnectionState {
    is_connected: bool,
    reconnect_attempts: u32,
    retry_pending: bool,
    /// Bumped on cleanup; a monitor cycle only writes state for its own generation
    generation: u64,
    monitor: Option<JoinHandle<()>>,
}

struct Shared {
    transport: RwLock<Arc<dyn RpcTransport>>,
    state: Mutex<ConnectionState>,
    policy: BackoffPolicy,
}

/// Owns the transport handle and its health state
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a manager and immediately start probing the transport.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Arguments
    /// * `transport` - Endpoint to monitor
    /// * `policy` - Backoff schedule between failed probes
    ///
    /// # Example
    /// ```rust,ignore
    /// let manager = ConnectionManager::new(
    ///     Arc::new(SolanaTransport::from_config(&config)?),
    ///     BackoffPolicy::default(),
    /// );
    /// ```
    pub fn new(transport: Arc<dyn RpcTransport>, policy: BackoffPolicy) -> Self {
        let manager = Self {
            shared: Arc::new(Shared {
                transport: RwLock::new(transport),
                state: Mutex::new(ConnectionState::default()),
                policy,
            }),
        };
        manager.start_monitoring();
        manager
    }

    fn start_monitoring(&self) {
        let mut state = self.shared.state.lock();
        let generation = state.generation;
        let shared = Arc::clone(&self.shared);
        state.monitor = Some(tokio::spawn(monitor_connection(shared, generation)));
    }

    /// Current connected belief; never triggers a probe
    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().is_connected
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.state.lock().reconnect_attempts
    }

    /// Whether a backoff retry is currently scheduled
    pub fn has_pending_retry(&self) -> bool {
        self.shared.state.lock().retry_pending
    }

    pub fn policy(&self) -> BackoffPolicy {
        self.shared.policy
    }

    pub fn transport(&self) -> Arc<dyn RpcTransport> {
        Arc::clone(&self.shared.transport.read())
    }

    /// Swap in a new transport and restart the monitoring cycle against it
    ///
    /// # How it works:
    /// 1. Cancel the current cycle and any pending retry
    /// 2. Reset to disconnected with zero attempts
    /// 3. Probe the new transport right away
    pub fn update_connection(&self, transport: Arc<dyn RpcTransport>) {
        self.cleanup();
        info!("Switching RPC transport to {}", transport.endpoint());
        *self.shared.transport.write() = transport;
        self.start_monitoring();
    }

    /// Cancel any pending retry and reset to disconnected. Idempotent.
    pub fn cleanup(&self) {
        let mut state = self.shared.state.lock();
        state.generation = state.generation.wrapping_add(1);
        if let Some(monitor) = state.monitor.take() {
            monitor.abort();
        }
        state.is_connected = false;
        state.reconnect_attempts = 0;
        state.retry_pending = false;
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}

async fn monitor_connection(shared: Arc<Shared>, generation: u64) {
    loop {
        let transport = Arc::clone(&shared.transport.read());
        let outcome = transport.probe().await;

        let delay = {
            let mut state = shared.state.lock();
            if state.generation != generation {
                return;
            }

            match outcome {
                Ok(slot) => {
                    state.is_connected = true;
                    state.reconnect_attempts = 0;
                    state.retry_pending = false;
                    info!(slot, "Connection established successfully");
                    return;
                }
                Err(e) => {
                    error!(error = %e, "Failed to establish connection");
                    state.is_connected = false;

                    match shared.policy.delay(state.reconnect_attempts) {
                        Some(delay) => {
                            state.retry_pending = true;
                            delay
                        }
                        None => {
                            state.retry_pending = false;
                            error!(
                                attempts = state.reconnect_attempts,
                                "Max reconnection attempts reached"
                            );
                            return;
                        }
                    }
                }
            }
        };

        tokio::time::sleep(delay).await;

        let mut state = shared.state.lock();
        if state.generation != generation {
            return;
        }
        state.retry_pending = false;
        state.reconnect_attempts += 1;
        info!(
            "Attempting to reconnect ({}/{})",
            state.reconnect_attempts, shared.policy.max_attempts
        );
    }
}

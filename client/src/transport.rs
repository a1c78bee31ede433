//! RPC Transport
//!
//! The connection the client health-checks. The connection manager only
//! needs one thing from it: a cheap round trip that proves the endpoint
//! answers.
//!
//! # Probe
//! ```text
//! ConnectionManager → probe() → getSlot (bounded by timeout) → Ok(slot)
//!                                                           → Network / Timeout
//! ```

use crate::{
    config::OracleConfig,
    error::{OracleError, Result},
};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use std::time::Duration;
use tracing::{debug, warn};

/// RPC connection the client runs against
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Endpoint description for logs
    fn endpoint(&self) -> String;

    /// Lightweight round-trip proving the endpoint is reachable.
    /// Returns the current slot.
    async fn probe(&self) -> Result<u64>;
}

/// Solana JSON-RPC transport
pub struct SolanaTransport {
    rpc_client: RpcClient,
    timeout: Duration,
}

impl SolanaTransport {
    /// Create a transport against `rpc_url`
    ///
    /// # Arguments
    /// * `rpc_url` - JSON-RPC endpoint (e.g., "https://api.mainnet-beta.solana.com")
    /// * `commitment` - Commitment level for RPC reads
    /// * `timeout` - Upper bound on each request, probes included
    pub fn new(rpc_url: &str, commitment: CommitmentConfig, timeout: Duration) -> Self {
        Self {
            rpc_client: RpcClient::new_with_timeout_and_commitment(
                rpc_url.to_string(),
                timeout,
                commitment,
            ),
            timeout,
        }
    }

    /// Build from `rpcEndpoint`, `commitment` and `timeout`
    ///
    /// # Errors
    /// * `Config` - the commitment string is not a known level
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        Ok(Self::new(
            &config.rpc_endpoint,
            config.commitment_config()?,
            config.timeout(),
        ))
    }

    pub fn rpc_client(&self) -> &RpcClient {
        &self.rpc_client
    }
}

#[async_trait]
impl RpcTransport for SolanaTransport {
    fn endpoint(&self) -> String {
        self.rpc_client.url()
    }

    async fn probe(&self) -> Result<u64> {
        let slot = tokio::time::timeout(self.timeout, self.rpc_client.get_slot())
            .await
            .map_err(|_| {
                OracleError::Timeout(format!("slot probe exceeded {:?}", self.timeout))
            })?
            .map_err(|e| {
                warn!("RPC probe against {} failed: {}", self.rpc_client.url(), e);
                OracleError::from(e)
            })?;

        debug!(slot, "RPC probe succeeded");
        Ok(slot)
    }
}

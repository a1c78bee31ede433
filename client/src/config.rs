use crate::error::{OracleError, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_RPC_ENDPOINT: &str = "https://api.mainnet-beta.solana.com";
pub const DEFAULT_COMMITMENT: &str = "confirmed";
pub const DEFAULT_CACHE_DURATION_MS: u64 = 60_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 5_000;

/// Logging verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(OracleError::Config(format!("Unknown log level: {}", other))),
        }
    }
}

/// Client configuration
///
/// Every field has a default, so a partial document only overrides the
/// fields it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OracleConfig {
    /// Solana RPC endpoint
    pub rpc_endpoint: String,

    /// Commitment level for RPC reads (processed, confirmed, finalized)
    pub commitment: String,

    /// Maximum age of a cached price before it is refreshed (milliseconds)
    #[serde(rename = "cacheDuration")]
    pub cache_duration_ms: u64,

    /// Extra aggregation attempts after a transient failure
    pub max_retries: u32,

    /// Deadline for a single aggregation or proof call (milliseconds)
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,

    /// Verify every freshly generated proof
    pub validate_proofs: bool,

    pub log_level: LogLevel,

    /// Polling cadence for subscriptions (milliseconds)
    #[serde(rename = "updateInterval")]
    pub update_interval_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            rpc_endpoint: DEFAULT_RPC_ENDPOINT.to_string(),
            commitment: DEFAULT_COMMITMENT.to_string(),
            cache_duration_ms: DEFAULT_CACHE_DURATION_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            validate_proofs: true,
            log_level: LogLevel::default(),
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
        }
    }
}

impl OracleConfig {
    /// Load configuration from environment variables (and `.env` if present)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup, falling back to
    /// defaults for every missing key
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            rpc_endpoint: lookup("AURYX_RPC_ENDPOINT").unwrap_or(defaults.rpc_endpoint),
            commitment: lookup("AURYX_COMMITMENT").unwrap_or(defaults.commitment),
            cache_duration_ms: parse_var(&lookup, "AURYX_CACHE_DURATION_MS")?
                .unwrap_or(defaults.cache_duration_ms),
            max_retries: parse_var(&lookup, "AURYX_MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            timeout_ms: parse_var(&lookup, "AURYX_TIMEOUT_MS")?.unwrap_or(defaults.timeout_ms),
            validate_proofs: parse_var(&lookup, "AURYX_VALIDATE_PROOFS")?
                .unwrap_or(defaults.validate_proofs),
            log_level: parse_var(&lookup, "AURYX_LOG_LEVEL")?.unwrap_or(defaults.log_level),
            update_interval_ms: parse_var(&lookup, "AURYX_UPDATE_INTERVAL_MS")?
                .unwrap_or(defaults.update_interval_ms),
        })
    }

    /// Parse a (possibly partial) JSON document over the defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| OracleError::Config(format!("Invalid configuration: {}", e)))
    }

    pub fn commitment_config(&self) -> Result<CommitmentConfig> {
        CommitmentConfig::from_str(&self.commitment).map_err(|e| {
            OracleError::Config(format!("Invalid commitment '{}': {}", self.commitment, e))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_endpoint.trim().is_empty() {
            return Err(OracleError::Config("rpcEndpoint must not be empty".to_string()));
        }
        if self.cache_duration_ms == 0 {
            return Err(OracleError::Config("cacheDuration must be positive".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(OracleError::Config("timeout must be positive".to_string()));
        }
        if self.update_interval_ms == 0 {
            return Err(OracleError::Config("updateInterval must be positive".to_string()));
        }
        self.commitment_config()?;
        Ok(())
    }

    pub fn cache_duration(&self) -> Duration {
        Duration::from_millis(self.cache_duration_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| OracleError::Config(format!("Invalid value for {}: {}", key, e))),
        None => Ok(None),
    }
}

//! Configuration types and validation for the gateway.

use std::time::Duration;

use alloy_eips::BlockNumberOrTag;
use alloy_primitives::Address;
use backon::ExponentialBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_CACHE_SIZE, DEFAULT_COMMIT_CACHE_SIZE, DEFAULT_LATEST_CACHE_SEC, DEFAULT_PROOF_BATCH_SIZE,
    DEFAULT_RETRY_INITIAL_DELAY, DEFAULT_RETRY_MAX_DELAY, DEFAULT_RPC_MAX_RETRIES,
};

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A field value is out of the allowed range.
    #[error("{field} must be {constraint}, got {value}")]
    OutOfRange {
        /// The field name that is out of range.
        field: &'static str,
        /// The constraint description.
        constraint: &'static str,
        /// The actual value.
        value: String,
    },
    /// A required contract address is zero.
    #[error("{0} address must be set")]
    MissingAddress(&'static str),
}

/// Retry configuration for transport-level RPC failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_attempts: u32,
    /// Initial delay for exponential backoff.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RPC_MAX_RETRIES,
            initial_delay: DEFAULT_RETRY_INITIAL_DELAY,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }
}

impl RetryConfig {
    /// A configuration that never retries.
    pub const fn disabled() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: DEFAULT_RETRY_INITIAL_DELAY,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }

    /// Creates a `backon` [`ExponentialBuilder`] from this configuration.
    pub fn to_backoff_builder(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts as usize)
            .with_jitter()
    }
}

/// Configuration shared by every block prover a rollup creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProverConfig {
    /// Capacity of each prover's proof LRU.
    pub cache_size: usize,
    /// Maximum number of storage slots per proof request.
    pub proof_batch_size: usize,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self { cache_size: DEFAULT_CACHE_SIZE, proof_batch_size: DEFAULT_PROOF_BATCH_SIZE }
    }
}

impl ProverConfig {
    /// Sets the proof cache capacity.
    pub const fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    /// Sets the per-request slot batch size.
    pub const fn with_proof_batch_size(mut self, proof_batch_size: usize) -> Self {
        self.proof_batch_size = proof_batch_size;
        self
    }

    /// Validates the prover configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "cache-size",
                constraint: "greater than 0",
                value: "0".to_string(),
            });
        }
        if self.proof_batch_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "proof-batch-size",
                constraint: "greater than 0",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration of an output-oracle rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpConfig {
    /// Address of the `L2OutputOracle` (sometimes deployed as `L2OutputOracleProxy`).
    pub l2_output_oracle: Address,
    /// Minimum output age in seconds. Zero requires full finalization.
    #[serde(default)]
    pub min_age_sec: u64,
}

impl OpConfig {
    /// Returns true when outputs younger than the finalization period are admissible.
    pub const fn unfinalized(&self) -> bool {
        self.min_age_sec > 0
    }

    /// Validates the rollup configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.l2_output_oracle.is_zero() {
            return Err(ConfigError::MissingAddress("L2OutputOracle"));
        }
        Ok(())
    }
}

/// Configuration of a based rollup with periodic state root syncs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaikoConfig {
    /// Address of the `TaikoL1` contract.
    pub taiko_l1: Address,
    /// Number of state root sync intervals between commits. Zero steps by one block.
    pub commit_batch_span: u64,
}

impl TaikoConfig {
    /// Validates the rollup configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.taiko_l1.is_zero() {
            return Err(ConfigError::MissingAddress("TaikoL1"));
        }
        Ok(())
    }
}

/// Configuration of the Linea rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineaConfig {
    /// Address of the `LineaRollup` contract on L1.
    pub l1_message_service: Address,
    /// Number of L1 blocks scanned per `eth_getLogs` call when walking finalizations.
    #[serde(default = "default_log_scan_range")]
    pub log_scan_range: u64,
}

const fn default_log_scan_range() -> u64 {
    10_000
}

impl LineaConfig {
    /// Validates the rollup configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.l1_message_service.is_zero() {
            return Err(ConfigError::MissingAddress("LineaRollup"));
        }
        if self.log_scan_range == 0 {
            return Err(ConfigError::OutOfRange {
                field: "log-scan-range",
                constraint: "greater than 0",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration of the request orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayConfig {
    /// How many commits behind the latest a request may still be answered against.
    pub commit_depth: u64,
    /// Maximum number of commits kept in memory.
    pub commit_cache_size: u64,
    /// Seconds the latest commit index is reused before it is looked up again.
    pub latest_cache_sec: u64,
    /// Read rollup state at `latest` instead of `finalized` L1 blocks.
    pub unfinalized: bool,
    /// Block prover settings.
    pub prover: ProverConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            commit_depth: 3,
            commit_cache_size: DEFAULT_COMMIT_CACHE_SIZE,
            latest_cache_sec: DEFAULT_LATEST_CACHE_SEC,
            unfinalized: false,
            prover: ProverConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Returns the L1 block tag rollup state is read at.
    pub const fn latest_block_tag(&self) -> BlockNumberOrTag {
        if self.unfinalized { BlockNumberOrTag::Latest } else { BlockNumberOrTag::Finalized }
    }

    /// Validates the gateway configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.commit_cache_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "commit-cache-size",
                constraint: "greater than 0",
                value: "0".to_string(),
            });
        }
        if self.commit_depth >= self.commit_cache_size {
            return Err(ConfigError::OutOfRange {
                field: "commit-depth",
                constraint: "less than commit-cache-size",
                value: self.commit_depth.to_string(),
            });
        }
        self.prover.validate()
    }
}

//! Error types for the gateway.

use thiserror::Error;

use crate::{config::ConfigError, rpc::RpcError};

/// Errors returned by rollup contract reads.
///
/// A revert is kept apart from transport failures: an oracle that reverts on an
/// index read means the commitment was deleted or never existed, while a
/// transport failure says nothing about the commitment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// The call reverted.
    #[error("{call} reverted: {reason}")]
    Reverted {
        /// The contract function that was called.
        call: &'static str,
        /// Revert reason or raw revert data.
        reason: String,
    },

    /// The call failed before reaching the contract.
    #[error("{call} failed: {reason}")]
    Transport {
        /// The contract function that was called.
        call: &'static str,
        /// Transport error message.
        reason: String,
    },

    /// The call returned a value that does not fit the expected type.
    #[error("{call} returned an invalid value: {reason}")]
    InvalidReturn {
        /// The contract function that was called.
        call: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ContractError {
    /// Returns true if the call reverted.
    pub const fn is_revert(&self) -> bool {
        matches!(self, Self::Reverted { .. })
    }
}

/// Main error type for the gateway.
///
/// Cloneable so that one failed commit fetch can be reported to every request
/// that was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// RPC error.
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    /// Contract interaction error.
    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The commitment at this index does not exist or failed verification.
    #[error("invalid commit {index}: {reason}")]
    InvalidCommit {
        /// Commit index.
        index: u64,
        /// Why the commit was rejected.
        reason: String,
    },

    /// No output old enough to satisfy the configured minimum age.
    #[error("no valid output found")]
    NoValidOutput,

    /// The commit has no parent.
    #[error("commit {0} has no parent")]
    NoParentCommit(u64),

    /// The requested commit is outside the window served by the gateway.
    #[error("commit {index} is too old: oldest served is {oldest}")]
    CommitTooOld {
        /// Requested commit index.
        index: u64,
        /// Oldest commit index currently served.
        oldest: u64,
    },

    /// A proof reference was written twice.
    #[error("proof ref {0} already filled")]
    ProofAlreadyFilled(usize),

    /// A proof reference was read before it was written.
    #[error("proof ref {0} was never filled")]
    UnfilledProof(usize),

    /// The witness would reference more proofs than its order encoding can address.
    #[error("too many proofs: {0} exceeds {max}", max = crate::MAX_WITNESS_PROOFS)]
    TooManyProofs(usize),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_is_revert() {
        let reverted = ContractError::Reverted { call: "getL2Output", reason: "panic 0x32".into() };
        let transport = ContractError::Transport { call: "getL2Output", reason: "timeout".into() };
        assert!(reverted.is_revert());
        assert!(!transport.is_revert());
    }

    #[test]
    fn test_error_display() {
        let error = GatewayError::InvalidCommit { index: 7, reason: "output root mismatch".into() };
        assert_eq!(error.to_string(), "invalid commit 7: output root mismatch");

        assert_eq!(GatewayError::NoValidOutput.to_string(), "no valid output found");
        assert_eq!(GatewayError::TooManyProofs(300).to_string(), "too many proofs: 300 exceeds 256");

        let error = GatewayError::from(RpcError::Timeout("30s".into()));
        assert_eq!(error.to_string(), "RPC error: Request timeout: 30s");
    }
}

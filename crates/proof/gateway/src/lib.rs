//! Off-chain gateway that proves L2 storage against L1-anchored rollup commitments.
//!
//! A contract on L1 asks for storage that lives on an L2. This crate answers such
//! requests by:
//! - Locating an admissible rollup commitment (output oracle, based sync, Linea finalization)
//! - Fetching account and storage proofs at the committed block, deduplicating in-flight fetches
//! - Encoding the proofs into the binary witness the on-chain verifier decodes

#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![deny(unused_must_use)]
#![deny(rust_2018_idioms)]

pub mod cache;
pub mod config;
pub mod constants;
pub mod contracts;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod prover;
pub mod rollup;
pub mod rpc;
pub mod witness;

#[cfg(test)]
pub(crate) mod test_utils;

pub use cache::{CacheEntry, CacheMetrics, Deferred, PendingProof, ProofCache, Reservation};
pub use config::{ConfigError, GatewayConfig, ProverConfig, RetryConfig};
pub use constants::*;
pub use error::*;
pub use gateway::{Gateway, GatewayRequest, GatewayResponse, Need};
pub use prover::{BlockProver, EthProver, FetchedProofs, LineaProver, ProofKey, StorageProver};
pub use rollup::{LineaRollup, OpRollup, Rollup, RollupBase, RollupCommit, TaikoRollup};
pub use witness::{NeedsBuilder, ProofArena, ProofRef, ProofSequence, TargetNeed};

//! Rollup commitments: discovery, ancestry, revalidation, and witness encoding.
//!
//! Every L2 publishes state commitments to L1 under its own rules. A [`Rollup`]
//! knows how to find the newest admissible commitment, walk back to older ones,
//! check whether a cached one still stands, and wrap a [`ProofSequence`] into the
//! witness its on-chain verifier expects.

mod linea;
mod op;
mod taiko;

pub use linea::{LineaCommit, LineaRollup};
pub use op::{OpCommit, OpRollup, output_root_v0};
pub use taiko::{TaikoCommit, TaikoRollup};

use std::sync::Arc;

use alloy_eips::BlockNumberOrTag;
use alloy_primitives::Bytes;
use async_trait::async_trait;

use crate::{
    GatewayConfig, GatewayError, GatewayResult, ProverConfig, prover::StorageProver, witness::ProofSequence,
};

/// A state commitment of an L2 anchored on L1.
pub trait RollupCommit: Send + Sync + 'static {
    /// Prover bound to the committed block.
    type Prover: StorageProver;

    /// Index of the commit in the rollup's own numbering.
    fn index(&self) -> u64;

    /// Returns the prover bound to the committed L2 block.
    fn prover(&self) -> &Self::Prover;

    /// Returns the committed L2 block number.
    fn block_number(&self) -> u64 {
        self.prover().block_number()
    }
}

/// Commitment tracking for one rollup architecture.
#[async_trait]
pub trait Rollup: Send + Sync + 'static {
    /// Commit type of this rollup.
    type Commit: RollupCommit;

    /// Rollup name used in logs and metric labels.
    const NAME: &'static str;

    /// Returns the index of the newest admissible commit.
    async fn fetch_latest_commit_index(&self) -> GatewayResult<u64>;

    /// Returns the index of the commit preceding `commit`, or `None` at genesis.
    async fn fetch_parent_commit_index(&self, commit: &Self::Commit) -> GatewayResult<Option<u64>>;

    /// Fetches and verifies the commit at `index`.
    async fn fetch_commit(&self, index: u64) -> GatewayResult<Self::Commit>;

    /// Returns false if the commit was deleted or replaced since it was fetched.
    async fn is_commit_still_valid(&self, commit: &Self::Commit) -> GatewayResult<bool>;

    /// Encodes the witness for the on-chain verifier.
    fn encode_witness(&self, commit: &Self::Commit, proofs: &ProofSequence) -> Bytes;

    /// Converts a time window in seconds into a number of commits.
    fn window_from_sec(&self, sec: u64) -> u64;

    /// Fetches the newest admissible commit.
    async fn fetch_latest_commit(&self) -> GatewayResult<Self::Commit> {
        let index = self.fetch_latest_commit_index().await?;
        self.fetch_commit(index).await
    }

    /// Fetches the commit preceding `commit`.
    async fn fetch_parent_commit(&self, commit: &Self::Commit) -> GatewayResult<Self::Commit> {
        let index = self
            .fetch_parent_commit_index(commit)
            .await?
            .ok_or_else(|| GatewayError::NoParentCommit(commit.index()))?;
        self.fetch_commit(index).await
    }

    /// Returns the indices of up to `count` most recent commits, newest first.
    async fn fetch_recent_commit_indices(&self, count: usize) -> GatewayResult<Vec<u64>> {
        let mut indices = Vec::with_capacity(count);
        if count == 0 {
            return Ok(indices);
        }
        let mut commit = self.fetch_latest_commit().await?;
        loop {
            indices.push(commit.index());
            if indices.len() == count {
                break;
            }
            match self.fetch_parent_commit_index(&commit).await? {
                Some(index) => commit = self.fetch_commit(index).await?,
                None => break,
            }
        }
        Ok(indices)
    }
}

/// Clients and settings shared by every rollup.
#[derive(Debug)]
pub struct RollupBase<L1, L2> {
    /// Client of the rollup's L1 contract.
    pub l1_client: Arc<L1>,
    /// L2 RPC client.
    pub l2_client: Arc<L2>,
    /// L1 block tag rollup state is read at.
    pub latest_block_tag: BlockNumberOrTag,
    /// Settings of the block provers created for commits.
    pub prover_config: ProverConfig,
}

impl<L1, L2> RollupBase<L1, L2> {
    /// Creates a base reading finalized L1 state with the default prover settings.
    pub fn new(l1_client: Arc<L1>, l2_client: Arc<L2>) -> Self {
        Self {
            l1_client,
            l2_client,
            latest_block_tag: BlockNumberOrTag::Finalized,
            prover_config: ProverConfig::default(),
        }
    }

    /// Creates a base with the L1 block tag and prover settings of `config`.
    pub fn from_config(l1_client: Arc<L1>, l2_client: Arc<L2>, config: &GatewayConfig) -> Self {
        Self::new(l1_client, l2_client)
            .with_latest_block_tag(config.latest_block_tag())
            .with_prover_config(config.prover)
    }

    /// Sets the L1 block tag rollup state is read at.
    pub const fn with_latest_block_tag(mut self, tag: BlockNumberOrTag) -> Self {
        self.latest_block_tag = tag;
        self
    }

    /// Sets the prover settings.
    pub const fn with_prover_config(mut self, prover_config: ProverConfig) -> Self {
        self.prover_config = prover_config;
        self
    }
}

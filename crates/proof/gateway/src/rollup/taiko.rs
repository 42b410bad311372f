//! Based rollups that sync L2 state roots to L1 periodically (Taiko).

use std::sync::Arc;

use alloy_primitives::{B256, Bytes, U256};
use alloy_sol_types::SolValue;
use async_trait::async_trait;
use tracing::{debug, info};

use super::{Rollup, RollupBase, RollupCommit};
use crate::{
    GatewayResult, TAIKO_AVG_BLOCK_SEC,
    config::TaikoConfig,
    contracts::TaikoClient,
    metrics as gateway_metrics,
    prover::{EthProver, EthScheme},
    rpc::L2Client,
    witness::ProofSequence,
};

/// A synced Taiko block.
#[derive(Debug)]
pub struct TaikoCommit<L2: L2Client + 'static> {
    index: u64,
    parent_hash: B256,
    prover: EthProver<L2>,
}

impl<L2: L2Client + 'static> TaikoCommit<L2> {
    /// Returns the parent hash of the committed block.
    pub const fn parent_hash(&self) -> B256 {
        self.parent_hash
    }
}

impl<L2: L2Client + 'static> RollupCommit for TaikoCommit<L2> {
    type Prover = EthProver<L2>;

    fn index(&self) -> u64 {
        self.index
    }

    fn prover(&self) -> &EthProver<L2> {
        &self.prover
    }
}

/// A rollup whose commits are the L2 blocks synced to `TaikoL1`.
///
/// The commit index is the L2 block number. Commits are spaced `commit_step`
/// blocks apart, a multiple of the state root sync interval.
#[derive(Debug)]
pub struct TaikoRollup<T, L2> {
    base: RollupBase<T, L2>,
    commit_step: u64,
}

impl<T, L2> TaikoRollup<T, L2>
where
    T: TaikoClient + 'static,
    L2: L2Client + 'static,
{
    /// Creates the rollup, reading the sync interval from `TaikoL1` unless the
    /// span is zero.
    pub async fn create(base: RollupBase<T, L2>, config: TaikoConfig) -> GatewayResult<Self> {
        config.validate()?;
        let commit_step = if config.commit_batch_span > 0 {
            let interval = base.l1_client.state_root_sync_interval().await?;
            interval.saturating_mul(config.commit_batch_span).max(1)
        } else {
            1
        };
        info!(commit_step, "Created based rollup");
        Ok(Self { base, commit_step })
    }

    /// Returns the number of L2 blocks between commits.
    pub const fn commit_step(&self) -> u64 {
        self.commit_step
    }
}

/// Returns the commit before `index`, first aligning to the sync boundary.
///
/// Synced blocks satisfy `(index + 1) % step == 0`. An unaligned index steps back
/// to the previous boundary.
pub(crate) fn parent_commit_index(index: u64, step: u64) -> Option<u64> {
    if step > 1 {
        let rem = (index % step + 1) % step;
        if rem != 0 {
            return index.checked_sub(rem);
        }
    }
    index.checked_sub(step)
}

#[async_trait]
impl<T, L2> Rollup for TaikoRollup<T, L2>
where
    T: TaikoClient + 'static,
    L2: L2Client + 'static,
{
    type Commit = TaikoCommit<L2>;

    const NAME: &'static str = "taiko";

    async fn fetch_latest_commit_index(&self) -> GatewayResult<u64> {
        let synced = self.base.l1_client.last_synced_block(self.base.latest_block_tag).await?;
        Ok(synced.block_id)
    }

    async fn fetch_parent_commit_index(&self, commit: &TaikoCommit<L2>) -> GatewayResult<Option<u64>> {
        Ok(parent_commit_index(commit.index, self.commit_step))
    }

    async fn fetch_commit(&self, index: u64) -> GatewayResult<TaikoCommit<L2>> {
        let l2 = &self.base.l2_client;
        let block = l2.block_ref(Some(index)).await?;

        metrics::counter!(gateway_metrics::COMMITS_FETCHED_TOTAL, gateway_metrics::LABEL_ROLLUP => Self::NAME)
            .increment(1);
        debug!(index, parent_hash = %block.parent_hash, "Fetched synced block");

        let prover = EthProver::new(EthScheme::new(Arc::clone(l2)), block.number, self.base.prover_config);
        Ok(TaikoCommit { index, parent_hash: block.parent_hash, prover })
    }

    async fn is_commit_still_valid(&self, _commit: &TaikoCommit<L2>) -> GatewayResult<bool> {
        Ok(true)
    }

    fn encode_witness(&self, commit: &TaikoCommit<L2>, proofs: &ProofSequence) -> Bytes {
        let witness = (U256::from(commit.index), commit.parent_hash, proofs.proofs.clone(), proofs.order.clone());
        Bytes::from(witness.abi_encode_params())
    }

    fn window_from_sec(&self, sec: u64) -> u64 {
        sec.div_ceil(TAIKO_AVG_BLOCK_SEC.saturating_mul(self.commit_step))
    }
}

//! Linea: finalized L2 state roots stored on the `LineaRollup` contract.

use std::sync::Arc;

use alloy_primitives::{B256, Bytes, U256};
use alloy_sol_types::SolValue;
use async_trait::async_trait;
use tracing::debug;

use super::{Rollup, RollupBase, RollupCommit};
use crate::{
    GatewayError, GatewayResult, LINEA_BLOCK_SEC,
    config::LineaConfig,
    contracts::LineaRollupClient,
    metrics as gateway_metrics,
    prover::{LineaProver, LineaScheme},
    rpc::L2Client,
    witness::ProofSequence,
};

/// A finalized Linea block and its state root.
#[derive(Debug)]
pub struct LineaCommit<L2: L2Client + 'static> {
    index: u64,
    state_root: B256,
    prover: LineaProver<L2>,
}

impl<L2: L2Client + 'static> LineaCommit<L2> {
    /// Returns the finalized state root.
    pub const fn state_root(&self) -> B256 {
        self.state_root
    }
}

impl<L2: L2Client + 'static> RollupCommit for LineaCommit<L2> {
    type Prover = LineaProver<L2>;

    fn index(&self) -> u64 {
        self.index
    }

    fn prover(&self) -> &LineaProver<L2> {
        &self.prover
    }
}

/// A rollup whose commits are the last blocks of Linea finalizations.
#[derive(Debug)]
pub struct LineaRollup<C, L2> {
    base: RollupBase<C, L2>,
}

impl<C, L2> LineaRollup<C, L2>
where
    C: LineaRollupClient + 'static,
    L2: L2Client + 'static,
{
    /// Creates the rollup.
    pub fn new(base: RollupBase<C, L2>, config: &LineaConfig) -> GatewayResult<Self> {
        config.validate()?;
        Ok(Self { base })
    }
}

#[async_trait]
impl<C, L2> Rollup for LineaRollup<C, L2>
where
    C: LineaRollupClient + 'static,
    L2: L2Client + 'static,
{
    type Commit = LineaCommit<L2>;

    const NAME: &'static str = "linea";

    async fn fetch_latest_commit_index(&self) -> GatewayResult<u64> {
        Ok(self.base.l1_client.current_l2_block_number(self.base.latest_block_tag).await?)
    }

    async fn fetch_parent_commit_index(&self, commit: &LineaCommit<L2>) -> GatewayResult<Option<u64>> {
        let start = self.base.l1_client.finalization_start(commit.index).await?;
        Ok(start.and_then(|start| start.checked_sub(1)))
    }

    async fn fetch_commit(&self, index: u64) -> GatewayResult<LineaCommit<L2>> {
        let state_root = self.base.l1_client.state_root_hash(index).await?;
        if state_root.is_zero() {
            return Err(GatewayError::InvalidCommit { index, reason: "block not finalized".to_string() });
        }

        metrics::counter!(gateway_metrics::COMMITS_FETCHED_TOTAL, gateway_metrics::LABEL_ROLLUP => Self::NAME)
            .increment(1);
        debug!(index, %state_root, "Fetched finalized state root");

        let prover = LineaProver::new(LineaScheme::new(Arc::clone(&self.base.l2_client)), index, self.base.prover_config);
        Ok(LineaCommit { index, state_root, prover })
    }

    async fn is_commit_still_valid(&self, commit: &LineaCommit<L2>) -> GatewayResult<bool> {
        Ok(self.base.l1_client.state_root_hash(commit.index).await? == commit.state_root)
    }

    fn encode_witness(&self, commit: &LineaCommit<L2>, proofs: &ProofSequence) -> Bytes {
        let witness = (U256::from(commit.index), proofs.proofs.clone(), proofs.order.clone());
        Bytes::from(witness.abi_encode_params())
    }

    fn window_from_sec(&self, sec: u64) -> u64 {
        sec.div_ceil(LINEA_BLOCK_SEC)
    }
}

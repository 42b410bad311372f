//! OP Stack rollups that post output roots to an `L2OutputOracle`.

use std::{
    future::Future,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use alloy_primitives::{B256, Bytes, U256, keccak256};
use alloy_sol_types::SolValue;
use async_trait::async_trait;
use tracing::{debug, info};

use super::{Rollup, RollupBase, RollupCommit};
use crate::{
    GatewayError, GatewayResult, L2_TO_L1_MESSAGE_PASSER, OUTPUT_ROOT_VERSION,
    config::OpConfig,
    contracts::{L2Output, OutputOracleClient},
    metrics as gateway_metrics,
    prover::{EthProver, EthScheme},
    rpc::{BlockRef, L2Client},
    witness::ProofSequence,
};

/// Computes a version 0 output root.
pub fn output_root_v0(state_root: B256, message_passer_storage_root: B256, block_hash: B256) -> B256 {
    let mut preimage = [0u8; 128];
    preimage[..32].copy_from_slice(OUTPUT_ROOT_VERSION.as_slice());
    preimage[32..64].copy_from_slice(state_root.as_slice());
    preimage[64..96].copy_from_slice(message_passer_storage_root.as_slice());
    preimage[96..].copy_from_slice(block_hash.as_slice());
    keccak256(preimage)
}

/// A verified output of the oracle.
#[derive(Debug)]
pub struct OpCommit<L2: L2Client + 'static> {
    index: u64,
    output: L2Output,
    block: BlockRef,
    message_passer_storage_root: B256,
    prover: EthProver<L2>,
}

impl<L2: L2Client + 'static> OpCommit<L2> {
    /// Returns the output record read from the oracle.
    pub const fn output(&self) -> &L2Output {
        &self.output
    }

    /// Returns the committed L2 block.
    pub const fn block(&self) -> &BlockRef {
        &self.block
    }

    /// Returns the storage root of the `L2ToL1MessagePasser` at the committed block.
    pub const fn message_passer_storage_root(&self) -> B256 {
        self.message_passer_storage_root
    }
}

impl<L2: L2Client + 'static> RollupCommit for OpCommit<L2> {
    type Prover = EthProver<L2>;

    fn index(&self) -> u64 {
        self.index
    }

    fn prover(&self) -> &EthProver<L2> {
        &self.prover
    }
}

/// A rollup whose outputs are proposed to an `L2OutputOracle`.
///
/// Outputs are only trusted once they are older than the configured minimum age,
/// which defaults to the oracle's finalization period.
#[derive(Debug)]
pub struct OpRollup<O, L2> {
    base: RollupBase<O, L2>,
    config: OpConfig,
}

impl<O, L2> OpRollup<O, L2>
where
    O: OutputOracleClient + 'static,
    L2: L2Client + 'static,
{
    /// Creates the rollup.
    pub fn new(base: RollupBase<O, L2>, config: OpConfig) -> GatewayResult<Self> {
        config.validate()?;
        Ok(Self { base, config })
    }

    /// Returns true when outputs younger than the finalization period are admissible.
    pub const fn unfinalized(&self) -> bool {
        self.config.unfinalized()
    }

    async fn output_timestamp(&self, index: u64) -> GatewayResult<u64> {
        let output = self.base.l1_client.get_l2_output(index).await?.ok_or_else(|| {
            GatewayError::InvalidCommit { index, reason: "output not found".to_string() }
        })?;
        Ok(output.timestamp)
    }
}

/// Finds the newest output index whose timestamp is at or before `cutoff`.
///
/// Starts `offset` outputs behind `latest` and walks one index at a time: forward
/// while outputs are old enough, backward while they are too recent. Timestamps
/// must be non-decreasing in the index.
pub(crate) async fn search_output_index<F, Fut>(
    latest: u64,
    offset: u64,
    cutoff: u64,
    mut timestamp_at: F,
) -> GatewayResult<u64>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = GatewayResult<u64>>,
{
    let mut offset = offset.min(latest);
    let mut last_valid = None;
    loop {
        let index = latest - offset;
        if timestamp_at(index).await? <= cutoff {
            last_valid = Some(index);
            if offset == 0 {
                break;
            }
            offset -= 1;
        } else {
            if last_valid.is_some() || offset == latest {
                break;
            }
            offset += 1;
        }
    }
    last_valid.ok_or(GatewayError::NoValidOutput)
}

#[async_trait]
impl<O, L2> Rollup for OpRollup<O, L2>
where
    O: OutputOracleClient + 'static,
    L2: L2Client + 'static,
{
    type Commit = OpCommit<L2>;

    const NAME: &'static str = "op";

    async fn fetch_latest_commit_index(&self) -> GatewayResult<u64> {
        let oracle = &self.base.l1_client;
        let (latest, finalization_period, submission_interval, l2_block_time) = tokio::try_join!(
            oracle.latest_output_index(),
            oracle.finalization_period_seconds(),
            oracle.submission_interval(),
            oracle.l2_block_time(),
        )?;

        let min_age = if self.config.min_age_sec == 0 { finalization_period } else { self.config.min_age_sec };
        let offset = min_age.checked_div(submission_interval.saturating_mul(l2_block_time)).unwrap_or(0);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| GatewayError::Internal(e.to_string()))?
            .as_secs();
        let cutoff = now.saturating_sub(min_age);

        debug!(latest, offset, cutoff, min_age, "Searching for output older than minimum age");
        let index = search_output_index(latest, offset, cutoff, |index| self.output_timestamp(index)).await?;
        info!(index, latest, "Found latest admissible output");
        Ok(index)
    }

    async fn fetch_parent_commit_index(&self, commit: &OpCommit<L2>) -> GatewayResult<Option<u64>> {
        Ok(commit.index.checked_sub(1))
    }

    async fn fetch_commit(&self, index: u64) -> GatewayResult<OpCommit<L2>> {
        let output = self.base.l1_client.get_l2_output(index).await?.ok_or_else(|| {
            GatewayError::InvalidCommit { index, reason: "output not found".to_string() }
        })?;

        let l2 = &self.base.l2_client;
        let block = l2.block_ref(Some(output.l2_block_number)).await?;
        let passer = l2.get_proof(L2_TO_L1_MESSAGE_PASSER, Vec::new(), block.number).await?;

        let computed = output_root_v0(block.state_root, passer.storage_hash, block.hash);
        if computed != output.output_root {
            return Err(GatewayError::InvalidCommit {
                index,
                reason: format!("output root mismatch: computed {computed}, oracle {}", output.output_root),
            });
        }

        metrics::counter!(gateway_metrics::COMMITS_FETCHED_TOTAL, gateway_metrics::LABEL_ROLLUP => Self::NAME)
            .increment(1);
        debug!(index, block = block.number, "Fetched output");

        let prover = EthProver::new(EthScheme::new(Arc::clone(l2)), block.number, self.base.prover_config);
        Ok(OpCommit { index, output, block, message_passer_storage_root: passer.storage_hash, prover })
    }

    async fn is_commit_still_valid(&self, commit: &OpCommit<L2>) -> GatewayResult<bool> {
        // Deleted outputs revert, replaced outputs have a different root.
        match self.base.l1_client.get_l2_output(commit.index).await? {
            Some(output) => Ok(output.output_root == commit.output.output_root),
            None => Ok(false),
        }
    }

    fn encode_witness(&self, commit: &OpCommit<L2>, proofs: &ProofSequence) -> Bytes {
        let preimage = (
            OUTPUT_ROOT_VERSION,
            commit.block.state_root,
            commit.message_passer_storage_root,
            commit.block.hash,
        );
        let witness = (U256::from(commit.index), preimage, proofs.proofs.clone(), proofs.order.clone());
        Bytes::from(witness.abi_encode())
    }

    fn window_from_sec(&self, sec: u64) -> u64 {
        sec
    }
}

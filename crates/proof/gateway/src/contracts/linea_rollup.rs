//! `LineaRollup` contract bindings.
//!
//! Linea finalizes L2 block ranges on L1 and records the final state root of
//! each range, keyed by the range's last block number.

use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::sol;
use alloy_eips::{BlockId, BlockNumberOrTag};
use alloy_rpc_types_eth::Filter;
use alloy_sol_types::SolEvent;
use async_trait::async_trait;

use super::{classify_call_error, to_u64};
use crate::ContractError;

sol! {
    /// `LineaRollup` contract interface.
    #[sol(rpc)]
    interface ILineaRollup {
        /// Emitted when a block range is finalized.
        event DataFinalizedV3(
            uint256 indexed startBlockNumber,
            uint256 indexed endBlockNumber,
            bytes32 indexed shnarf,
            bytes32 parentStateRootHash,
            bytes32 finalStateRootHash
        );

        /// Returns the last finalized L2 block number.
        function currentL2BlockNumber() external view returns (uint256);

        /// Returns the state root finalized at the given L2 block, or zero.
        function stateRootHashes(uint256 l2BlockNumber) external view returns (bytes32);
    }
}

/// Async trait for reading `LineaRollup` state.
#[async_trait]
pub trait LineaRollupClient: Send + Sync {
    /// Returns the last finalized L2 block number as seen at the given L1 block.
    async fn current_l2_block_number(&self, tag: BlockNumberOrTag) -> Result<u64, ContractError>;

    /// Returns the finalized state root of `l2_block_number`, zero if none.
    async fn state_root_hash(&self, l2_block_number: u64) -> Result<B256, ContractError>;

    /// Returns the first L2 block of the finalization that ended at `end_block_number`.
    async fn finalization_start(&self, end_block_number: u64) -> Result<Option<u64>, ContractError>;
}

/// Concrete implementation backed by Alloy's sol-generated contract bindings.
#[allow(missing_debug_implementations)]
pub struct LineaRollupContractClient {
    contract: ILineaRollup::ILineaRollupInstance<RootProvider>,
    log_scan_range: u64,
}

impl LineaRollupContractClient {
    /// Creates a new client for the given contract address and L1 RPC URL.
    pub fn new(address: Address, l1_rpc_url: url::Url, log_scan_range: u64) -> Self {
        Self::with_provider(address, RootProvider::new_http(l1_rpc_url), log_scan_range)
    }

    /// Creates a new client on an existing provider.
    pub const fn with_provider(address: Address, provider: RootProvider, log_scan_range: u64) -> Self {
        Self {
            contract: ILineaRollup::ILineaRollupInstance::new(address, provider),
            log_scan_range,
        }
    }
}

#[async_trait]
impl LineaRollupClient for LineaRollupContractClient {
    async fn current_l2_block_number(&self, tag: BlockNumberOrTag) -> Result<u64, ContractError> {
        let number = self
            .contract
            .currentL2BlockNumber()
            .block(BlockId::Number(tag))
            .call()
            .await
            .map_err(|e| classify_call_error("currentL2BlockNumber", e))?;
        to_u64("currentL2BlockNumber", number)
    }

    async fn state_root_hash(&self, l2_block_number: u64) -> Result<B256, ContractError> {
        self.contract
            .stateRootHashes(U256::from(l2_block_number))
            .call()
            .await
            .map_err(|e| classify_call_error("stateRootHashes", e))
    }

    async fn finalization_start(&self, end_block_number: u64) -> Result<Option<u64>, ContractError> {
        const CALL: &str = "DataFinalizedV3";

        let provider = self.contract.provider();
        let mut to_block = provider
            .get_block_number()
            .await
            .map_err(|e| ContractError::Transport { call: CALL, reason: e.to_string() })?;

        // Walk backwards: the finalization of a recent commit is usually recent too.
        loop {
            let from_block = to_block.saturating_sub(self.log_scan_range.saturating_sub(1));
            let filter = Filter::new()
                .address(*self.contract.address())
                .event_signature(ILineaRollup::DataFinalizedV3::SIGNATURE_HASH)
                .topic2(B256::from(U256::from(end_block_number)))
                .from_block(from_block)
                .to_block(to_block);

            let logs = provider
                .get_logs(&filter)
                .await
                .map_err(|e| ContractError::Transport { call: CALL, reason: e.to_string() })?;

            if let Some(log) = logs.last() {
                let event = log
                    .log_decode::<ILineaRollup::DataFinalizedV3>()
                    .map_err(|e| ContractError::InvalidReturn { call: CALL, reason: e.to_string() })?;
                return to_u64(CALL, event.inner.data.startBlockNumber).map(Some);
            }

            if from_block == 0 {
                return Ok(None);
            }
            to_block = from_block - 1;
        }
    }
}

//! `TaikoL1` contract bindings.
//!
//! Taiko syncs L2 state roots to L1 every `stateRootSyncInternal` blocks.

use alloy::primitives::{Address, B256};
use alloy::providers::RootProvider;
use alloy::sol;
use alloy_eips::{BlockId, BlockNumberOrTag};
use async_trait::async_trait;

use super::classify_call_error;
use crate::ContractError;

sol! {
    /// Base fee parameters of the Ontake fork.
    #[derive(Debug, Default, PartialEq, Eq)]
    struct BaseFeeConfig {
        uint8 adjustmentQuotient;
        uint8 sharingPctg;
        uint32 gasIssuancePerSecond;
        uint64 minGasExcess;
        uint32 maxGasIssuancePerBlock;
    }

    /// Protocol configuration returned by `getConfig()`.
    #[derive(Debug, Default, PartialEq, Eq)]
    struct TaikoProtocolConfig {
        uint64 chainId;
        uint64 blockMaxProposals;
        uint64 blockRingBufferSize;
        uint64 maxBlocksToVerify;
        uint32 blockMaxGasLimit;
        uint96 livenessBond;
        uint8 stateRootSyncInternal;
        uint64 maxAnchorHeightOffset;
        BaseFeeConfig baseFeeConfig;
        uint64 ontakeForkHeight;
    }

    /// `TaikoL1` contract interface.
    #[sol(rpc)]
    interface ITaikoL1 {
        /// Returns the protocol configuration.
        function getConfig() external view returns (TaikoProtocolConfig memory);

        /// Returns the last L2 block whose state root was synced to L1.
        function getLastSyncedBlock() external view returns (
            uint64 blockId,
            bytes32 blockHash,
            bytes32 stateRoot
        );
    }
}

/// The most recent L2 block whose state root is available on L1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncedBlock {
    /// L2 block number.
    pub block_id: u64,
    /// L2 block hash.
    pub block_hash: B256,
    /// L2 state root.
    pub state_root: B256,
}

/// Async trait for reading `TaikoL1` state.
#[async_trait]
pub trait TaikoClient: Send + Sync {
    /// Returns the number of L2 blocks between state root syncs.
    async fn state_root_sync_interval(&self) -> Result<u64, ContractError>;

    /// Returns the last synced block as seen at the given L1 block.
    async fn last_synced_block(&self, tag: BlockNumberOrTag) -> Result<SyncedBlock, ContractError>;
}

/// Concrete implementation backed by Alloy's sol-generated contract bindings.
#[allow(missing_debug_implementations)]
pub struct TaikoContractClient {
    contract: ITaikoL1::ITaikoL1Instance<RootProvider>,
}

impl TaikoContractClient {
    /// Creates a new client for the given contract address and L1 RPC URL.
    pub fn new(address: Address, l1_rpc_url: url::Url) -> Self {
        Self::with_provider(address, RootProvider::new_http(l1_rpc_url))
    }

    /// Creates a new client on an existing provider.
    pub const fn with_provider(address: Address, provider: RootProvider) -> Self {
        Self { contract: ITaikoL1::ITaikoL1Instance::new(address, provider) }
    }
}

#[async_trait]
impl TaikoClient for TaikoContractClient {
    async fn state_root_sync_interval(&self) -> Result<u64, ContractError> {
        let config = self
            .contract
            .getConfig()
            .call()
            .await
            .map_err(|e| classify_call_error("getConfig", e))?;
        Ok(u64::from(config.stateRootSyncInternal))
    }

    async fn last_synced_block(&self, tag: BlockNumberOrTag) -> Result<SyncedBlock, ContractError> {
        let result = self
            .contract
            .getLastSyncedBlock()
            .block(BlockId::Number(tag))
            .call()
            .await
            .map_err(|e| classify_call_error("getLastSyncedBlock", e))?;

        Ok(SyncedBlock {
            block_id: result.blockId,
            block_hash: result.blockHash,
            state_root: result.stateRoot,
        })
    }
}

//! `L2OutputOracle` contract bindings.
//!
//! The oracle stores periodically submitted OP output roots. Outputs can be
//! deleted by the challenger, after which reads of their index revert.

use alloy::primitives::{Address, B256, U256};
use alloy::providers::RootProvider;
use alloy::sol;
use async_trait::async_trait;

use super::{classify_call_error, to_u64};
use crate::ContractError;

sol! {
    /// Output proposal structure from the `L2OutputOracle`.
    #[derive(Debug, Default, PartialEq, Eq)]
    struct OutputProposal {
        bytes32 outputRoot;
        uint128 timestamp;
        uint128 l2BlockNumber;
    }

    /// `L2OutputOracle` contract interface.
    #[sol(rpc)]
    interface IL2OutputOracle {
        /// Returns the index of the most recent output.
        function latestOutputIndex() external view returns (uint256);

        /// Returns the output at the given index. Panics when out of bounds.
        function getL2Output(uint256 _l2OutputIndex) external view returns (OutputProposal memory);

        /// Returns the challenge window, in seconds.
        function finalizationPeriodSeconds() external view returns (uint256);

        /// Returns the number of L2 blocks between outputs.
        function submissionInterval() external view returns (uint256);

        /// Returns the L2 block time, in seconds.
        function l2BlockTime() external view returns (uint256);
    }
}

/// An output record read from the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L2Output {
    /// The committed output root.
    pub output_root: B256,
    /// L1 timestamp at which the output was submitted.
    pub timestamp: u64,
    /// The L2 block the output commits to.
    pub l2_block_number: u64,
}

impl TryFrom<OutputProposal> for L2Output {
    type Error = ContractError;

    fn try_from(proposal: OutputProposal) -> Result<Self, Self::Error> {
        let invalid = |field: &str| ContractError::InvalidReturn {
            call: "getL2Output",
            reason: format!("{field} overflows u64"),
        };
        Ok(Self {
            output_root: proposal.outputRoot,
            timestamp: u64::try_from(proposal.timestamp).map_err(|_| invalid("timestamp"))?,
            l2_block_number: u64::try_from(proposal.l2BlockNumber)
                .map_err(|_| invalid("l2BlockNumber"))?,
        })
    }
}

/// Async trait for reading `L2OutputOracle` state.
#[async_trait]
pub trait OutputOracleClient: Send + Sync {
    /// Returns the index of the most recent output.
    async fn latest_output_index(&self) -> Result<u64, ContractError>;

    /// Returns the output at `index`, or `None` if the read reverts (deleted or never submitted).
    async fn get_l2_output(&self, index: u64) -> Result<Option<L2Output>, ContractError>;

    /// Returns the challenge window, in seconds.
    async fn finalization_period_seconds(&self) -> Result<u64, ContractError>;

    /// Returns the number of L2 blocks between outputs.
    async fn submission_interval(&self) -> Result<u64, ContractError>;

    /// Returns the L2 block time, in seconds.
    async fn l2_block_time(&self) -> Result<u64, ContractError>;
}

/// Concrete implementation backed by Alloy's sol-generated contract bindings.
#[allow(missing_debug_implementations)]
pub struct OutputOracleContractClient {
    contract: IL2OutputOracle::IL2OutputOracleInstance<RootProvider>,
}

impl OutputOracleContractClient {
    /// Creates a new client for the given contract address and L1 RPC URL.
    pub fn new(address: Address, l1_rpc_url: url::Url) -> Self {
        Self::with_provider(address, RootProvider::new_http(l1_rpc_url))
    }

    /// Creates a new client on an existing provider.
    pub const fn with_provider(address: Address, provider: RootProvider) -> Self {
        Self { contract: IL2OutputOracle::IL2OutputOracleInstance::new(address, provider) }
    }
}

#[async_trait]
impl OutputOracleClient for OutputOracleContractClient {
    async fn latest_output_index(&self) -> Result<u64, ContractError> {
        let index = self
            .contract
            .latestOutputIndex()
            .call()
            .await
            .map_err(|e| classify_call_error("latestOutputIndex", e))?;
        to_u64("latestOutputIndex", index)
    }

    async fn get_l2_output(&self, index: u64) -> Result<Option<L2Output>, ContractError> {
        match self.contract.getL2Output(U256::from(index)).call().await {
            Ok(proposal) => L2Output::try_from(proposal).map(Some),
            Err(e) => match classify_call_error("getL2Output", e) {
                ContractError::Reverted { .. } => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn finalization_period_seconds(&self) -> Result<u64, ContractError> {
        let period = self
            .contract
            .finalizationPeriodSeconds()
            .call()
            .await
            .map_err(|e| classify_call_error("finalizationPeriodSeconds", e))?;
        to_u64("finalizationPeriodSeconds", period)
    }

    async fn submission_interval(&self) -> Result<u64, ContractError> {
        let interval = self
            .contract
            .submissionInterval()
            .call()
            .await
            .map_err(|e| classify_call_error("submissionInterval", e))?;
        to_u64("submissionInterval", interval)
    }

    async fn l2_block_time(&self) -> Result<u64, ContractError> {
        let block_time = self
            .contract
            .l2BlockTime()
            .call()
            .await
            .map_err(|e| classify_call_error("l2BlockTime", e))?;
        to_u64("l2BlockTime", block_time)
    }
}

//! Async trait definitions for RPC clients.

use alloy_primitives::{Address, B256};
use alloy_rpc_types_eth::EIP1186AccountProofResponse;
use async_trait::async_trait;

use super::{
    error::RpcResult,
    types::{BlockRef, LineaProofResponse},
};

/// L2 RPC client trait for the chain whose state is being proven.
#[async_trait]
pub trait L2Client: Send + Sync {
    /// Gets an account proof and storage proofs via `eth_getProof`.
    async fn get_proof(
        &self,
        address: Address,
        keys: Vec<B256>,
        block_number: u64,
    ) -> RpcResult<EIP1186AccountProofResponse>;

    /// Gets a sparse Merkle account proof and storage proofs via `linea_getProof`.
    async fn linea_get_proof(
        &self,
        address: Address,
        keys: Vec<B256>,
        block_number: u64,
    ) -> RpcResult<LineaProofResponse>;

    /// Gets a block reference by number.
    /// If `number` is `None`, returns the latest block.
    async fn block_ref(&self, number: Option<u64>) -> RpcResult<BlockRef>;
}

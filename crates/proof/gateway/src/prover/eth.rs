//! Ethereum Merkle-Patricia proofs via `eth_getProof`.

use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::SolValue;
use async_trait::async_trait;

use super::{FetchedProofs, ProofScheme};
use crate::{EMPTY_CODE_HASH, rpc::{L2Client, RpcResult}};

/// Account proof of an MPT state trie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthAccountProof {
    /// Trie nodes from the state root to the account leaf.
    pub nodes: Vec<Bytes>,
    /// Hash of the account code.
    pub code_hash: B256,
    /// Root of the account's storage trie.
    pub storage_hash: B256,
}

/// Storage proof of an MPT storage trie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthStorageProof {
    /// Slot value, zero if absent.
    pub value: U256,
    /// Trie nodes from the storage root to the slot leaf.
    pub nodes: Vec<Bytes>,
}

/// The Ethereum MPT proof scheme.
#[derive(Debug)]
pub struct EthScheme<L2> {
    l2_client: Arc<L2>,
}

impl<L2> EthScheme<L2> {
    /// Creates the scheme on an L2 client.
    pub const fn new(l2_client: Arc<L2>) -> Self {
        Self { l2_client }
    }
}

#[async_trait]
impl<L2: L2Client + 'static> ProofScheme for EthScheme<L2> {
    type AccountProof = EthAccountProof;
    type StorageProof = EthStorageProof;

    const NAME: &'static str = "eth";

    async fn request_proofs(
        &self,
        target: Address,
        slots: &[U256],
        block_number: u64,
    ) -> RpcResult<FetchedProofs<EthAccountProof, EthStorageProof>> {
        let keys = slots.iter().map(|slot| B256::from(slot.to_be_bytes::<32>())).collect();
        let response = self.l2_client.get_proof(target, keys, block_number).await?;

        Ok(FetchedProofs {
            account_proof: EthAccountProof {
                nodes: response.account_proof,
                code_hash: response.code_hash,
                storage_hash: response.storage_hash,
            },
            storage_proofs: response
                .storage_proof
                .into_iter()
                .map(|proof| EthStorageProof { value: proof.value, nodes: proof.proof })
                .collect(),
        })
    }

    fn is_contract(proof: &EthAccountProof) -> bool {
        proof.code_hash != B256::ZERO && proof.code_hash != EMPTY_CODE_HASH
    }

    fn storage_value(proof: &EthStorageProof) -> B256 {
        B256::from(proof.value.to_be_bytes::<32>())
    }

    fn encode_account_proof(proof: &EthAccountProof) -> Bytes {
        Bytes::from(proof.nodes.abi_encode())
    }

    fn encode_storage_proof(proof: &EthStorageProof) -> Bytes {
        Bytes::from(proof.nodes.abi_encode())
    }
}

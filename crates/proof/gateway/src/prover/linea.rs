//! Linea sparse Merkle proofs via `linea_getProof`.

use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::SolValue;
use async_trait::async_trait;

use super::{FetchedProofs, ProofScheme};
use crate::{
    EMPTY_CODE_HASH, LINEA_KECCAK_CODE_HASH_RANGE,
    rpc::{L2Client, LineaMerkleProof, LineaProof, RpcResult},
};

/// The Linea sparse Merkle proof scheme.
///
/// Account and storage proofs share one shape: an existence proof of the leaf,
/// or a non-existence proof by its two neighbouring leaves.
#[derive(Debug)]
pub struct LineaScheme<L2> {
    l2_client: Arc<L2>,
}

impl<L2> LineaScheme<L2> {
    /// Creates the scheme on an L2 client.
    pub const fn new(l2_client: Arc<L2>) -> Self {
        Self { l2_client }
    }
}

fn leaf(leaf_index: u64, proof: &LineaMerkleProof) -> (U256, Bytes, Vec<Bytes>) {
    (U256::from(leaf_index), proof.value.clone(), proof.proof_related_nodes.clone())
}

fn encode(proof: &LineaProof) -> Bytes {
    let leaves = match proof {
        LineaProof::Existence(p) => vec![leaf(p.leaf_index, &p.proof)],
        LineaProof::NonExistence(p) => {
            vec![leaf(p.left_leaf_index, &p.left_proof), leaf(p.right_leaf_index, &p.right_proof)]
        }
    };
    Bytes::from(leaves.abi_encode())
}

#[async_trait]
impl<L2: L2Client + 'static> ProofScheme for LineaScheme<L2> {
    type AccountProof = LineaProof;
    type StorageProof = LineaProof;

    const NAME: &'static str = "linea";

    async fn request_proofs(
        &self,
        target: Address,
        slots: &[U256],
        block_number: u64,
    ) -> RpcResult<FetchedProofs<LineaProof, LineaProof>> {
        let keys = slots.iter().map(|slot| B256::from(slot.to_be_bytes::<32>())).collect();
        let response = self.l2_client.linea_get_proof(target, keys, block_number).await?;
        Ok(FetchedProofs { account_proof: response.account_proof, storage_proofs: response.storage_proofs })
    }

    fn is_contract(proof: &LineaProof) -> bool {
        proof
            .value()
            .and_then(|value| value.get(LINEA_KECCAK_CODE_HASH_RANGE))
            .is_some_and(|code_hash| code_hash != EMPTY_CODE_HASH.as_slice())
    }

    fn storage_value(proof: &LineaProof) -> B256 {
        match proof.value() {
            Some(value) if value.len() >= 32 => B256::from_slice(&value[..32]),
            Some(value) => B256::left_padding_from(value),
            None => B256::ZERO,
        }
    }

    fn encode_account_proof(proof: &LineaProof) -> Bytes {
        encode(proof)
    }

    fn encode_storage_proof(proof: &LineaProof) -> Bytes {
        encode(proof)
    }
}

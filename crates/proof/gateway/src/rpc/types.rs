//! Custom RPC response types.

use alloy_primitives::{B256, Bytes};
use alloy_rpc_types_eth::Header;
use serde::{Deserialize, Serialize};

/// The subset of an L2 block header a commit binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRef {
    /// Block hash.
    pub hash: B256,
    /// Block number.
    pub number: u64,
    /// Parent block hash.
    pub parent_hash: B256,
    /// State trie root.
    pub state_root: B256,
    /// Block timestamp.
    pub timestamp: u64,
}

impl From<&Header> for BlockRef {
    fn from(header: &Header) -> Self {
        Self {
            hash: header.hash,
            number: header.inner.number,
            parent_hash: header.inner.parent_hash,
            state_root: header.inner.state_root,
            timestamp: header.inner.timestamp,
        }
    }
}

/// A sparse Merkle path to one leaf of a Linea trie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineaMerkleProof {
    /// Encoded leaf value.
    pub value: Bytes,
    /// Sibling nodes from leaf to root.
    pub proof_related_nodes: Vec<Bytes>,
}

/// Proof that a key is present in a Linea trie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineaExistenceProof {
    /// Index of the leaf holding the key.
    pub leaf_index: u64,
    /// Path to the leaf.
    pub proof: LineaMerkleProof,
}

/// Proof that a key is absent, given by the two adjacent leaves bracketing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineaNonExistenceProof {
    /// Index of the leaf immediately below the key.
    pub left_leaf_index: u64,
    /// Path to the left leaf.
    pub left_proof: LineaMerkleProof,
    /// Index of the leaf immediately above the key.
    pub right_leaf_index: u64,
    /// Path to the right leaf.
    pub right_proof: LineaMerkleProof,
}

/// A Linea sparse Merkle proof, as returned by `linea_getProof`.
///
/// The two shapes are told apart by the presence of `leafIndex`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LineaProof {
    /// The key exists.
    Existence(LineaExistenceProof),
    /// The key does not exist.
    NonExistence(LineaNonExistenceProof),
}

impl LineaProof {
    /// Returns the proven leaf value, or `None` for a non-existence proof.
    pub fn value(&self) -> Option<&Bytes> {
        match self {
            Self::Existence(proof) => Some(&proof.proof.value),
            Self::NonExistence(_) => None,
        }
    }
}

/// Response of `linea_getProof`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineaProofResponse {
    /// Proof of the account leaf.
    pub account_proof: LineaProof,
    /// Proofs of the requested storage slots, in request order.
    #[serde(default)]
    pub storage_proofs: Vec<LineaProof>,
}

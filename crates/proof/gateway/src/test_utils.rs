//! Shared test utilities: in-memory L1 contracts and an L2 that serves deterministic proofs.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use alloy_eips::BlockNumberOrTag;
use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_rpc_types_eth::EIP1186AccountProofResponse;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use crate::{
    ContractError, L2_TO_L1_MESSAGE_PASSER, LINEA_KECCAK_CODE_HASH_RANGE,
    contracts::{L2Output, LineaRollupClient, OutputOracleClient, SyncedBlock, TaikoClient},
    rollup::output_root_v0,
    rpc::{
        BlockRef, L2Client, LineaExistenceProof, LineaMerkleProof, LineaNonExistenceProof, LineaProof,
        LineaProofResponse, RpcError, RpcResult,
    },
};

/// Current unix time in seconds.
pub(crate) fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

/// Mock L2 with a fixed head, configurable accounts, and proof call accounting.
///
/// Blocks are derived from their number. Proof nodes are derived from the
/// proven data, so equal facts yield equal proofs.
#[derive(Debug, Default)]
pub(crate) struct MockL2 {
    latest: u64,
    code_hashes: HashMap<Address, B256>,
    storage: HashMap<(Address, U256), B256>,
    proof_calls: AtomicUsize,
    failures: AtomicUsize,
    requested: Mutex<Vec<U256>>,
}

impl MockL2 {
    pub(crate) fn new(latest: u64) -> Self {
        Self { latest, ..Default::default() }
    }

    pub(crate) fn set_code_hash(&mut self, address: Address, code_hash: B256) {
        self.code_hashes.insert(address, code_hash);
    }

    pub(crate) fn set_storage(&mut self, address: Address, slot: U256, value: B256) {
        self.storage.insert((address, slot), value);
    }

    /// Number of proof requests received, failed ones included.
    pub(crate) fn proof_calls(&self) -> usize {
        self.proof_calls.load(Ordering::SeqCst)
    }

    /// Every storage key requested so far, in request order.
    pub(crate) fn requested_slots(&self) -> Vec<u64> {
        self.requested.lock().iter().map(|slot| u64::try_from(*slot).unwrap_or(u64::MAX)).collect()
    }

    /// Makes the next `n` proof requests fail with a connection error.
    pub(crate) fn fail_next_proofs(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub(crate) fn block(&self, number: u64) -> BlockRef {
        BlockRef {
            hash: keccak256(number.to_be_bytes()),
            number,
            parent_hash: number.checked_sub(1).map_or(B256::ZERO, |parent| keccak256(parent.to_be_bytes())),
            state_root: keccak256([b"state".as_slice(), &number.to_be_bytes()].concat()),
            timestamp: number * 2,
        }
    }

    pub(crate) fn storage_root(&self, address: Address) -> B256 {
        keccak256(address)
    }

    /// Output root of `number` as an output oracle would record it.
    pub(crate) fn output_root(&self, number: u64) -> B256 {
        let block = self.block(number);
        output_root_v0(block.state_root, self.storage_root(L2_TO_L1_MESSAGE_PASSER), block.hash)
    }

    fn value(&self, address: Address, slot: U256) -> Option<B256> {
        self.storage.get(&(address, slot)).copied()
    }

    async fn begin_proof(&self, keys: &[B256], block_number: u64) -> RpcResult<()> {
        self.proof_calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().extend(keys.iter().map(|key| U256::from_be_bytes(key.0)));
        // Stay in flight for one poll so concurrent callers join this request.
        tokio::task::yield_now().await;
        if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
            return Err(RpcError::Connection("mock: injected failure".into()));
        }
        if block_number > self.latest {
            return Err(RpcError::BlockNotFound(block_number.to_string()));
        }
        Ok(())
    }
}

fn merkle(value: Bytes, node: B256) -> LineaMerkleProof {
    LineaMerkleProof { value, proof_related_nodes: vec![Bytes::copy_from_slice(node.as_slice())] }
}

fn linea_absent(key: B256) -> LineaProof {
    LineaProof::NonExistence(LineaNonExistenceProof {
        left_leaf_index: 0,
        left_proof: merkle(Bytes::new(), keccak256([b"left".as_slice(), key.as_slice()].concat())),
        right_leaf_index: 1,
        right_proof: merkle(Bytes::new(), keccak256([b"right".as_slice(), key.as_slice()].concat())),
    })
}

fn linea_present(leaf_index: u64, value: Bytes) -> LineaProof {
    let node = keccak256(&value);
    LineaProof::Existence(LineaExistenceProof { leaf_index, proof: merkle(value, node) })
}

#[async_trait]
impl L2Client for MockL2 {
    async fn get_proof(
        &self,
        address: Address,
        keys: Vec<B256>,
        block_number: u64,
    ) -> RpcResult<EIP1186AccountProofResponse> {
        self.begin_proof(&keys, block_number).await?;

        let code_hash = self.code_hashes.get(&address).copied().unwrap_or_default();
        let account_node = keccak256([address.as_slice(), code_hash.as_slice()].concat());
        let storage_proof: Vec<_> = keys
            .iter()
            .map(|key| {
                let value = self.value(address, U256::from_be_bytes(key.0)).unwrap_or_default();
                json!({
                    "key": key,
                    "value": U256::from_be_bytes(value.0),
                    "proof": [Bytes::from([key.as_slice(), value.as_slice()].concat())],
                })
            })
            .collect();

        Ok(serde_json::from_value(json!({
            "address": address,
            "balance": "0x0",
            "codeHash": code_hash,
            "nonce": "0x0",
            "storageHash": self.storage_root(address),
            "accountProof": [Bytes::copy_from_slice(account_node.as_slice())],
            "storageProof": storage_proof,
        }))?)
    }

    async fn linea_get_proof(
        &self,
        address: Address,
        keys: Vec<B256>,
        block_number: u64,
    ) -> RpcResult<LineaProofResponse> {
        self.begin_proof(&keys, block_number).await?;

        let Some(code_hash) = self.code_hashes.get(&address) else {
            return Ok(LineaProofResponse {
                account_proof: linea_absent(keccak256(address)),
                storage_proofs: Vec::new(),
            });
        };

        let mut leaf = vec![0u8; 192];
        leaf[LINEA_KECCAK_CODE_HASH_RANGE].copy_from_slice(code_hash.as_slice());
        let storage_proofs = keys
            .iter()
            .enumerate()
            .map(|(i, key)| match self.value(address, U256::from_be_bytes(key.0)) {
                Some(value) => linea_present(i as u64, Bytes::copy_from_slice(value.as_slice())),
                None => linea_absent(*key),
            })
            .collect();

        Ok(LineaProofResponse { account_proof: linea_present(7, Bytes::from(leaf)), storage_proofs })
    }

    async fn block_ref(&self, number: Option<u64>) -> RpcResult<BlockRef> {
        match number {
            None => Ok(self.block(self.latest)),
            Some(number) if number <= self.latest => Ok(self.block(number)),
            Some(number) => Err(RpcError::BlockNotFound(number.to_string())),
        }
    }
}

/// Mock `L2OutputOracle` holding a mutable list of outputs.
#[derive(Debug)]
pub(crate) struct MockOracle {
    outputs: Mutex<Vec<L2Output>>,
    finalization_period: u64,
    submission_interval: u64,
    l2_block_time: u64,
}

impl MockOracle {
    pub(crate) fn new(
        outputs: Vec<L2Output>,
        finalization_period: u64,
        submission_interval: u64,
        l2_block_time: u64,
    ) -> Self {
        Self { outputs: Mutex::new(outputs), finalization_period, submission_interval, l2_block_time }
    }

    pub(crate) fn replace_root(&self, index: usize, output_root: B256) {
        self.outputs.lock()[index].output_root = output_root;
    }

    /// Deletes the output at `index` and every later one.
    pub(crate) fn delete_from(&self, index: usize) {
        self.outputs.lock().truncate(index);
    }
}

#[async_trait]
impl OutputOracleClient for MockOracle {
    async fn latest_output_index(&self) -> Result<u64, ContractError> {
        let len = self.outputs.lock().len() as u64;
        len.checked_sub(1)
            .ok_or(ContractError::Reverted { call: "latestOutputIndex", reason: "no outputs".into() })
    }

    async fn get_l2_output(&self, index: u64) -> Result<Option<L2Output>, ContractError> {
        Ok(self.outputs.lock().get(index as usize).copied())
    }

    async fn finalization_period_seconds(&self) -> Result<u64, ContractError> {
        Ok(self.finalization_period)
    }

    async fn submission_interval(&self) -> Result<u64, ContractError> {
        Ok(self.submission_interval)
    }

    async fn l2_block_time(&self) -> Result<u64, ContractError> {
        Ok(self.l2_block_time)
    }
}

/// Mock `TaikoL1` with a fixed sync interval and last synced block.
#[derive(Debug)]
pub(crate) struct MockTaiko {
    interval: u64,
    last_synced: u64,
}

impl MockTaiko {
    pub(crate) const fn new(interval: u64, last_synced: u64) -> Self {
        Self { interval, last_synced }
    }
}

#[async_trait]
impl TaikoClient for MockTaiko {
    async fn state_root_sync_interval(&self) -> Result<u64, ContractError> {
        Ok(self.interval)
    }

    async fn last_synced_block(&self, _: BlockNumberOrTag) -> Result<SyncedBlock, ContractError> {
        Ok(SyncedBlock {
            block_id: self.last_synced,
            block_hash: keccak256(self.last_synced.to_be_bytes()),
            state_root: B256::ZERO,
        })
    }
}

/// Mock `LineaRollup` with a list of finalized `(start, end)` block ranges.
///
/// Genesis and the end of every range hold a state root.
#[derive(Debug)]
pub(crate) struct MockLinea {
    current: u64,
    starts: HashMap<u64, u64>,
    roots: Mutex<HashMap<u64, B256>>,
}

impl MockLinea {
    pub(crate) fn new(finalizations: &[(u64, u64)]) -> Self {
        let root = |number: u64| keccak256([b"root".as_slice(), &number.to_be_bytes()].concat());
        let mut roots = HashMap::from([(0, root(0))]);
        let mut starts = HashMap::new();
        for &(start, end) in finalizations {
            starts.insert(end, start);
            roots.insert(end, root(end));
        }
        let current = finalizations.last().map_or(0, |&(_, end)| end);
        Self { current, starts, roots: Mutex::new(roots) }
    }

    pub(crate) fn set_state_root(&self, number: u64, root: B256) {
        self.roots.lock().insert(number, root);
    }
}

#[async_trait]
impl LineaRollupClient for MockLinea {
    async fn current_l2_block_number(&self, _: BlockNumberOrTag) -> Result<u64, ContractError> {
        Ok(self.current)
    }

    async fn state_root_hash(&self, l2_block_number: u64) -> Result<B256, ContractError> {
        Ok(self.roots.lock().get(&l2_block_number).copied().unwrap_or_default())
    }

    async fn finalization_start(&self, end_block_number: u64) -> Result<Option<u64>, ContractError> {
        Ok(self.starts.get(&end_block_number).copied())
    }
}

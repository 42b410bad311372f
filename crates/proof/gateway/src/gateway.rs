//! Request orchestration: commit selection, proving, and witness encoding.

use std::{fmt, sync::Arc, time::Duration};

use alloy_primitives::{Address, Bytes, U256};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    GatewayConfig, GatewayError, GatewayResult,
    metrics as gateway_metrics,
    rollup::{Rollup, RollupCommit},
    witness::{NeedsBuilder, ProofSequence, prove_needs},
};

/// One fact a request asks to be proven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Need {
    /// The account proof of `target`.
    Account {
        /// The account.
        target: Address,
    },
    /// The value of `slot` in `target`.
    Slot {
        /// The account.
        target: Address,
        /// The storage slot.
        slot: U256,
    },
}

/// A request for a witness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    /// Facts to prove, in the order the verifier consumes them.
    pub needs: Vec<Need>,
    /// Commit to prove against. The latest commit when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_index: Option<u64>,
}

/// A witness and the commit it is anchored to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    /// Encoded witness for the on-chain verifier.
    pub witness: Bytes,
    /// Index of the commit the proofs are anchored to.
    pub commit_index: u64,
    /// L2 block the proofs were taken at.
    pub block_number: u64,
}

/// Answers witness requests for one rollup.
///
/// Commits are cached and shared between requests. A cached commit is checked
/// against L1 every time it is reused and dropped once it no longer stands.
pub struct Gateway<R: Rollup> {
    rollup: Arc<R>,
    config: GatewayConfig,
    commits: Cache<u64, Arc<R::Commit>>,
    latest_index: Cache<(), u64>,
}

impl<R: Rollup> fmt::Debug for Gateway<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("rollup", &R::NAME)
            .field("config", &self.config)
            .field("cached_commits", &self.commits.entry_count())
            .finish_non_exhaustive()
    }
}

fn unshare(err: Arc<GatewayError>) -> GatewayError {
    Arc::try_unwrap(err).unwrap_or_else(|shared| (*shared).clone())
}

impl<R: Rollup> Gateway<R> {
    /// Creates a gateway for `rollup`.
    pub fn new(rollup: R, config: GatewayConfig) -> GatewayResult<Self> {
        config.validate()?;
        Ok(Self {
            rollup: Arc::new(rollup),
            commits: Cache::new(config.commit_cache_size),
            latest_index: Cache::builder()
                .max_capacity(1)
                .time_to_live(Duration::from_secs(config.latest_cache_sec))
                .build(),
            config,
        })
    }

    /// Returns the rollup.
    pub const fn rollup(&self) -> &Arc<R> {
        &self.rollup
    }

    /// Returns the gateway configuration.
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Returns the index of the newest admissible commit.
    pub async fn latest_commit_index(&self) -> GatewayResult<u64> {
        let rollup = Arc::clone(&self.rollup);
        self.latest_index
            .try_get_with((), async move { rollup.fetch_latest_commit_index().await })
            .await
            .map_err(unshare)
    }

    /// Returns the commit at `index`, fetching it or revalidating the cached one.
    pub async fn commit(&self, index: u64) -> GatewayResult<Arc<R::Commit>> {
        if let Some(commit) = self.commits.get(&index).await {
            if self.rollup.is_commit_still_valid(&commit).await? {
                return Ok(commit);
            }
            warn!(rollup = R::NAME, index, "Cached commit no longer valid, refetching");
            metrics::counter!(gateway_metrics::COMMITS_INVALIDATED_TOTAL, gateway_metrics::LABEL_ROLLUP => R::NAME)
                .increment(1);
            self.commits.invalidate(&index).await;
            self.latest_index.invalidate(&()).await;
        }

        let rollup = Arc::clone(&self.rollup);
        self.commits
            .try_get_with(index, async move { rollup.fetch_commit(index).await.map(Arc::new) })
            .await
            .map_err(unshare)
    }

    /// Returns the newest admissible commit.
    pub async fn latest_commit(&self) -> GatewayResult<Arc<R::Commit>> {
        let index = self.latest_commit_index().await?;
        let commit = self.commit(index).await;
        if commit.is_err() {
            self.latest_index.invalidate(&()).await;
        }
        commit
    }

    /// Returns the commit at `index` if it is at most `commit_depth` commits behind the latest.
    pub async fn recent_commit(&self, index: u64) -> GatewayResult<Arc<R::Commit>> {
        let mut commit = self.latest_commit().await?;
        if index > commit.index() {
            return Err(GatewayError::InvalidCommit {
                index,
                reason: format!("newer than latest commit {}", commit.index()),
            });
        }

        for _ in 0..self.config.commit_depth {
            if commit.index() <= index {
                break;
            }
            let parent = self
                .rollup
                .fetch_parent_commit_index(&commit)
                .await?
                .ok_or_else(|| GatewayError::NoParentCommit(commit.index()))?;
            commit = self.commit(parent).await?;
        }

        match commit.index() {
            found if found == index => Ok(commit),
            oldest if oldest > index => Err(GatewayError::CommitTooOld { index, oldest }),
            _ => Err(GatewayError::InvalidCommit { index, reason: "not a commit index".to_string() }),
        }
    }

    /// Proves the requested facts against a commit and encodes the witness.
    ///
    /// Any failure aborts the whole request.
    pub async fn handle_request(&self, request: GatewayRequest) -> GatewayResult<GatewayResponse> {
        let commit = match request.commit_index {
            Some(index) => self.recent_commit(index).await?,
            None => self.latest_commit().await?,
        };

        let mut builder = NeedsBuilder::new();
        for need in &request.needs {
            match *need {
                Need::Account { target } => {
                    builder.account(target);
                }
                Need::Slot { target, slot } => {
                    builder.slot(target, slot);
                }
            }
        }
        let (needs, order, arena) = builder.build();

        prove_needs(commit.prover(), &needs, &arena).await?;
        let proofs = ProofSequence::from_needs(&arena, &needs, &order)?;
        let witness = self.rollup.encode_witness(&commit, &proofs);

        debug!(
            rollup = R::NAME,
            commit = commit.index(),
            needs = order.len(),
            proofs = proofs.proofs.len(),
            "Encoded witness"
        );
        metrics::counter!(gateway_metrics::REQUESTS_TOTAL, gateway_metrics::LABEL_ROLLUP => R::NAME).increment(1);

        Ok(GatewayResponse { witness, commit_index: commit.index(), block_number: commit.block_number() })
    }
}

#[cfg(test)]
mod tests {
    use alloy_eips::BlockNumberOrTag;
    use alloy_primitives::{B256, keccak256};
    use alloy_sol_types::SolValue;

    use super::*;
    use crate::{
        EMPTY_CODE_HASH,
        config::{LineaConfig, TaikoConfig},
        prover::{EthScheme, ProofScheme},
        rollup::{LineaRollup, RollupBase, TaikoRollup},
        test_utils::{MockL2, MockLinea, MockTaiko},
    };

    const CONTRACT: Address = Address::repeat_byte(0xc0);
    const EOA: Address = Address::repeat_byte(0xe0);
    const NAMES_SLOT: u64 = 1;
    const KEY_SLOT: u64 = 2;

    type TaikoWitness = (U256, B256, Vec<Bytes>, Bytes);

    /// Slot of `names[key]` for a `mapping(string => string)` at `NAMES_SLOT`.
    fn names_slot(key: &str) -> U256 {
        let preimage = [key.as_bytes(), &U256::from(NAMES_SLOT).to_be_bytes::<32>()].concat();
        U256::from_be_bytes(keccak256(preimage).0)
    }

    /// Storage word of a string shorter than 32 bytes.
    fn short_string(value: &str) -> B256 {
        let mut word = [0u8; 32];
        word[..value.len()].copy_from_slice(value.as_bytes());
        word[31] = (value.len() * 2) as u8;
        B256::from(word)
    }

    fn decode_short_string(word: B256) -> String {
        let len = (word[31] / 2) as usize;
        String::from_utf8(word[..len].to_vec()).unwrap()
    }

    fn l2() -> Arc<MockL2> {
        let mut l2 = MockL2::new(1_000);
        l2.set_code_hash(CONTRACT, keccak256(b"code"));
        l2.set_code_hash(EOA, EMPTY_CODE_HASH);
        l2.set_storage(CONTRACT, U256::ZERO, B256::from(U256::from(42)));
        l2.set_storage(CONTRACT, U256::from(KEY_SLOT), short_string("raffy"));
        l2.set_storage(CONTRACT, names_slot("raffy"), short_string("Vitalik Buterin"));
        Arc::new(l2)
    }

    async fn taiko_gateway(l2: &Arc<MockL2>) -> Gateway<TaikoRollup<MockTaiko, MockL2>> {
        let base = RollupBase::new(Arc::new(MockTaiko::new(1, 100)), Arc::clone(l2));
        let config = TaikoConfig { taiko_l1: Address::repeat_byte(1), commit_batch_span: 1 };
        let rollup = TaikoRollup::create(base, config).await.unwrap();
        Gateway::new(rollup, GatewayConfig::default()).unwrap()
    }

    fn request(needs: Vec<Need>) -> GatewayRequest {
        GatewayRequest { needs, commit_index: None }
    }

    #[tokio::test]
    async fn test_storage_value() {
        let l2 = l2();
        let gateway = taiko_gateway(&l2).await;

        let response = gateway.handle_request(request(vec![Need::Slot { target: CONTRACT, slot: U256::ZERO }])).await.unwrap();
        assert_eq!(response.commit_index, 100);
        assert_eq!(response.block_number, 100);

        let (index, parent_hash, proofs, order) = TaikoWitness::abi_decode_params(&response.witness).unwrap();
        assert_eq!(index, U256::from(100));
        assert_eq!(parent_hash, l2.block(100).parent_hash);
        assert_eq!(l2.requested_slots(), vec![0]);

        // The account proof precedes the storage proof it anchors.
        let commit = gateway.latest_commit().await.unwrap();
        let cached = commit.prover().get_proofs(CONTRACT, &[U256::ZERO]).await.unwrap();
        assert_eq!(proofs.len(), 2);
        assert_eq!(proofs[0], EthScheme::<MockL2>::encode_account_proof(&cached.account_proof));
        assert_eq!(proofs[1], EthScheme::<MockL2>::encode_storage_proof(&cached.storage_proofs[0]));
        assert_eq!(order, Bytes::from(vec![0, 1]));

        assert_eq!(commit.prover().get_storage(CONTRACT, U256::ZERO).await.unwrap(), B256::from(U256::from(42)));
        assert_eq!(l2.proof_calls(), 1);
    }

    #[tokio::test]
    async fn test_mapping_value_with_shared_account_proof() {
        let l2 = l2();
        let gateway = taiko_gateway(&l2).await;
        let commit = gateway.latest_commit().await.unwrap();

        // The mapping key is itself read from storage.
        let key = decode_short_string(commit.prover().get_storage(CONTRACT, U256::from(KEY_SLOT)).await.unwrap());
        assert_eq!(key, "raffy");
        let slot = names_slot(&key);

        let needs = vec![
            Need::Account { target: CONTRACT },
            Need::Slot { target: CONTRACT, slot: U256::from(KEY_SLOT) },
            Need::Account { target: CONTRACT },
            Need::Slot { target: CONTRACT, slot },
        ];
        let response = gateway.handle_request(request(needs)).await.unwrap();
        let (_, _, proofs, order) = TaikoWitness::abi_decode_params(&response.witness).unwrap();
        assert_eq!(proofs.len(), 3);
        assert_eq!(order, Bytes::from(vec![0, 1, 0, 2]));

        let word = commit.prover().get_storage(CONTRACT, slot).await.unwrap();
        assert_eq!(decode_short_string(word), "Vitalik Buterin");

        // The key read fetched the account, the request only fetched the mapping slot.
        assert_eq!(l2.proof_calls(), 2);
        let requested = l2.requested_slots();
        assert_eq!(requested.len(), 2);
        assert_eq!(requested[0], KEY_SLOT);
        assert_eq!(commit.prover().cache().pending_len(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_fetches() {
        let l2 = l2();
        let gateway = taiko_gateway(&l2).await;
        let needs = vec![Need::Slot { target: CONTRACT, slot: U256::ZERO }];

        let (a, b) = tokio::join!(gateway.handle_request(request(needs.clone())), gateway.handle_request(request(needs)));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(l2.proof_calls(), 1);
    }

    #[tokio::test]
    async fn test_non_contract_is_proved_absent() {
        let l2 = l2();
        let gateway = taiko_gateway(&l2).await;

        let needs = vec![Need::Account { target: EOA }, Need::Slot { target: EOA, slot: U256::from(1) }];
        let response = gateway.handle_request(request(needs)).await.unwrap();
        let (_, _, proofs, order) = TaikoWitness::abi_decode_params(&response.witness).unwrap();
        assert_eq!(proofs.len(), 2);
        assert_eq!(proofs[1], Bytes::new());
        assert_eq!(order, Bytes::from(vec![0, 1]));

        let commit = gateway.latest_commit().await.unwrap();
        assert_eq!(commit.prover().get_storage(EOA, U256::from(1)).await.unwrap(), B256::ZERO);
        assert!(!commit.prover().is_contract(EOA).await.unwrap());
        assert_eq!(l2.proof_calls(), 1);
    }

    #[tokio::test]
    async fn test_commit_depth() {
        let l2 = l2();
        let gateway = taiko_gateway(&l2).await;
        let at = |index| GatewayRequest { needs: vec![Need::Account { target: CONTRACT }], commit_index: Some(index) };

        assert_eq!(gateway.handle_request(at(97)).await.unwrap().commit_index, 97);
        assert!(matches!(
            gateway.handle_request(at(96)).await,
            Err(GatewayError::CommitTooOld { index: 96, oldest: 97 })
        ));
        assert!(matches!(gateway.handle_request(at(101)).await, Err(GatewayError::InvalidCommit { index: 101, .. })));
    }

    #[tokio::test]
    async fn test_replaced_commit_is_refetched() {
        let l2 = l2();
        let linea = Arc::new(MockLinea::new(&[(1, 10), (11, 40)]));
        let gateway_config = GatewayConfig { unfinalized: true, ..Default::default() };
        let base = RollupBase::from_config(Arc::clone(&linea), Arc::clone(&l2), &gateway_config);
        assert_eq!(base.latest_block_tag, BlockNumberOrTag::Latest);
        let config = LineaConfig { l1_message_service: Address::repeat_byte(1), log_scan_range: 100 };
        let gateway = Gateway::new(LineaRollup::new(base, &config).unwrap(), gateway_config).unwrap();
        let needs = vec![Need::Slot { target: CONTRACT, slot: U256::ZERO }];

        let first = gateway.handle_request(request(needs.clone())).await.unwrap();
        assert_eq!(first.commit_index, 40);
        gateway.handle_request(request(needs.clone())).await.unwrap();
        assert_eq!(l2.proof_calls(), 1);

        linea.set_state_root(40, B256::repeat_byte(0xee));
        let third = gateway.handle_request(request(needs)).await.unwrap();
        assert_eq!(third.commit_index, 40);
        assert_eq!(l2.proof_calls(), 2);
        assert_eq!(gateway.latest_commit().await.unwrap().state_root(), B256::repeat_byte(0xee));
    }

    #[test]
    fn test_request_deserialize() {
        let json = r#"{
            "needs": [
                { "type": "account", "target": "0xc0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0" },
                { "type": "slot", "target": "0xc0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0", "slot": "0x1" }
            ],
            "commitIndex": 7
        }"#;
        let request: GatewayRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.commit_index, Some(7));
        assert_eq!(
            request.needs,
            vec![Need::Account { target: CONTRACT }, Need::Slot { target: CONTRACT, slot: U256::from(1) }]
        );

        let request: GatewayRequest = serde_json::from_str(r#"{ "needs": [] }"#).unwrap();
        assert_eq!(request.commit_index, None);
    }
}

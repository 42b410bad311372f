//! Block provers: account and storage proofs for one fixed L2 block.
//!
//! A [`BlockProver`] is generic over the trie [`ProofScheme`] of the L2. It owns a
//! [`ProofCache`] so repeated and concurrent requests for the same fact share a
//! single RPC call, and it exploits trie locality: an account that is not a
//! contract has no storage, so its slots are never fetched.

mod eth;
mod linea;

pub use eth::{EthAccountProof, EthScheme, EthStorageProof};
pub use linea::LineaScheme;

use std::{fmt, sync::Arc};

use alloy_primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use futures::future::{FutureExt, try_join_all};
use tracing::debug;

use crate::{
    GatewayResult, ProverConfig,
    cache::{CacheEntry, Deferred, PendingProof, ProofCache, Reservation},
    metrics as gateway_metrics,
    rpc::{RpcError, RpcResult},
    witness::{ProofArena, TargetNeed},
};

/// Prover for chains using Ethereum Merkle-Patricia tries.
pub type EthProver<L2> = BlockProver<EthScheme<L2>>;

/// Prover for chains using Linea sparse Merkle tries.
pub type LineaProver<L2> = BlockProver<LineaScheme<L2>>;

/// Cache key of a proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProofKey {
    /// Proof of an account.
    Account(Address),
    /// Proof of one storage slot of an account.
    Storage(Address, U256),
}

/// An account proof with the storage proofs requested alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedProofs<A, S> {
    /// Proof of the account.
    pub account_proof: A,
    /// Proofs of the requested slots, in request order.
    pub storage_proofs: Vec<S>,
}

/// A trie scheme: how proofs are fetched, inspected, and encoded for the verifier.
#[async_trait]
pub trait ProofScheme: Send + Sync + 'static {
    /// Proof of an account leaf.
    type AccountProof: Clone + fmt::Debug + Send + Sync + 'static;
    /// Proof of a storage leaf.
    type StorageProof: Clone + fmt::Debug + Send + Sync + 'static;

    /// Scheme name used in cache names and metric labels.
    const NAME: &'static str;

    /// Fetches the proofs of `target` and `slots` at `block_number` in one RPC call.
    async fn request_proofs(
        &self,
        target: Address,
        slots: &[U256],
        block_number: u64,
    ) -> RpcResult<FetchedProofs<Self::AccountProof, Self::StorageProof>>;

    /// Returns true if the proven account has code.
    fn is_contract(proof: &Self::AccountProof) -> bool;

    /// Returns the proven slot value. Absent slots are zero.
    fn storage_value(proof: &Self::StorageProof) -> B256;

    /// Encodes an account proof for the verifier.
    fn encode_account_proof(proof: &Self::AccountProof) -> Bytes;

    /// Encodes a storage proof for the verifier.
    fn encode_storage_proof(proof: &Self::StorageProof) -> Bytes;
}

/// Reads and proves storage at one block.
#[async_trait]
pub trait StorageProver: Send + Sync {
    /// Returns the block the prover is bound to.
    fn block_number(&self) -> u64;

    /// Returns the value of `slot` in `target`.
    async fn get_storage(&self, target: Address, slot: U256) -> GatewayResult<B256>;

    /// Returns true if `target` has code.
    async fn is_contract(&self, target: Address) -> GatewayResult<bool>;

    /// Fills the account ref and slot refs of `need` in `arena`.
    ///
    /// Slot refs of a non-contract are left unfilled: the account proof already
    /// proves them empty.
    async fn prove_need(&self, need: &TargetNeed, arena: &ProofArena) -> GatewayResult<()>;
}

/// A cached proof.
#[derive(Debug, Clone)]
pub enum CachedProof<A, S> {
    /// Account proof.
    Account(A),
    /// Storage proof.
    Storage(S),
}

type Fetched<S> = FetchedProofs<<S as ProofScheme>::AccountProof, <S as ProofScheme>::StorageProof>;
type Cached<S> = CachedProof<<S as ProofScheme>::AccountProof, <S as ProofScheme>::StorageProof>;

fn into_account<S: ProofScheme>(proof: Cached<S>) -> RpcResult<S::AccountProof> {
    match proof {
        CachedProof::Account(proof) => Ok(proof),
        CachedProof::Storage(_) => Err(RpcError::InvalidResponse("expected an account proof".into())),
    }
}

fn into_storage<S: ProofScheme>(proof: Cached<S>) -> RpcResult<S::StorageProof> {
    match proof {
        CachedProof::Storage(proof) => Ok(proof),
        CachedProof::Account(_) => Err(RpcError::InvalidResponse("expected a storage proof".into())),
    }
}

/// A slot of a `get_proofs` call: cached (possibly pending) or fetched by this call.
enum SlotSource<V: Clone> {
    Cached(CacheEntry<V>),
    Missing(usize),
}

/// Proves account and storage facts at a fixed block.
pub struct BlockProver<S: ProofScheme> {
    scheme: S,
    block_number: u64,
    proof_batch_size: usize,
    cache: ProofCache<ProofKey, Cached<S>>,
}

impl<S: ProofScheme> fmt::Debug for BlockProver<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockProver")
            .field("scheme", &S::NAME)
            .field("block_number", &self.block_number)
            .field("proof_batch_size", &self.proof_batch_size)
            .field("cache", &self.cache)
            .finish()
    }
}

impl<S: ProofScheme> BlockProver<S> {
    /// Creates a prover for `block_number`.
    pub fn new(scheme: S, block_number: u64, config: ProverConfig) -> Self {
        Self {
            scheme,
            block_number,
            proof_batch_size: config.proof_batch_size.max(1),
            cache: ProofCache::new(format!("{}_proofs", S::NAME), config.cache_size),
        }
    }

    /// Returns the block the prover is bound to.
    pub const fn block_number(&self) -> u64 {
        self.block_number
    }

    /// Returns the proof cache.
    pub const fn cache(&self) -> &ProofCache<ProofKey, Cached<S>> {
        &self.cache
    }

    /// Returns the account proof of `target` if it is cached and resolved, without
    /// refreshing recency.
    fn peek_account(&self, target: Address) -> Option<S::AccountProof> {
        match self.cache.peek(&ProofKey::Account(target)) {
            Some(CacheEntry::Resolved(CachedProof::Account(proof))) => Some(proof),
            _ => None,
        }
    }

    /// Returns the value of `slot` in `target`.
    pub async fn get_storage(&self, target: Address, slot: U256) -> RpcResult<B256> {
        if let Some(CacheEntry::Resolved(CachedProof::Account(account))) =
            self.cache.touch(&ProofKey::Account(target))
            && !S::is_contract(&account)
        {
            return Ok(B256::ZERO);
        }
        if let Some(CacheEntry::Resolved(CachedProof::Storage(proof))) =
            self.cache.touch(&ProofKey::Storage(target, slot))
        {
            return Ok(S::storage_value(&proof));
        }

        let proofs = self.get_proofs(target, &[slot]).await?;
        Ok(proofs.storage_proofs.first().map_or(B256::ZERO, S::storage_value))
    }

    /// Returns true if `target` has code.
    pub async fn is_contract(&self, target: Address) -> RpcResult<bool> {
        let proofs = self.get_proofs(target, &[]).await?;
        Ok(S::is_contract(&proofs.account_proof))
    }

    /// Fills the account ref and slot refs of `need` in `arena`.
    pub async fn prove_need(&self, need: &TargetNeed, arena: &ProofArena) -> GatewayResult<()> {
        let mut slots = need.slots.as_slice();
        if self.peek_account(need.target).is_some_and(|account| !S::is_contract(&account)) {
            slots = &[];
        }

        let keys: Vec<U256> = slots.iter().map(|(slot, _)| *slot).collect();
        let proofs = self.get_proofs(need.target, &keys).await?;

        arena.fill(need.account, S::encode_account_proof(&proofs.account_proof))?;
        for ((_, proof_ref), proof) in slots.iter().zip(&proofs.storage_proofs) {
            arena.fill(*proof_ref, S::encode_storage_proof(proof))?;
        }
        Ok(())
    }

    /// Returns the account proof of `target` and the storage proofs of `slots`.
    ///
    /// Cached proofs are reused and in-flight fetches are awaited. Everything else
    /// is reserved in the cache before any RPC call and fetched in one batch. If
    /// the account is not a contract the storage proofs are empty.
    pub async fn get_proofs(&self, target: Address, slots: &[U256]) -> RpcResult<Fetched<S>> {
        let (deferred, batch) = Deferred::<Arc<Fetched<S>>>::new();
        let mut reservation = Reservation::new(&self.cache);

        let account_key = ProofKey::Account(target);
        let account_entry = self.cache.touch_or_reserve(account_key, || account_pending::<S>(&batch));
        match &account_entry {
            None => reservation.push(account_key),
            Some(CacheEntry::Resolved(CachedProof::Account(account))) if !S::is_contract(account) => {
                return Ok(FetchedProofs { account_proof: account.clone(), storage_proofs: Vec::new() });
            }
            Some(_) => {}
        }

        let mut sources = Vec::with_capacity(slots.len());
        let mut missing = Vec::new();
        for &slot in slots {
            let key = ProofKey::Storage(target, slot);
            let pos = missing.len();
            match self.cache.touch_or_reserve(key, || storage_pending::<S>(&batch, pos)) {
                Some(entry) => sources.push(SlotSource::Cached(entry)),
                None => {
                    missing.push(slot);
                    reservation.push(key);
                    sources.push(SlotSource::Missing(pos));
                }
            }
        }

        let fetched = if account_entry.is_none() || !missing.is_empty() {
            debug!(
                %target,
                block = self.block_number,
                missing = missing.len(),
                cached = slots.len() - missing.len(),
                "Fetching proofs"
            );
            match self.fetch_proofs(target, &missing).await {
                Ok(fetched) => {
                    if account_entry.is_none() {
                        self.cache.resolve(account_key, CachedProof::Account(fetched.account_proof.clone()));
                    }
                    for (pos, slot) in missing.iter().enumerate() {
                        let key = ProofKey::Storage(target, *slot);
                        match fetched.storage_proofs.get(pos) {
                            Some(proof) => self.cache.resolve(key, CachedProof::Storage(proof.clone())),
                            None => self.cache.release(&key),
                        }
                    }
                    reservation.complete();
                    let fetched = Arc::new(fetched);
                    deferred.settle(Ok(Arc::clone(&fetched)));
                    Some(fetched)
                }
                Err(err) => {
                    debug!(%target, error = %err, "Proof fetch failed, releasing reserved keys");
                    drop(reservation);
                    deferred.settle(Err(err.clone()));
                    return Err(err);
                }
            }
        } else {
            None
        };

        let account_proof = match (&fetched, account_entry) {
            (Some(fetched), _) => fetched.account_proof.clone(),
            (None, Some(entry)) => into_account::<S>(entry.wait().await?)?,
            (None, None) => return Err(RpcError::ProofNotFound(format!("account {target}"))),
        };
        if !S::is_contract(&account_proof) {
            return Ok(FetchedProofs { account_proof, storage_proofs: Vec::new() });
        }

        let mut storage_proofs = Vec::with_capacity(sources.len());
        for (source, slot) in sources.into_iter().zip(slots) {
            let proof = match source {
                SlotSource::Cached(entry) => into_storage::<S>(entry.wait().await?)?,
                SlotSource::Missing(pos) => fetched
                    .as_ref()
                    .and_then(|fetched| fetched.storage_proofs.get(pos).cloned())
                    .ok_or_else(|| RpcError::ProofNotFound(format!("slot {slot} of {target}")))?,
            };
            storage_proofs.push(proof);
        }
        Ok(FetchedProofs { account_proof, storage_proofs })
    }

    /// Fetches proofs from the L2, splitting `slots` into concurrent batches of at
    /// most `proof_batch_size`. Storage proofs keep request order.
    pub async fn fetch_proofs(&self, target: Address, slots: &[U256]) -> RpcResult<Fetched<S>> {
        let requests: Vec<&[U256]> =
            if slots.is_empty() { vec![slots] } else { slots.chunks(self.proof_batch_size).collect() };

        metrics::counter!(gateway_metrics::PROOF_FETCHES_TOTAL, gateway_metrics::LABEL_SCHEME => S::NAME)
            .increment(requests.len() as u64);

        let responses = try_join_all(
            requests.into_iter().map(|chunk| self.scheme.request_proofs(target, chunk, self.block_number)),
        )
        .await?;

        let mut responses = responses.into_iter();
        let mut fetched = responses
            .next()
            .ok_or_else(|| RpcError::InvalidResponse("no proof response".into()))?;
        for response in responses {
            fetched.storage_proofs.extend(response.storage_proofs);
        }

        if fetched.storage_proofs.len() != slots.len() && S::is_contract(&fetched.account_proof) {
            return Err(RpcError::InvalidResponse(format!(
                "expected {} storage proofs for {target}, got {}",
                slots.len(),
                fetched.storage_proofs.len()
            )));
        }
        Ok(fetched)
    }
}

fn account_pending<S: ProofScheme>(batch: &PendingProof<Arc<Fetched<S>>>) -> PendingProof<Cached<S>> {
    batch
        .clone()
        .map(|result| result.map(|fetched| CachedProof::Account(fetched.account_proof.clone())))
        .boxed()
        .shared()
}

fn storage_pending<S: ProofScheme>(
    batch: &PendingProof<Arc<Fetched<S>>>,
    pos: usize,
) -> PendingProof<Cached<S>> {
    batch
        .clone()
        .map(move |result| {
            result.and_then(|fetched| {
                fetched
                    .storage_proofs
                    .get(pos)
                    .cloned()
                    .map(CachedProof::Storage)
                    .ok_or_else(|| RpcError::ProofNotFound(format!("storage proof {pos} missing from batch")))
            })
        })
        .boxed()
        .shared()
}

#[async_trait]
impl<S: ProofScheme> StorageProver for BlockProver<S> {
    fn block_number(&self) -> u64 {
        self.block_number
    }

    async fn get_storage(&self, target: Address, slot: U256) -> GatewayResult<B256> {
        Ok(Self::get_storage(self, target, slot).await?)
    }

    async fn is_contract(&self, target: Address) -> GatewayResult<bool> {
        Ok(Self::is_contract(self, target).await?)
    }

    async fn prove_need(&self, need: &TargetNeed, arena: &ProofArena) -> GatewayResult<()> {
        Self::prove_need(self, need, arena).await
    }
}

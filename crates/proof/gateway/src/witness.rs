//! Witness assembly: requested facts, the proof arena, and the proof sequence.
//!
//! A request is a list of facts (an account exists, a slot holds a value). Facts
//! that alias the same proof share one [`ProofRef`] into a write-once
//! [`ProofArena`]. Once every ref is filled, [`ProofSequence::from_refs`] emits
//! each distinct proof once plus one order byte per requested fact.

use std::{
    collections::{HashMap, HashSet, hash_map::Entry},
    sync::OnceLock,
};

use alloy_primitives::{Address, Bytes, U256};
use futures::future::try_join_all;

use crate::{GatewayError, GatewayResult, constants::MAX_WITNESS_PROOFS, prover::StorageProver};

/// Index of a proof slot in a [`ProofArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProofRef(usize);

impl ProofRef {
    /// Returns the arena index.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Write-once storage for encoded proofs.
#[derive(Debug, Default)]
pub struct ProofArena {
    slots: Vec<OnceLock<Bytes>>,
}

impl ProofArena {
    /// Allocates a new empty slot.
    pub fn alloc(&mut self) -> ProofRef {
        self.slots.push(OnceLock::new());
        ProofRef(self.slots.len() - 1)
    }

    /// Fills an empty slot. Filling a slot twice is an error.
    pub fn fill(&self, proof_ref: ProofRef, proof: Bytes) -> GatewayResult<()> {
        let slot = self.slot(proof_ref)?;
        slot.set(proof).map_err(|_| GatewayError::ProofAlreadyFilled(proof_ref.0))
    }

    /// Reads a filled slot.
    pub fn read(&self, proof_ref: ProofRef) -> GatewayResult<&Bytes> {
        self.get(proof_ref)?.ok_or(GatewayError::UnfilledProof(proof_ref.0))
    }

    /// Returns the proof in a slot, or `None` if it has not been filled.
    pub fn get(&self, proof_ref: ProofRef) -> GatewayResult<Option<&Bytes>> {
        Ok(self.slot(proof_ref)?.get())
    }

    /// Returns the number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the arena has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, proof_ref: ProofRef) -> GatewayResult<&OnceLock<Bytes>> {
        self.slots
            .get(proof_ref.0)
            .ok_or_else(|| GatewayError::Internal(format!("proof ref {} out of bounds", proof_ref.0)))
    }
}

/// Everything requested about one target account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetNeed {
    /// The account.
    pub target: Address,
    /// Where the account proof goes.
    pub account: ProofRef,
    /// Requested slots in first-request order, with where each storage proof goes.
    pub slots: Vec<(U256, ProofRef)>,
}

/// Collects requested facts, aliasing repeats onto a single [`ProofRef`].
#[derive(Debug, Default)]
pub struct NeedsBuilder {
    arena: ProofArena,
    targets: Vec<TargetNeed>,
    by_target: HashMap<Address, usize>,
    by_slot: HashMap<(Address, U256), ProofRef>,
    ordered_accounts: HashSet<Address>,
    order: Vec<ProofRef>,
}

impl NeedsBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    fn target(&mut self, target: Address) -> usize {
        match self.by_target.entry(target) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let account = self.arena.alloc();
                self.targets.push(TargetNeed { target, account, slots: Vec::new() });
                *entry.insert(self.targets.len() - 1)
            }
        }
    }

    /// Requests the account proof of `target`.
    pub fn account(&mut self, target: Address) -> ProofRef {
        let index = self.target(target);
        let proof_ref = self.targets[index].account;
        self.ordered_accounts.insert(target);
        self.order.push(proof_ref);
        proof_ref
    }

    /// Requests the storage proof of `slot` in `target`, along with its account proof.
    ///
    /// A storage proof is only checkable against an account proof that precedes
    /// it, so the first slot of a target whose account was not requested yet
    /// also orders the account proof.
    pub fn slot(&mut self, target: Address, slot: U256) -> ProofRef {
        let index = self.target(target);
        if self.ordered_accounts.insert(target) {
            self.order.push(self.targets[index].account);
        }
        let proof_ref = match self.by_slot.entry((target, slot)) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let proof_ref = self.arena.alloc();
                self.targets[index].slots.push((slot, proof_ref));
                *entry.insert(proof_ref)
            }
        };
        self.order.push(proof_ref);
        proof_ref
    }

    /// Returns the number of ordered proofs, repeats and implied account proofs included.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if nothing was requested.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns the per-target needs, the request order, and the arena to fill.
    pub fn build(self) -> (Vec<TargetNeed>, Vec<ProofRef>, ProofArena) {
        (self.targets, self.order, self.arena)
    }
}

/// Proves every target concurrently, filling `arena`.
pub async fn prove_needs<P>(prover: &P, needs: &[TargetNeed], arena: &ProofArena) -> GatewayResult<()>
where
    P: StorageProver + ?Sized,
{
    try_join_all(needs.iter().map(|need| prover.prove_need(need, arena))).await?;
    Ok(())
}

/// Distinct proofs plus the order in which requested facts use them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProofSequence {
    /// Distinct proofs in first-use order.
    pub proofs: Vec<Bytes>,
    /// One byte per requested fact: the index of its proof in `proofs`.
    pub order: Bytes,
}

impl ProofSequence {
    /// Builds the sequence for `order` from a filled arena.
    ///
    /// A storage ref left unfilled was proved absent by its account proof and
    /// encodes as the empty proof. Account refs must be filled.
    pub fn from_refs(arena: &ProofArena, order: &[ProofRef], accounts: &[ProofRef]) -> GatewayResult<Self> {
        let mut proofs: Vec<Bytes> = Vec::new();
        let mut index_of: HashMap<Bytes, u8> = HashMap::new();
        let mut indices = Vec::with_capacity(order.len());
        let empty = Bytes::new();

        for &proof_ref in order {
            let proof = match arena.get(proof_ref)? {
                Some(proof) => proof,
                None if accounts.contains(&proof_ref) => {
                    return Err(GatewayError::UnfilledProof(proof_ref.0));
                }
                None => &empty,
            };

            let index = match index_of.get(proof) {
                Some(&index) => index,
                None => {
                    if proofs.len() == MAX_WITNESS_PROOFS {
                        return Err(GatewayError::TooManyProofs(proofs.len() + 1));
                    }
                    let index = proofs.len() as u8;
                    proofs.push(proof.clone());
                    index_of.insert(proof.clone(), index);
                    index
                }
            };
            indices.push(index);
        }

        Ok(Self { proofs, order: Bytes::from(indices) })
    }

    /// Builds the sequence for the needs of a [`NeedsBuilder`].
    pub fn from_needs(arena: &ProofArena, needs: &[TargetNeed], order: &[ProofRef]) -> GatewayResult<Self> {
        let accounts: Vec<ProofRef> = needs.iter().map(|need| need.account).collect();
        Self::from_refs(arena, order, &accounts)
    }
}

//! The accumulated election state, owned exclusively by the validator.
//!
//! Everything here derives from validated blocks; nothing else writes to
//! it. Collections are ordered maps so that replaying the same chain
//! always produces identical results, whatever order the originals were
//! inserted in.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use num::traits::One;
use num::BigUint;
use serde::Serialize;

use crate::cancel::Cancel;
use crate::crypto::dlog::{DlogError, DlogLookup};
use crate::crypto::elgamal::{Ciphertext, Product, PublicKey};
use crate::crypto::threshold::ThresholdSystem;
use crate::errors::ValidationError;

use super::payload::{ElectionSetup, PayloadPartialTally};
use super::timing::PhaseWindows;

/// A registered voter: their signing key, and their last accepted ballot.
#[derive(Debug, Clone)]
pub struct VoterState {
    pub key: BigUint,
    pub vote: Option<Vec<Ciphertext>>,
}

/// One decoded candidate count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub candidate: String,
    pub count: u64,
}

/// The headline numbers an auditor reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElectionStats {
    pub num_voters: u64,
    pub voter_turnout: u64,
    pub num_repeat_votes: u64,
    pub tallies_submitted: usize,
    pub tallies_required: usize,
    /// Empty until enough partial decryptions are on the chain.
    pub results: Vec<Tally>,
}

pub struct ElectionState {
    setup: ElectionSetup,
    system: ThresholdSystem,
    windows: PhaseWindows,

    // lazily derived from the setup
    election_public_key: Option<PublicKey>,
    exponents: Option<BTreeMap<usize, Vec<BigUint>>>,

    pub(crate) trustee_shares: BTreeMap<usize, BTreeMap<usize, Ciphertext>>,
    pub(crate) trustee_public: BTreeMap<usize, PublicKey>,
    pub(crate) voters: BTreeMap<String, VoterState>,
    pub(crate) discarded_votes: u64,

    local_tallies: Option<Vec<Ciphertext>>,
    pub(crate) result_partials: BTreeMap<usize, PayloadPartialTally>,
    final_tallies: Option<Vec<Tally>>,
}

impl ElectionState {
    pub fn new(setup: ElectionSetup, windows: PhaseWindows) -> ElectionState {
        let system = ThresholdSystem::new(
            setup.params.clone(),
            setup.trustees_required,
            setup.trustees.len(),
        );
        ElectionState {
            setup,
            system,
            windows,
            election_public_key: None,
            exponents: None,
            trustee_shares: BTreeMap::new(),
            trustee_public: BTreeMap::new(),
            voters: BTreeMap::new(),
            discarded_votes: 0,
            local_tallies: None,
            result_partials: BTreeMap::new(),
            final_tallies: None,
        }
    }

    pub fn setup(&self) -> &ElectionSetup {
        &self.setup
    }

    pub fn system(&self) -> &ThresholdSystem {
        &self.system
    }

    pub fn num_trustees(&self) -> usize {
        self.setup.trustees.len()
    }

    pub fn num_candidates(&self) -> usize {
        self.setup.candidates.len()
    }

    /// The 1-based phase containing `t`, if any.
    pub fn phase_for(&self, t: DateTime<Utc>) -> Option<u8> {
        self.windows.phase_for(t)
    }

    /// The election public key: the product of every trustee's zero-index
    /// exponent commitment.
    pub fn election_public_key(&mut self) -> &PublicKey {
        if self.election_public_key.is_none() {
            let mut y = BigUint::one();
            for t in &self.setup.trustees {
                y = y * &t.exponents[0] % &self.setup.params.p;
            }
            self.election_public_key = Some(PublicKey { y });
        }
        self.election_public_key.as_ref().expect("just computed")
    }

    pub fn has_all_shares(&self) -> bool {
        self.trustee_shares.len() == self.num_trustees()
    }

    pub fn has_all_public(&self) -> bool {
        self.trustee_public.len() == self.num_trustees()
    }

    /// The encrypted share sent from trustee `sender` to `recipient`.
    pub fn encrypted_share(&self, sender: usize, recipient: usize) -> Option<&Ciphertext> {
        self.trustee_shares.get(&sender)?.get(&recipient)
    }

    pub fn shard_key(&self, index: usize) -> Option<&PublicKey> {
        self.trustee_public.get(&index)
    }

    /// Check a published shard key against the one recomputable from the
    /// on-chain exponent commitments of all trustees.
    pub fn validate_shard_key(
        &mut self,
        index: usize,
        published: &PublicKey,
    ) -> Result<(), ValidationError> {
        if self.exponents.is_none() {
            self.exponents = Some(
                self.setup
                    .trustees
                    .iter()
                    .map(|t| (t.index, t.exponents.clone()))
                    .collect(),
            );
        }
        let exponents = self.exponents.as_ref().expect("just computed");
        let expected = self.system.shard_public_key(index, exponents);
        if published.y != expected.y {
            return Err(ValidationError::ShardKeyMismatch { index });
        }
        Ok(())
    }

    /// The per-candidate homomorphic product over every voter's last
    /// ballot. Computed once, the first time a partial tally needs it;
    /// a candidate nobody voted for is the trivial encryption of zero.
    pub fn local_tallies(&mut self) -> &[Ciphertext] {
        if self.local_tallies.is_none() {
            let group = &self.system.group;
            let mut products: Vec<Product> = vec![Product::new(); self.setup.candidates.len()];
            for voter in self.voters.values() {
                if let Some(vote) = &voter.vote {
                    for (product, ct) in products.iter_mut().zip(vote) {
                        product.mul(group, ct);
                    }
                }
            }
            let identity = Ciphertext {
                a: BigUint::one(),
                b: BigUint::one(),
            };
            self.local_tallies = Some(
                products
                    .into_iter()
                    .map(|p| p.into_ciphertext().unwrap_or_else(|| identity.clone()))
                    .collect(),
            );
        }
        self.local_tallies.as_deref().expect("just computed")
    }

    pub fn add_partial_tally(&mut self, payload: PayloadPartialTally) {
        self.result_partials.insert(payload.index, payload);
    }

    fn count_votes(&self) -> (u64, u64) {
        let turnout = self.voters.values().filter(|v| v.vote.is_some()).count() as u64;
        (turnout, self.discarded_votes)
    }

    /// Reconstruct the final tallies once enough partials are in.
    ///
    /// Uses the first `trustees_required` submitted partials in trustee
    /// order; by invariant any qualifying subset gives the same answer.
    /// `max_votes` bounds the discrete log (the turnout, for a real run).
    fn combine_tallies(
        &mut self,
        max_votes: u64,
        cancel: &Cancel,
    ) -> Result<Option<&[Tally]>, DlogError> {
        if self.final_tallies.is_some() {
            return Ok(self.final_tallies.as_deref());
        }
        if self.result_partials.len() < self.setup.trustees_required {
            return Ok(None);
        }

        let subset: Vec<usize> = self
            .result_partials
            .keys()
            .copied()
            .take(self.setup.trustees_required)
            .collect();

        let candidates = self.setup.candidates.clone();
        self.local_tallies();
        let tallies = self.local_tallies.as_ref().expect("just computed");

        let mut exponentials = Vec::with_capacity(candidates.len());
        for (ci, ct) in tallies.iter().enumerate() {
            let factors: BTreeMap<usize, BigUint> = subset
                .iter()
                .map(|i| (*i, self.result_partials[i].decrypted[ci].clone()))
                .collect();
            exponentials.push(self.system.combine(ct, &factors));
        }

        let mut dlog = DlogLookup::new(&self.system.group, max_votes, &exponentials, cancel)?;
        let mut results = Vec::with_capacity(candidates.len());
        for (candidate, exp) in candidates.into_iter().zip(&exponentials) {
            results.push(Tally {
                candidate,
                count: dlog.resolve(exp, cancel)?,
            });
        }
        self.final_tallies = Some(results);
        Ok(self.final_tallies.as_deref())
    }

    /// The auditor's summary. Results stay empty until reconstructible.
    pub fn result(&mut self, cancel: &Cancel) -> Result<ElectionStats, DlogError> {
        let (turnout, repeats) = self.count_votes();
        let results = self
            .combine_tallies(turnout, cancel)?
            .map(|t| t.to_vec())
            .unwrap_or_default();
        Ok(ElectionStats {
            num_voters: self.voters.len() as u64,
            voter_turnout: turnout,
            num_repeat_votes: repeats,
            tallies_submitted: self.result_partials.len(),
            tallies_required: self.setup.trustees_required,
            results,
        })
    }
}

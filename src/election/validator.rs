//! The phase-indexed election validator.
//!
//! One instance owns the whole derived state for one election. Blocks
//! arrive in depth order from the chain; each is parsed, checked for
//! canonical encoding, dispatched by the phase containing its timestamp
//! and, only once every check has passed, folded into the state. A
//! failure leaves the state untouched and is fatal for the chain at that
//! position.

use chrono::Utc;
use tracing::debug;

use crate::block::{Block, BlockId};
use crate::cancel::Cancel;
use crate::chain::BlockValidator;
use crate::crypto::chaum_pedersen::disj::{verify_encryption, PlaintextOptionsCache};
use crate::crypto::chaum_pedersen::verify_partial_decryption;
use crate::crypto::dlog::DlogError;
use crate::crypto::elgamal::{Product, PublicKey};
use crate::election::payload::{
    ElectionSetup, PayloadCastVote, PayloadHint, PayloadPartialTally, PayloadTrusteePublic,
    PayloadTrusteeShares, PayloadVoterRegistration, DEFAULT_WORK_LEVEL, PROTOCOL_VERSION,
};
use crate::election::state::{ElectionState, ElectionStats, VoterState};
use crate::election::timing::epoch_to_instant;
use crate::errors::ValidationError;
use crate::serialize::canonical;

pub struct ElectionValidator {
    election_id: BlockId,
    /// When set, the genesis timestamp must not be in the future. Off for
    /// replaying a historical chain.
    realtime: bool,
    /// Skip signature and ZKP checks on voter registration and ballot
    /// blocks. For re-ingesting an already-verified chain; never changes
    /// what state is derived.
    pub loose_mode: bool,
    work_level: u32,
    options: Option<PlaintextOptionsCache>,
    state: Option<ElectionState>,
}

impl BlockValidator for ElectionValidator {
    fn validate(&mut self, block: &Block) -> Result<(), ValidationError> {
        let result = self.validate_inner(block);
        debug!(
            block = %block.header.id,
            depth = block.header.depth,
            ok = result.is_ok(),
            "block validation"
        );
        result
    }

    fn work_level(&self) -> u32 {
        self.work_level
    }
}

impl ElectionValidator {
    pub fn new(election_id: BlockId) -> ElectionValidator {
        ElectionValidator {
            election_id,
            realtime: false,
            loose_mode: false,
            work_level: DEFAULT_WORK_LEVEL,
            options: None,
            state: None,
        }
    }

    /// Validate live: reject a genesis block stamped in the future.
    pub fn realtime(mut self) -> ElectionValidator {
        self.realtime = true;
        self
    }

    pub fn election_id(&self) -> BlockId {
        self.election_id
    }

    pub fn state(&self) -> Option<&ElectionState> {
        self.state.as_ref()
    }

    pub fn state_mut(&mut self) -> Option<&mut ElectionState> {
        self.state.as_mut()
    }

    /// The current encrypted per-candidate tallies.
    pub fn local_tally(&mut self) -> Option<Vec<crate::crypto::elgamal::Ciphertext>> {
        self.state.as_mut().map(|s| s.local_tallies().to_vec())
    }

    pub fn election_public_key(&mut self) -> Option<PublicKey> {
        self.state.as_mut().map(|s| s.election_public_key().clone())
    }

    /// The auditor's summary of everything validated so far.
    pub fn result(&mut self, cancel: &Cancel) -> Result<ElectionStats, DlogError> {
        self.state
            .as_mut()
            .expect("no state before the genesis block")
            .result(cancel)
    }

    fn validate_inner(&mut self, block: &Block) -> Result<(), ValidationError> {
        if !block.check_payload_hash() {
            return Err(ValidationError::PayloadHashMismatch);
        }
        if self.state.is_none() {
            return self.check_genesis(block);
        }

        let t = epoch_to_instant(block.header.epoch_seconds);
        let state = self.state.as_ref().expect("checked above");
        match state.phase_for(t) {
            Some(1) => {
                // free order per trustee, but shares first as a group;
                // once both maps are full the window accepts nothing
                if !state.has_all_shares() {
                    self.check_trustee_shares(block)
                } else if !state.has_all_public() {
                    self.check_trustee_public(block)
                } else {
                    Err(ValidationError::PhaseExhausted)
                }
            }
            Some(2) => self.check_voter_registration(block),
            Some(3) => self.check_vote_cast(block),
            Some(4) => self.check_partial_tally(block),
            _ => Err(ValidationError::OutsidePhases),
        }
    }

    fn expect_hint(block: &Block, expected: PayloadHint) -> Result<(), ValidationError> {
        if block.header.payload_hint != expected as u8 {
            return Err(ValidationError::UnexpectedHint {
                expected: expected as u8,
                got: block.header.payload_hint,
            });
        }
        Ok(())
    }

    fn parse<T: serde::de::DeserializeOwned + serde::Serialize>(
        block: &Block,
    ) -> Result<T, ValidationError> {
        let value: T = serde_json::from_slice(&block.payload)
            .map_err(|e| ValidationError::PayloadEncoding(e.to_string()))?;
        // the payload must be the canonical encoding of what it parses to
        if !canonical::hash_check(&value, &block.header.payload_hash) {
            return Err(ValidationError::NotCanonical);
        }
        Ok(value)
    }

    fn check_genesis(&mut self, block: &Block) -> Result<(), ValidationError> {
        if !block.header.is_genesis() {
            return Err(ValidationError::ExpectedGenesis);
        }
        let t = epoch_to_instant(block.header.epoch_seconds);
        if self.realtime && t > Utc::now() {
            return Err(ValidationError::GenesisInFuture);
        }
        Self::expect_hint(block, PayloadHint::ElectionSetup)?;
        let setup: ElectionSetup = Self::parse(block)?;
        if block.header.id != self.election_id {
            return Err(ValidationError::ElectionIdMismatch);
        }

        // the setup payload carries the entire election configuration and
        // is validated in full before any state exists
        if setup.version != PROTOCOL_VERSION {
            return Err(ValidationError::UnknownVersion(setup.version));
        }
        if setup.difficulty > 255 {
            return Err(ValidationError::DifficultyOutOfRange);
        }
        setup.params.validate()?;

        let candidates = setup.candidates.len();
        if candidates < 2 {
            return Err(ValidationError::TooFew {
                what: "candidates",
                min: 2,
                got: candidates,
            });
        }
        if setup.max_choices < 1 || setup.max_choices > candidates {
            return Err(ValidationError::MaxChoicesOutOfRange {
                candidates,
                got: setup.max_choices,
            });
        }

        let total = setup.trustees.len();
        if total < 3 {
            return Err(ValidationError::TooFew {
                what: "trustees",
                min: 3,
                got: total,
            });
        }
        if setup.trustees_required < 2 || setup.trustees_required > total {
            return Err(ValidationError::TrusteesRequiredOutOfRange {
                total,
                got: setup.trustees_required,
            });
        }

        let mut setup = setup;
        let mut seen_sig = std::collections::BTreeSet::new();
        let mut seen_enc = std::collections::BTreeSet::new();
        let mut seen_exponents = std::collections::BTreeSet::new();
        for (i, trustee) in setup.trustees.iter_mut().enumerate() {
            let index = i + 1; // 1-based everywhere
            trustee.index = index;
            if !seen_sig.insert(trustee.sig_key.y.clone()) {
                return Err(ValidationError::DuplicateTrusteeData {
                    index,
                    what: "signing key",
                });
            }
            if !seen_enc.insert(trustee.enc_key.y.clone()) {
                return Err(ValidationError::DuplicateTrusteeData {
                    index,
                    what: "encryption key",
                });
            }
            if !seen_exponents.insert(trustee.exponents.clone()) {
                return Err(ValidationError::DuplicateTrusteeData {
                    index,
                    what: "public exponent set",
                });
            }
            trustee
                .sig_key
                .validate(&setup.params)
                .map_err(|e| ValidationError::key(format!("trustee {} signing", index), e))?;
            trustee
                .enc_key
                .validate(&setup.params)
                .map_err(|e| ValidationError::key(format!("trustee {} encryption", index), e))?;
            if trustee.exponents.len() != setup.trustees_required {
                return Err(ValidationError::WrongLength {
                    what: "public exponents",
                    want: setup.trustees_required,
                    got: trustee.exponents.len(),
                });
            }
            trustee
                .enc_key
                .verify_proof_of_knowledge(&setup.params, &trustee.enc_proof)
                .map_err(|e| {
                    ValidationError::crypto(format!("trustee {} encryption key pok", index), e)
                })?;
            trustee
                .sig_key
                .verify(&setup.params, &trustee.signature, trustee)
                .map_err(|e| {
                    ValidationError::crypto(format!("trustee {} self-signature", index), e)
                })?;
        }

        // registrar: a parseable http(s) endpoint and a valid key; the
        // self-signature covers the empty message
        let url = &setup.registrar.registration_url;
        let rest = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"));
        match rest {
            Some(host) if !host.is_empty() => {}
            _ => return Err(ValidationError::RegistrarUrl(url.clone())),
        }
        setup
            .registrar
            .sig_key
            .validate(&setup.params)
            .map_err(|e| ValidationError::key("registrar signing", e))?;
        setup
            .registrar
            .sig_key
            .verify(&setup.params, &setup.registrar.signature, &setup.registrar)
            .map_err(|e| ValidationError::crypto("registrar self-signature", e))?;

        let windows = setup.timing.resolve(t)?;

        // everything checked; the election exists from here on
        self.work_level = setup.difficulty;
        self.options = Some(PlaintextOptionsCache::new(setup.params.clone()));
        self.state = Some(ElectionState::new(setup, windows));
        Ok(())
    }

    fn check_trustee_shares(&mut self, block: &Block) -> Result<(), ValidationError> {
        Self::expect_hint(block, PayloadHint::TrusteeShares)?;
        let mut payload: PayloadTrusteeShares = Self::parse(block)?;
        let state = self.state.as_mut().expect("have state");

        let total = state.num_trustees();
        if payload.index < 1 || payload.index > total {
            return Err(ValidationError::UnknownTrustee(payload.index));
        }
        if state.trustee_shares.contains_key(&payload.index) {
            return Err(ValidationError::DuplicateTrustee(payload.index));
        }
        if payload.shares.len() != total - 1 {
            return Err(ValidationError::WrongLength {
                what: "shares",
                want: total - 1,
                got: payload.shares.len(),
            });
        }

        let sig_key = state.setup().trustees[payload.index - 1].sig_key.clone();
        let group = state.setup().params.clone();
        let mut shares = std::collections::BTreeMap::new();
        for share in payload.shares.iter_mut() {
            if shares.contains_key(&share.recipient) {
                return Err(ValidationError::DuplicateShareRecipient {
                    sender: payload.index,
                    recipient: share.recipient,
                });
            }
            if share.recipient < 1 || share.recipient > total || share.recipient == payload.index {
                return Err(ValidationError::BadShareRecipient {
                    sender: payload.index,
                    recipient: share.recipient,
                });
            }
            share.sender = payload.index;
            sig_key
                .verify(&group, &share.signature, share)
                .map_err(|e| {
                    ValidationError::crypto(
                        format!(
                            "trustee {} share for {} signature",
                            payload.index, share.recipient
                        ),
                        e,
                    )
                })?;
            shares.insert(share.recipient, share.point.clone());
        }

        state.trustee_shares.insert(payload.index, shares);
        Ok(())
    }

    fn check_trustee_public(&mut self, block: &Block) -> Result<(), ValidationError> {
        Self::expect_hint(block, PayloadHint::TrusteePublic)?;
        let payload: PayloadTrusteePublic = Self::parse(block)?;
        let state = self.state.as_mut().expect("have state");

        if payload.index < 1 || payload.index > state.num_trustees() {
            return Err(ValidationError::UnknownTrustee(payload.index));
        }
        if state.trustee_public.contains_key(&payload.index) {
            return Err(ValidationError::DuplicateTrustee(payload.index));
        }

        let group = state.setup().params.clone();
        let sig_key = &state.setup().trustees[payload.index - 1].sig_key;
        sig_key
            .verify(&group, &payload.signature, &payload)
            .map_err(|e| {
                ValidationError::crypto(format!("trustee {} shard signature", payload.index), e)
            })?;
        // the PoK is the important part: the shard key itself is public
        // knowledge, only its holder can prove the secret half
        payload
            .shard_key
            .verify_proof_of_knowledge(&group, &payload.shard_proof)
            .map_err(|e| {
                ValidationError::crypto(format!("trustee {} shard key pok", payload.index), e)
            })?;
        state.validate_shard_key(payload.index, &payload.shard_key)?;

        state
            .trustee_public
            .insert(payload.index, payload.shard_key);
        Ok(())
    }

    fn check_voter_registration(&mut self, block: &Block) -> Result<(), ValidationError> {
        Self::expect_hint(block, PayloadHint::VoterReg)?;
        let payload: PayloadVoterRegistration = Self::parse(block)?;
        let state = self.state.as_mut().expect("have state");

        let hash = payload.voter_hash();
        if state.voters.contains_key(&hash) {
            return Err(ValidationError::DuplicateVoter(payload.voter_id));
        }

        let group = &state.setup().params;
        payload
            .signing_key
            .validate(group)
            .map_err(|e| ValidationError::key("voter signing", e))?;

        if !self.loose_mode {
            state
                .setup()
                .registrar
                .sig_key
                .verify_message(group, &payload.registrar_sig, &payload.registrar_message())
                .map_err(|e| ValidationError::crypto("registrar signature on registration", e))?;
            payload
                .signing_key
                .verify_message(group, &payload.voter_sig, &payload.voter_message())
                .map_err(|e| ValidationError::crypto("voter signature on registration", e))?;
        }

        state.voters.insert(
            hash,
            VoterState {
                key: payload.signing_key.y,
                vote: None,
            },
        );
        Ok(())
    }

    fn check_vote_cast(&mut self, block: &Block) -> Result<(), ValidationError> {
        Self::expect_hint(block, PayloadHint::Ballot)?;
        let payload: PayloadCastVote = Self::parse(block)?;
        let state = self.state.as_mut().expect("have state");

        let hash = payload.voter_hash();
        let voter_key = match state.voters.get(&hash) {
            Some(v) => v.key.clone(),
            None => return Err(ValidationError::UnknownVoter(payload.voter_id)),
        };

        let candidates = state.num_candidates();
        if payload.votes.len() != candidates {
            return Err(ValidationError::WrongLength {
                what: "votes",
                want: candidates,
                got: payload.votes.len(),
            });
        }
        if payload.proofs.len() != candidates {
            return Err(ValidationError::WrongLength {
                what: "vote proofs",
                want: candidates,
                got: payload.proofs.len(),
            });
        }

        if !self.loose_mode {
            let group = state.setup().params.clone();
            let max_choices = state.setup().max_choices;
            let election_key = state.election_public_key().clone();
            let voter_pk = PublicKey { y: voter_key };
            voter_pk
                .verify(&group, &payload.signature, &payload)
                .map_err(|e| ValidationError::crypto("voter signature on ballot", e))?;

            let options = self.options.as_mut().expect("options exist with state");
            let zero_or_one = options.get_options(1).to_vec();
            let mut sum = Product::new();
            for (i, (ct, proof)) in payload.votes.iter().zip(&payload.proofs).enumerate() {
                verify_encryption(proof, &group, &election_key, ct, &zero_or_one, hash.as_bytes())
                    .map_err(|e| {
                        ValidationError::crypto(format!("encrypted vote {} proof", i + 1), e)
                    })?;
                sum.mul(&group, ct);
            }
            let sum = sum.into_ciphertext().expect("candidates >= 2");
            // the overall proof bounds the ballot weight at max_choices
            let sum_options = options.get_options(max_choices);
            verify_encryption(
                &payload.proof,
                &group,
                &election_key,
                &sum,
                sum_options,
                hash.as_bytes(),
            )
            .map_err(|e| ValidationError::crypto("ballot max-choices proof", e))?;
        }

        let state = self.state.as_mut().expect("have state");
        let voter = state.voters.get_mut(&hash).expect("checked above");
        // last write wins; an earlier ballot stops counting
        let repeat = voter.vote.is_some();
        voter.vote = Some(payload.votes);
        if repeat {
            state.discarded_votes += 1;
        }
        Ok(())
    }

    fn check_partial_tally(&mut self, block: &Block) -> Result<(), ValidationError> {
        Self::expect_hint(block, PayloadHint::PartialTally)?;
        let payload: PayloadPartialTally = Self::parse(block)?;
        let state = self.state.as_mut().expect("have state");

        if payload.index < 1 || payload.index > state.num_trustees() {
            return Err(ValidationError::UnknownTrustee(payload.index));
        }
        if state.result_partials.contains_key(&payload.index) {
            return Err(ValidationError::DuplicateTrustee(payload.index));
        }

        let candidates = state.num_candidates();
        for (what, got) in [
            ("tallies", payload.tallies.len()),
            ("decrypted factors", payload.decrypted.len()),
            ("decryption proofs", payload.proofs.len()),
        ] {
            if got != candidates {
                return Err(ValidationError::WrongLength {
                    what,
                    want: candidates,
                    got,
                });
            }
        }

        // the trustee must have decrypted the same sums we derive
        let local = state.local_tallies().to_vec();
        if payload.tallies != local {
            return Err(ValidationError::TallyMismatch);
        }

        let group = state.setup().params.clone();
        let sig_key = &state.setup().trustees[payload.index - 1].sig_key;
        sig_key
            .verify(&group, &payload.signature, &payload)
            .map_err(|e| {
                ValidationError::crypto(format!("trustee {} tally signature", payload.index), e)
            })?;

        let shard_key = state
            .shard_key(payload.index)
            .ok_or(ValidationError::MissingShardKey(payload.index))?
            .clone();
        for (i, (zkp, (ct, factor))) in payload
            .proofs
            .iter()
            .zip(payload.tallies.iter().zip(&payload.decrypted))
            .enumerate()
        {
            verify_partial_decryption(zkp, &group, &shard_key, ct, factor).map_err(|e| {
                ValidationError::crypto(
                    format!("decryption proof for candidate {}", i + 1),
                    e,
                )
            })?;
        }

        state.add_partial_tally(payload);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_state_before_genesis() {
        let validator = ElectionValidator::new(BlockId::ZERO);
        assert!(validator.state().is_none());
        assert_eq!(validator.work_level(), DEFAULT_WORK_LEVEL);
    }

    #[test]
    fn rejects_payload_hash_mismatch() {
        let mut validator = ElectionValidator::new(BlockId::ZERO);
        let mut block = Block::base(1, b"{}\n".to_vec());
        block.header.payload_hash = [0; 32];
        assert_eq!(
            validator.validate(&block),
            Err(ValidationError::PayloadHashMismatch)
        );
    }

    #[test]
    fn rejects_non_genesis_first_block() {
        let mut validator = ElectionValidator::new(BlockId::ZERO);
        let mut block = Block::base(1, b"{}\n".to_vec());
        block.header.depth = 4;
        block.header.prev_id = BlockId([1; 32]);
        assert_eq!(
            validator.validate(&block),
            Err(ValidationError::ExpectedGenesis)
        );
    }

    #[test]
    fn realtime_rejects_future_genesis() {
        let mut validator = ElectionValidator::new(BlockId::ZERO).realtime();
        let mut block = Block::base(PayloadHint::ElectionSetup as u8, b"{}\n".to_vec());
        block.header.epoch_seconds = u32::MAX; // far side of 2100
        assert_eq!(
            validator.validate(&block),
            Err(ValidationError::GenesisInFuture)
        );
    }

    #[test]
    fn rejects_wrong_genesis_hint() {
        let mut validator = ElectionValidator::new(BlockId::ZERO);
        let block = Block::base(PayloadHint::Ballot as u8, b"{}\n".to_vec());
        assert_eq!(
            validator.validate(&block),
            Err(ValidationError::UnexpectedHint {
                expected: PayloadHint::ElectionSetup as u8,
                got: PayloadHint::Ballot as u8,
            })
        );
    }
}

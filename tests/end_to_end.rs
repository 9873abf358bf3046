//! Whole-chain scenarios: every block is minted, appended and validated
//! through the public API, exactly as a node replaying the chain would.

use std::collections::BTreeMap;

use num::BigUint;

use astris::crypto::chaum_pedersen::disj::PlaintextOptionsCache;
use astris::crypto::elgamal::KeyPair;
use astris::crypto::group::{self, Group};
use astris::crypto::threshold::{ThresholdSystem, Trustee};
use astris::crypto::CryptoError;
use astris::election::payload::{
    ElectionSetup, Payload, PayloadCastVote, PayloadPartialTally, PayloadTrusteePublic,
    PayloadTrusteeShares, PayloadVoterRegistration, RegistrarSetup, TrusteeSetup,
    DEFAULT_WORK_LEVEL, PROTOCOL_VERSION,
};
use astris::election::timing::{TimeBounds, TimeSpec, TimingInfo};
use astris::{
    BlockValidator, Cancel, Chain, ChainError, ElectionStats, ElectionValidator, MemoryStore,
    ValidationError,
};

/// 2021-04-01T00:00:00Z; the four phases are the following four hours.
const GENESIS_EPOCH: u32 = 1_617_235_200;

fn phase_epoch(phase: u32, step: u32) -> u32 {
    GENESIS_EPOCH + phase * 3600 + 600 + 30 * step
}

fn timing() -> TimingInfo {
    let bounds = |from: &str, to: &str| TimeBounds {
        opens: TimeSpec(from.into()),
        closes: TimeSpec(to.into()),
    };
    TimingInfo {
        timezone: "UTC".into(),
        parameter_confirmation: bounds("2021-04-01T01:00:00", "2021-04-01T02:00:00"),
        voter_registration: bounds("2021-04-01T02:00:00", "2021-04-01T03:00:00"),
        vote_casting: bounds("2021-04-01T03:00:00", "2021-04-01T04:00:00"),
        tally_decryption: bounds("2021-04-01T04:00:00", "2021-04-01T05:00:00"),
    }
}

/// A complete simulated election over the 8-bit test group.
struct Harness {
    group: Group,
    chain: Chain<MemoryStore, ElectionValidator>,
    trustees: Vec<Trustee>,
    registrar: KeyPair,
    options: PlaintextOptionsCache,
    cancel: Cancel,
    steps: [u32; 4],
}

impl Harness {
    /// Mint the genesis block and run the whole parameter confirmation
    /// phase, leaving the chain ready for voter registration.
    fn start(candidates: &[&str], max_choices: usize, required: usize, total: usize) -> Harness {
        let group = group::eight_bit();
        let cancel = Cancel::new();
        let system = ThresholdSystem::new(group.clone(), required, total);

        let mut trustees: Vec<Trustee> = (1..=total)
            .map(|i| Trustee::create(system.clone(), i, &BigUint::from(9000 + i as u32)))
            .collect();
        let setups: Vec<TrusteeSetup> = trustees
            .iter()
            .map(|t| TrusteeSetup::create(t, &format!("trustee-{}", t.index)))
            .collect();
        let registrar = KeyPair::generate(&group);

        let setup = ElectionSetup {
            version: PROTOCOL_VERSION.into(),
            name: "test election".into(),
            difficulty: 8,
            params: group.clone(),
            trustees_required: required,
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
            max_choices,
            trustees: setups.clone(),
            registrar: RegistrarSetup::create(
                &group,
                &registrar,
                "registrar",
                "https://registrar.example/enrol",
            ),
            timing: timing(),
        };

        // the genesis id is only known after minting, and it doubles as
        // the election id the validator is pinned to
        let mut genesis = Payload::Setup(setup).to_block().unwrap();
        genesis.header.epoch_seconds = GENESIS_EPOCH;
        genesis.header.mint(DEFAULT_WORK_LEVEL, &cancel).unwrap();
        let election_id = genesis.header.id;

        let validator = ElectionValidator::new(election_id);
        let mut chain = Chain::open(MemoryStore::new(), election_id, validator).unwrap();
        chain.add(genesis).expect("genesis should validate");

        // phase 1, first half: every trustee publishes its encrypted
        // shares
        let shares_payloads: Vec<PayloadTrusteeShares> = trustees
            .iter()
            .map(|t| PayloadTrusteeShares::create(t, &setups))
            .collect();

        // each trustee decrypts the shares addressed to it (checking them
        // against the senders' commitments), plus its own evaluation, and
        // assembles its shard key
        for trustee in trustees.iter_mut() {
            let mut shares: BTreeMap<usize, BigUint> = BTreeMap::new();
            shares.insert(trustee.index, trustee.share_for(trustee.index));
            for payload in &shares_payloads {
                if payload.index == trustee.index {
                    continue;
                }
                let point = payload
                    .shares
                    .iter()
                    .find(|s| s.recipient == trustee.index)
                    .expect("share for every other trustee");
                let exponents = &setups[payload.index - 1].exponents;
                let share = trustee
                    .receive_share(exponents, &point.point)
                    .expect("published share should match commitments");
                shares.insert(payload.index, share);
            }
            trustee.assemble_shard(&shares);
        }

        let mut harness = Harness {
            group,
            chain,
            trustees,
            registrar,
            options: PlaintextOptionsCache::new(group::eight_bit()),
            cancel,
            steps: [0; 4],
        };

        for payload in shares_payloads {
            harness
                .append(Payload::Shares(payload))
                .expect("shares payload should validate");
        }

        // phase 1, second half: the shard keys
        let shard_payloads: Vec<Payload> = harness
            .trustees
            .iter()
            .map(|t| Payload::TrusteePublic(PayloadTrusteePublic::create(t)))
            .collect();
        for payload in shard_payloads {
            harness
                .append(payload)
                .expect("shard payload should validate");
        }
        harness
    }

    fn phase_of(payload: &Payload) -> usize {
        match payload {
            Payload::Setup(_) => 0,
            Payload::Shares(_) | Payload::TrusteePublic(_) => 0,
            Payload::VoterReg(_) => 1,
            Payload::Ballot(_) => 2,
            Payload::PartialTally(_) => 3,
        }
    }

    /// Mint and append a payload at the next timestamp of its phase.
    fn append(&mut self, payload: Payload) -> Result<(), ChainError> {
        let phase = Self::phase_of(&payload);
        let epoch = phase_epoch(phase as u32 + 1, self.steps[phase]);
        self.steps[phase] += 1;
        let block = payload.to_block().unwrap();
        self.chain
            .mint_add(block.header.payload_hint, block.payload, epoch, &self.cancel)
            .map(|_| ())
    }

    fn register(&mut self, voter_id: &str) -> KeyPair {
        let keys = KeyPair::generate(&self.group);
        let payload = PayloadVoterRegistration::create(
            &self.group,
            self.registrar.secret(),
            &keys,
            voter_id,
        );
        self.append(Payload::VoterReg(payload))
            .expect("registration should validate");
        keys
    }

    fn ballot(&mut self, voter_id: &str, keys: &KeyPair, choices: &[bool]) -> PayloadCastVote {
        let election_key = self
            .chain
            .validator_mut()
            .election_public_key()
            .expect("election key exists after genesis");
        let max_choices = self
            .chain
            .validator()
            .state()
            .unwrap()
            .setup()
            .max_choices;
        PayloadCastVote::create(
            &self.group,
            &election_key,
            keys,
            voter_id,
            choices,
            max_choices,
            &mut self.options,
        )
    }

    fn cast(&mut self, voter_id: &str, keys: &KeyPair, choices: &[bool]) {
        let payload = self.ballot(voter_id, keys, choices);
        self.append(Payload::Ballot(payload))
            .expect("ballot should validate");
    }

    /// Submit partial tallies for the given 1-based trustee indices.
    fn submit_tallies(&mut self, indices: &[usize]) -> Vec<PayloadPartialTally> {
        let local = self
            .chain
            .validator_mut()
            .local_tally()
            .expect("state exists");
        let mut payloads = Vec::new();
        for &i in indices {
            let payload = PayloadPartialTally::create(&self.trustees[i - 1], &local);
            self.append(Payload::PartialTally(payload.clone()))
                .expect("partial tally should validate");
            payloads.push(payload);
        }
        payloads
    }

    fn stats(&mut self) -> ElectionStats {
        self.chain
            .validator_mut()
            .result(&self.cancel)
            .expect("result should be computable")
    }

    fn counts(stats: &ElectionStats) -> Vec<u64> {
        stats.results.iter().map(|t| t.count).collect()
    }
}

#[test]
fn happy_minimal_election() {
    let mut h = Harness::start(&["alpha", "beta"], 1, 2, 3);
    let alice = h.register("alice");
    let bob = h.register("bob");
    h.cast("alice", &alice, &[true, false]);
    h.cast("bob", &bob, &[true, false]);
    h.submit_tallies(&[1, 2]);

    let stats = h.stats();
    assert_eq!(stats.num_voters, 2);
    assert_eq!(stats.voter_turnout, 2);
    assert_eq!(stats.num_repeat_votes, 0);
    assert_eq!(stats.tallies_submitted, 2);
    assert_eq!(stats.tallies_required, 2);
    assert_eq!(Harness::counts(&stats), vec![2, 0]);
}

#[test]
fn every_threshold_subset_agrees() {
    let mut h = Harness::start(&["a", "b", "c", "d", "e"], 1, 3, 5);

    // 4 votes for candidate 0, 3 for candidate 1, 3 empty ballots
    let mut ballots = Vec::new();
    ballots.extend(std::iter::repeat([true, false, false, false, false]).take(4));
    ballots.extend(std::iter::repeat([false, true, false, false, false]).take(3));
    ballots.extend(std::iter::repeat([false; 5]).take(3));
    for (i, choices) in ballots.iter().enumerate() {
        let id = format!("voter-{}", i);
        let keys = h.register(&id);
        h.cast(&id, &keys, choices);
    }

    let payloads = h.submit_tallies(&[1, 2, 3, 4, 5]);
    let local = h.chain.validator_mut().local_tally().unwrap();
    let system = ThresholdSystem::new(h.group.clone(), 3, 5);

    // every 3-subset of the 5 partials combines to [4, 3, 0, 0, 0]
    let expected: Vec<BigUint> = [4_u32, 3, 0, 0, 0]
        .iter()
        .map(|m| h.group.gen_pow(&BigUint::from(*m)))
        .collect();
    for a in 0..5 {
        for b in (a + 1)..5 {
            for c in (b + 1)..5 {
                for (ci, ct) in local.iter().enumerate() {
                    let factors: BTreeMap<usize, BigUint> = [a, b, c]
                        .iter()
                        .map(|&k| (payloads[k].index, payloads[k].decrypted[ci].clone()))
                        .collect();
                    assert_eq!(system.combine(ct, &factors), expected[ci]);
                }
            }
        }
    }

    let stats = h.stats();
    assert_eq!(stats.num_voters, 10);
    assert_eq!(stats.voter_turnout, 10);
    assert_eq!(Harness::counts(&stats), vec![4, 3, 0, 0, 0]);
}

#[test]
fn full_ballots_tally_to_the_turnout() {
    // max choices equal to the candidate count: a full ballot is legal,
    // and every candidate's tally equals the turnout
    let mut h = Harness::start(&["alpha", "beta"], 2, 2, 3);
    for id in ["pat", "quinn", "riley"] {
        let keys = h.register(id);
        h.cast(id, &keys, &[true, true]);
    }
    h.submit_tallies(&[1, 2]);

    let stats = h.stats();
    assert_eq!(stats.voter_turnout, 3);
    assert_eq!(Harness::counts(&stats), vec![3, 3]);
}

#[test]
fn ballot_replacement_keeps_only_the_last() {
    let mut h = Harness::start(&["alpha", "beta"], 1, 2, 3);
    let carol = h.register("carol");
    let dave = h.register("dave");
    h.cast("carol", &carol, &[true, false]);
    h.cast("dave", &dave, &[true, false]);
    // carol changes her mind; only the beta ballot counts
    h.cast("carol", &carol, &[false, true]);
    h.submit_tallies(&[2, 3]);

    let stats = h.stats();
    assert_eq!(stats.num_repeat_votes, 1);
    assert_eq!(stats.voter_turnout, 2);
    assert_eq!(Harness::counts(&stats), vec![1, 1]);
}

#[test]
fn zero_ballot_counts_as_turnout_but_not_votes() {
    let mut h = Harness::start(&["alpha", "beta"], 1, 2, 3);
    let erin = h.register("erin");
    let frank = h.register("frank");
    let _ghost = h.register("ghost"); // registers, never votes
    h.cast("erin", &erin, &[false, true]);
    h.cast("frank", &frank, &[false, false]); // explicit empty ballot
    h.submit_tallies(&[1, 3]);

    let stats = h.stats();
    assert_eq!(stats.num_voters, 3);
    assert_eq!(stats.voter_turnout, 2);
    assert_eq!(Harness::counts(&stats), vec![0, 1]);
}

#[test]
fn tampered_overall_proof_is_rejected() {
    let mut h = Harness::start(&["alpha", "beta"], 1, 2, 3);
    let mallory = h.register("mallory");
    let mut payload = h.ballot("mallory", &mallory, &[true, false]);

    // flip a bit in one response of the overall proof, re-canonicalise,
    // re-mint: the chain-level checks all pass, the ZKP does not
    payload.proof.0[0].r ^= BigUint::from(1_u8);
    let err = h.append(Payload::Ballot(payload)).unwrap_err();
    match err {
        ChainError::Rejected {
            source: ValidationError::Crypto { who, source },
            ..
        } => {
            assert_eq!(who, "ballot max-choices proof");
            assert!(matches!(
                source,
                CryptoError::BadAtom { .. } | CryptoError::BadChallengeSum
            ));
        }
        other => panic!("expected a cryptographic rejection, got {:?}", other),
    }
}

#[test]
fn payload_in_wrong_phase_window_is_rejected() {
    let mut h = Harness::start(&["alpha", "beta"], 1, 2, 3);
    let keys = KeyPair::generate(&h.group);
    let registration = PayloadVoterRegistration::create(
        &h.group,
        h.registrar.secret(),
        &keys,
        "latecomer",
    );

    // a valid registration payload, stamped inside the vote-casting
    // window: phase 3 only accepts ballots
    let block = Payload::VoterReg(registration).to_block().unwrap();
    let err = h
        .chain
        .mint_add(
            block.header.payload_hint,
            block.payload,
            phase_epoch(3, 50),
            &h.cancel,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ChainError::Rejected {
            source: ValidationError::UnexpectedHint { expected: 5, got: 4 },
            ..
        }
    ));
}

#[test]
fn trustee_payload_with_phase_two_timestamp_is_rejected() {
    let mut h = Harness::start(&["alpha", "beta"], 1, 2, 3);
    // depth is right, the timestamp is not: phase 2 wants registrations
    let trustee = h.trustees[0].clone();
    let payload = Payload::TrusteePublic(PayloadTrusteePublic::create(&trustee));
    let block = payload.to_block().unwrap();
    let err = h
        .chain
        .mint_add(block.header.payload_hint, block.payload, phase_epoch(2, 0), &h.cancel)
        .unwrap_err();
    assert!(matches!(
        err,
        ChainError::Rejected {
            source: ValidationError::UnexpectedHint { expected: 4, got: 3 },
            ..
        }
    ));
}

#[test]
fn exhausted_phase_one_accepts_nothing_more() {
    let mut h = Harness::start(&["alpha", "beta"], 1, 2, 3);
    // all trustee data is in; one more shard payload hits the exhausted
    // window
    let trustee = h.trustees[0].clone();
    let err = h
        .append(Payload::TrusteePublic(PayloadTrusteePublic::create(
            &trustee,
        )))
        .unwrap_err();
    assert!(matches!(
        err,
        ChainError::Rejected {
            source: ValidationError::PhaseExhausted,
            ..
        }
    ));
}

#[test]
fn duplicate_voter_registration_is_rejected() {
    let mut h = Harness::start(&["alpha", "beta"], 1, 2, 3);
    h.register("grace");
    let again = PayloadVoterRegistration::create(
        &h.group,
        h.registrar.secret(),
        &KeyPair::generate(&h.group),
        "grace",
    );
    let err = h.append(Payload::VoterReg(again)).unwrap_err();
    assert!(matches!(
        err,
        ChainError::Rejected {
            source: ValidationError::DuplicateVoter(_),
            ..
        }
    ));
}

#[test]
fn unknown_voter_ballot_is_rejected() {
    let mut h = Harness::start(&["alpha", "beta"], 1, 2, 3);
    h.register("heidi");
    let stranger = KeyPair::generate(&h.group);
    let payload = h.ballot("nobody", &stranger, &[true, false]);
    let err = h.append(Payload::Ballot(payload)).unwrap_err();
    assert!(matches!(
        err,
        ChainError::Rejected {
            source: ValidationError::UnknownVoter(_),
            ..
        }
    ));
}

#[test]
fn replay_from_storage_is_byte_identical() {
    let mut h = Harness::start(&["alpha", "beta"], 1, 2, 3);
    let ivy = h.register("ivy");
    let judy = h.register("judy");
    h.cast("ivy", &ivy, &[true, false]);
    h.cast("judy", &judy, &[false, true]);
    h.submit_tallies(&[1, 2, 3]);

    let first = serde_json::to_vec(&h.stats()).unwrap();
    let election_id = h.chain.id();
    let storage = h.chain.storage().clone();

    // strict replay
    let mut strict = Chain::open(
        storage.clone(),
        election_id,
        ElectionValidator::new(election_id),
    )
    .expect("stored chain should revalidate");
    let strict_stats = serde_json::to_vec(&strict.validator_mut().result(&h.cancel).unwrap()).unwrap();
    assert_eq!(strict_stats, first);

    // loose replay skips voter signatures and ZKPs but derives the same
    // state
    let mut loose_validator = ElectionValidator::new(election_id);
    loose_validator.loose_mode = true;
    let mut loose = Chain::open(storage, election_id, loose_validator).unwrap();
    let loose_stats = serde_json::to_vec(&loose.validator_mut().result(&h.cancel).unwrap()).unwrap();
    assert_eq!(loose_stats, first);
}

#[test]
fn reopening_with_wrong_election_id_fails() {
    let mut h = Harness::start(&["alpha", "beta"], 1, 2, 3);
    h.register("kim");
    let storage = h.chain.storage().clone();
    let wrong = astris::BlockId([0xee; 32]);
    assert!(matches!(
        Chain::open(storage, wrong, ElectionValidator::new(wrong)),
        Err(ChainError::GenesisMismatch { .. })
    ));
}

#[test]
fn work_level_follows_the_setup_difficulty() {
    let h = Harness::start(&["alpha", "beta"], 1, 2, 3);
    assert_eq!(h.chain.validator().work_level(), 8);
    // and the genesis itself was minted at the default level
    assert!(h
        .chain
        .header(&h.chain.id())
        .unwrap()
        .check_proof_of_work(DEFAULT_WORK_LEVEL));
}

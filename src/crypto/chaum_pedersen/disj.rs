//! The disjunctive (OR) encryption proof.
//!
//! Proves that a ciphertext encrypts one of a known list of plaintexts
//! without revealing which. The prover simulates a transcript for every
//! plaintext except the real one, then builds the honest transcript under
//! a joint challenge that hashes every commitment, so the simulated
//! challenges and the honest one must sum to the computed value.
//!
//! The caller-supplied `meta` bytes are folded into the joint challenge.
//! Ballots pass the voter hash here, so a proof lifted from one ballot
//! fails verification on any other.

use std::collections::HashMap;

use num::BigUint;
use serde::{Deserialize, Serialize};

use super::super::elgamal::{Ciphertext, PublicKey};
use super::super::group::Group;
use super::super::{hex_uint, random, CryptoError};
use super::Zkp;

/// One transcript per candidate plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisjProof(pub Vec<Zkp>);

/// `ct.b / plaintext mod p` — the `H` of the verification equations.
fn beta_over_plaintext(group: &Group, ct: &Ciphertext, plaintext: &BigUint) -> BigUint {
    group.inverse(plaintext) * &ct.b % &group.p
}

/// The joint challenge over every commitment pair plus the metadata.
fn joint_challenge<'a>(
    group: &Group,
    commitments: impl Iterator<Item = (&'a BigUint, &'a BigUint)>,
    meta: &[u8],
) -> BigUint {
    let mut input = b"zkp:enc:".to_vec();
    for (a, b) in commitments {
        input.extend_from_slice(format!("{}|{}:", hex_uint(a), hex_uint(b)).as_bytes());
    }
    input.extend_from_slice(meta);
    random::oracle(&input, &group.q)
}

/// A simulated transcript for a plaintext the ciphertext does not encrypt:
/// pick `c` and `r`, then solve the verification equations backwards for
/// the commitments. Its challenge will not match its commitments on its
/// own; only the joint sum has to.
fn simulate(group: &Group, pk: &PublicKey, ct: &Ciphertext, plaintext: &BigUint) -> Zkp {
    let h = beta_over_plaintext(group, ct, plaintext);
    let c = random::int_below(&group.q);
    let r = random::int_below(&group.q);

    // a = g^r / ct.a^c
    let a = group.inverse(&ct.a.modpow(&c, &group.p)) * group.gen_pow(&r) % &group.p;
    // b = y^r / (ct.b/m)^c
    let b = group.inverse(&h.modpow(&c, &group.p)) * pk.y.modpow(&r, &group.p) % &group.p;

    Zkp { a, b, c, r }
}

/// Prove that `ct` encrypts `plaintexts[index]`, where `randomness` is the
/// `r` used for the encryption.
pub fn prove_encryption(
    group: &Group,
    pk: &PublicKey,
    ct: &Ciphertext,
    plaintexts: &[BigUint],
    index: usize,
    randomness: &BigUint,
    meta: &[u8],
) -> DisjProof {
    assert!(index < plaintexts.len(), "chosen index out of range");

    let mut atoms: Vec<Option<Zkp>> = Vec::with_capacity(plaintexts.len());
    let mut challenge_sum = BigUint::from(0_u8);
    for (i, pt) in plaintexts.iter().enumerate() {
        if i == index {
            atoms.push(None);
            continue;
        }
        let fake = simulate(group, pk, ct, pt);
        challenge_sum = (challenge_sum + &fake.c) % &group.q;
        atoms.push(Some(fake));
    }

    // The honest transcript proves knowledge of the encryption randomness
    // against (g, y). Its challenge is what is left once the simulated
    // challenges are subtracted from the joint value.
    let real = super::create(group, &pk.y, randomness, |a, b| {
        let joint = joint_challenge(
            group,
            atoms
                .iter()
                .enumerate()
                .map(|(i, atom)| match atom {
                    Some(zkp) => (&zkp.a, &zkp.b),
                    None => {
                        debug_assert_eq!(i, index);
                        (a, b)
                    }
                }),
            meta,
        );
        group.sub_exponent(&joint, &challenge_sum)
    });
    atoms[index] = Some(real);

    DisjProof(atoms.into_iter().map(Option::unwrap).collect())
}

/// Verify a disjunctive proof against the full plaintext list and the same
/// metadata the prover used.
pub fn verify_encryption(
    proof: &DisjProof,
    group: &Group,
    pk: &PublicKey,
    ct: &Ciphertext,
    plaintexts: &[BigUint],
    meta: &[u8],
) -> Result<(), CryptoError> {
    if proof.0.len() != plaintexts.len() {
        return Err(CryptoError::AtomCountMismatch {
            want: plaintexts.len(),
            got: proof.0.len(),
        });
    }

    let mut challenge_sum = BigUint::from(0_u8);
    for (i, (zkp, pt)) in proof.0.iter().zip(plaintexts).enumerate() {
        let h = beta_over_plaintext(group, ct, pt);
        super::verify(zkp, group, &pk.y, &ct.a, &h).map_err(|source| CryptoError::BadAtom {
            index: i,
            source: Box::new(source),
        })?;
        challenge_sum = (challenge_sum + &zkp.c) % &group.q;
    }

    let joint = joint_challenge(group, proof.0.iter().map(|z| (&z.a, &z.b)), meta);
    if joint != challenge_sum {
        return Err(CryptoError::BadChallengeSum);
    }
    Ok(())
}

/// Memoised `[g^0 .. g^max]` plaintext vectors, shared across every proof
/// in a run.
#[derive(Debug)]
pub struct PlaintextOptionsCache {
    group: Group,
    cache: HashMap<usize, Vec<BigUint>>,
}

impl PlaintextOptionsCache {
    pub fn new(group: Group) -> PlaintextOptionsCache {
        PlaintextOptionsCache {
            group,
            cache: HashMap::new(),
        }
    }

    /// The exponential encodings of `0..=max`.
    pub fn get_options(&mut self, max: usize) -> &[BigUint] {
        let group = &self.group;
        self.cache
            .entry(max)
            .or_insert_with(|| (0..=max).map(|m| group.gen_pow(&BigUint::from(m))).collect())
    }
}

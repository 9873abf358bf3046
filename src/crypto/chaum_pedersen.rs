//! Chaum-Pedersen zero-knowledge proofs.
//!
//! The general form proves knowledge of `x` with `G = g^x` and `H = h^x`
//! for bases `g` (the group generator) and a statement-specific `h`:
//!
//! ```text
//! create:  w random; a = g^w; b = h^w; c = challenge(a, b); r = (w + x*c) mod q
//! verify:  g^r == a * G^c  and  h^r == b * H^c   (mod p)
//! ```
//!
//! The quadruple is used directly for proofs of correct (partial)
//! decryption, and as the atoms of the disjunctive encryption proof in
//! [`disj`].

use num::BigUint;
use serde::{Deserialize, Serialize};

use super::elgamal::{Ciphertext, PublicKey, SecretKey};
use super::group::Group;
use super::{hex_uint, random, CryptoError};

pub mod disj;

/// A Chaum-Pedersen transcript `(a, b, c, r)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zkp {
    #[serde(with = "crate::serialize::big_uint")]
    pub a: BigUint,
    #[serde(with = "crate::serialize::big_uint")]
    pub b: BigUint,
    #[serde(with = "crate::serialize::big_uint")]
    pub c: BigUint,
    #[serde(with = "crate::serialize::big_uint")]
    pub r: BigUint,
}

/// Build a transcript for secret `x` against the second base `h`, with the
/// challenge supplied by the caller (it differs per proof context, and the
/// disjunctive proof needs to subtract its simulated challenges).
pub(crate) fn create(
    group: &Group,
    h: &BigUint,
    x: &BigUint,
    challenge: impl FnOnce(&BigUint, &BigUint) -> BigUint,
) -> Zkp {
    let w = random::int_below(&group.q);
    let a = group.gen_pow(&w);
    let b = h.modpow(&w, &group.p);
    let c = challenge(&a, &b);
    let r = (w + x * &c) % &group.q;
    Zkp { a, b, c, r }
}

/// Check both verification equations against `(g, h, G, H)`.
pub(crate) fn verify(
    zkp: &Zkp,
    group: &Group,
    h: &BigUint,
    big_g: &BigUint,
    big_h: &BigUint,
) -> Result<(), CryptoError> {
    // g^r == a * G^c mod p
    let lhs = group.gen_pow(&zkp.r);
    let rhs = big_g.modpow(&zkp.c, &group.p) * &zkp.a % &group.p;
    if lhs != rhs {
        return Err(CryptoError::BadFirstEquation);
    }
    // h^r == b * H^c mod p
    let lhs = h.modpow(&zkp.r, &group.p);
    let rhs = big_h.modpow(&zkp.c, &group.p) * &zkp.b % &group.p;
    if lhs != rhs {
        return Err(CryptoError::BadSecondEquation);
    }
    Ok(())
}

fn decryption_challenge(group: &Group, a: &BigUint, b: &BigUint) -> BigUint {
    let input = format!("zkp:dec|{}|{}", hex_uint(a), hex_uint(b));
    random::oracle(input.as_bytes(), &group.q)
}

/// Prove correct decryption of `ct` under this key.
///
/// The statement: the prover knows `x` with `y = g^x`, and the published
/// factor equals `ct.a^x`. No extra context goes into the challenge; the
/// transcript is already bound to the decryptor's key.
pub fn prove_decryption(sk: &SecretKey, group: &Group, ct: &Ciphertext) -> Zkp {
    create(group, &ct.a, &sk.x, |a, b| decryption_challenge(group, a, b))
}

/// Verify a proof that `ct` decrypts to `plaintext` under `pk`.
pub fn verify_decryption(
    zkp: &Zkp,
    group: &Group,
    pk: &PublicKey,
    ct: &Ciphertext,
    plaintext: &BigUint,
) -> Result<(), CryptoError> {
    let factor = group.inverse(plaintext) * &ct.b % &group.p;
    verify_partial_decryption(zkp, group, pk, ct, &factor)
}

/// Verify a partial-decryption proof: the factor `ct.a^x` is given
/// directly, with `pk` the decryptor's (shard) public key.
pub fn verify_partial_decryption(
    zkp: &Zkp,
    group: &Group,
    pk: &PublicKey,
    ct: &Ciphertext,
    factor: &BigUint,
) -> Result<(), CryptoError> {
    let expected = decryption_challenge(group, &zkp.a, &zkp.b);
    if expected != zkp.c {
        return Err(CryptoError::BadChallenge);
    }
    verify(zkp, group, &ct.a, &pk.y, factor)
}

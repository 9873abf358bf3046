//! Schnorr signatures over arbitrary byte messages, and the
//! proof-of-knowledge of a secret key built from them.

use num::BigUint;
use serde::{Deserialize, Serialize};

use super::elgamal::{PublicKey, SecretKey};
use super::group::Group;
use super::{hex_uint, random, CryptoError};

/// The fixed message signed to prove knowledge of a secret key.
const POK_MESSAGE: &[u8] = b"pok";

/// A Schnorr signature `(c, r)`.
///
/// The commitment `V = g^v` is not carried; verification reconstructs it
/// as `g^r * y^c` and recomputes the challenge from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(rename = "c", with = "crate::serialize::big_uint")]
    pub challenge: BigUint,
    #[serde(rename = "r", with = "crate::serialize::big_uint")]
    pub response: BigUint,
}

/// Anything with a canonical byte message to sign.
pub trait Signable {
    fn signature_message(&self) -> Vec<u8>;
}

fn signing_challenge(group: &Group, commitment: &BigUint, y: &BigUint, msg: &[u8]) -> BigUint {
    let mut input = format!("sig|{}|{}|", hex_uint(commitment), hex_uint(y)).into_bytes();
    input.extend_from_slice(msg);
    random::oracle(&input, &group.q)
}

impl SecretKey {
    /// Sign a raw byte message: `v` uniform, `c = H(sig | g^v | y | msg)`,
    /// `r = (v - x*c) mod q`.
    pub fn sign_message(&self, group: &Group, msg: &[u8]) -> Signature {
        let v = random::int_below(&group.q);
        let commitment = group.gen_pow(&v);
        let challenge = signing_challenge(group, &commitment, &self.public.y, msg);
        let response = group.sub_exponent(&v, &(&self.x * &challenge));
        Signature {
            challenge,
            response,
        }
    }

    pub fn sign<S: Signable>(&self, group: &Group, value: &S) -> Signature {
        self.sign_message(group, &value.signature_message())
    }

    /// Prove knowledge of this secret key.
    pub fn proof_of_knowledge(&self, group: &Group) -> ProofOfKnowledge {
        ProofOfKnowledge(self.sign_message(group, POK_MESSAGE))
    }
}

impl PublicKey {
    /// Verify a signature by reconstructing the commitment.
    pub fn verify_message(
        &self,
        group: &Group,
        sig: &Signature,
        msg: &[u8],
    ) -> Result<(), CryptoError> {
        // V' = g^r * y^c mod p
        let reconstructed = group.gen_pow(&sig.response) * self.y.modpow(&sig.challenge, &group.p)
            % &group.p;
        let expected = signing_challenge(group, &reconstructed, &self.y, msg);
        if expected != sig.challenge {
            return Err(CryptoError::BadSignature);
        }
        Ok(())
    }

    pub fn verify<S: Signable>(
        &self,
        group: &Group,
        sig: &Signature,
        value: &S,
    ) -> Result<(), CryptoError> {
        self.verify_message(group, sig, &value.signature_message())
    }

    /// Verify a proof of knowledge of the matching secret key.
    pub fn verify_proof_of_knowledge(
        &self,
        group: &Group,
        pok: &ProofOfKnowledge,
    ) -> Result<(), CryptoError> {
        self.verify_message(group, &pok.0, POK_MESSAGE)
            .map_err(|_| CryptoError::BadProofOfKnowledge)
    }
}

/// A proof of knowledge of the discrete log of a public key: a signature
/// over a fixed message under that key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProofOfKnowledge(pub Signature);

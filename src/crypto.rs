//! The cryptographic engine: group parameters, exponential ElGamal,
//! Schnorr signatures, Chaum-Pedersen proofs, the threshold scheme and
//! the bounded discrete-log recovery used to decode tallies.
//!
//! Everything in here is a pure function over its inputs. The stateful
//! parts of the system (the chain and the election validator) live above
//! this layer and serialise all calls into it.

use num::BigUint;

pub mod chaum_pedersen;
pub mod dlog;
pub mod elgamal;
pub mod group;
pub mod random;
pub mod schnorr;
pub mod threshold;

/// Minimal lowercase hexadecimal of an unsigned big integer.
///
/// This is the `hex(x)` of every challenge derivation and signature byte
/// message: big-endian magnitude, no padding, `"0"` for zero.
pub fn hex_uint(x: &BigUint) -> String {
    x.to_str_radix(16)
}

/// Failures of the proof primitives.
///
/// Signature and proof verification never recovers locally; callers get
/// the first failed equation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("signature invalid")]
    BadSignature,
    #[error("proof of knowledge invalid")]
    BadProofOfKnowledge,
    #[error("zkp challenge does not match commitments")]
    BadChallenge,
    #[error("zkp invalid: g^r != a * G^c mod p")]
    BadFirstEquation,
    #[error("zkp invalid: h^r != b * H^c mod p")]
    BadSecondEquation,
    #[error("disjunctive proof has {got} atoms for {want} plaintexts")]
    AtomCountMismatch { want: usize, got: usize },
    #[error("disjunctive proof atom {index} invalid: {source}")]
    BadAtom {
        index: usize,
        source: Box<CryptoError>,
    },
    #[error("disjunctive proof challenge sum does not match computed challenge")]
    BadChallengeSum,
}

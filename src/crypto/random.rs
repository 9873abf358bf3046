//! Strong random integers and the deterministic random oracle.

use num::BigUint;
use num_bigint::RandBigInt;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// A cryptographically strong uniform integer in `[0, max)`.
pub fn int_below(max: &BigUint) -> BigUint {
    OsRng.gen_biguint_below(max)
}

/// Map arbitrary bytes to a deterministic integer in `[0, max)`.
///
/// SHA-256 of the input, read as a big-endian integer and reduced. The
/// same oracle must be used by prover and verifier for any challenge to
/// line up.
pub fn oracle(input: &[u8], max: &BigUint) -> BigUint {
    let digest = Sha256::digest(input);
    BigUint::from_bytes_be(&digest) % max
}

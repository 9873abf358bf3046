//! The canonical JSON encoding.
//!
//! Every payload hash on the chain is SHA-256 over this encoding, so it has
//! to be byte-identical across implementations: object keys sorted at every
//! depth, no whitespace, big integers as unpadded base64url strings, one
//! trailing line feed. Routing the value through `serde_json::Value` gives
//! the sorted keys (its object map is a `BTreeMap`); compact output gives
//! the rest.

use digest::Digest;
use serde::Serialize;
use sha2::Sha256;

/// Encode a value canonically.
///
/// Fails only on values JSON cannot represent (non-finite floats, non-string
/// map keys); no on-chain payload contains such a thing.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let tree = serde_json::to_value(value)?;
    let mut bytes = serde_json::to_vec(&tree)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// SHA-256 over the canonical encoding.
pub fn hash<T: Serialize>(value: &T) -> Result<[u8; 32], serde_json::Error> {
    let bytes = encode(value)?;
    Ok(Sha256::digest(&bytes).into())
}

/// Compare the canonical hash of `value` against an expected digest,
/// without short-circuiting on the first differing byte.
pub fn hash_check<T: Serialize>(value: &T, expected: &[u8; 32]) -> bool {
    match hash(value) {
        Ok(actual) => {
            let mut diff = 0_u8;
            for (a, b) in actual.iter().zip(expected) {
                diff |= a ^ b;
            }
            diff == 0
        }
        Err(_) => false,
    }
}

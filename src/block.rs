//! Blocks, the header hash and the HashCash-style proof of work.
//!
//! A block id is the SHA-256 over `prev_id || payload_hash ||
//! epoch_seconds(u32 be) || payload_hint(u8) || proof(u32 be)`. The proof
//! of work requires the id, read as a big-endian bit string, to start with
//! at least `work_level` zero bits.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::cancel::Cancel;
use crate::errors::ChainError;

/// A 32-byte block digest. The all-zero id is the genesis back-link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BlockId(pub [u8; 32]);

impl BlockId {
    pub const ZERO: BlockId = BlockId([0; 32]);

    pub fn from_slice(bytes: &[u8]) -> BlockId {
        let mut id = BlockId::ZERO;
        id.0.copy_from_slice(bytes);
        id
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for BlockId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<BlockId, Self::Err> {
        let mut id = BlockId::ZERO;
        hex::decode_to_slice(s, &mut id.0)?;
        Ok(id)
    }
}

/// The block detail kept in memory; payloads are read on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub id: BlockId,
    pub prev_id: BlockId,
    pub epoch_seconds: u32,
    pub payload_hash: [u8; 32],
    pub payload_hint: u8,
    pub proof: u32,
    pub depth: u64,
}

/// A header together with its raw (canonical JSON) payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub payload: Vec<u8>,
}

impl BlockHeader {
    /// The deterministic id over the header contents. The proof nonce is
    /// part of the hash, which is what makes the mint loop work.
    pub fn compute_id(&self) -> BlockId {
        let mut h = Sha256::new();
        h.update(self.prev_id.0);
        h.update(self.payload_hash);
        h.update(self.epoch_seconds.to_be_bytes());
        h.update([self.payload_hint]);
        h.update(self.proof.to_be_bytes());
        BlockId(h.finalize().into())
    }

    pub fn is_genesis(&self) -> bool {
        self.depth == 0 && self.prev_id.is_zero()
    }

    /// Does the stored id meet the work level?
    pub fn check_proof_of_work(&self, work_level: u32) -> bool {
        leading_zero_bits_at_least(&self.id, work_level)
    }

    /// Full self-check, assuming `prev_id` and `payload_hash` are handled
    /// separately: the proof of work holds and the id matches the contents.
    pub fn validate(&self, work_level: u32) -> Result<(), ChainError> {
        if !self.check_proof_of_work(work_level) {
            return Err(ChainError::ProofOfWork {
                id: self.id,
                level: work_level,
            });
        }
        if self.compute_id() != self.id {
            return Err(ChainError::HeaderMismatch { id: self.id });
        }
        Ok(())
    }

    /// Search the nonce space for a proof of work, starting from the
    /// current epoch. Exhausting all 2^32 nonces bumps the epoch by one
    /// second and starts over. Sets `id` and `proof` on success.
    pub fn mint(&mut self, work_level: u32, cancel: &Cancel) -> Result<(), ChainError> {
        loop {
            self.proof = 0;
            loop {
                if cancel.is_cancelled() {
                    return Err(ChainError::Cancelled);
                }
                let id = self.compute_id();
                if leading_zero_bits_at_least(&id, work_level) {
                    self.id = id;
                    return Ok(());
                }
                if self.proof == u32::MAX {
                    break;
                }
                self.proof += 1;
            }
            self.epoch_seconds = self.epoch_seconds.wrapping_add(1);
        }
    }
}

impl Block {
    /// Start a block from a payload: hash it and record the hint. The
    /// chain fills in the linkage and mints the proof.
    pub fn base(payload_hint: u8, payload: Vec<u8>) -> Block {
        let payload_hash: [u8; 32] = Sha256::digest(&payload).into();
        Block {
            header: BlockHeader {
                id: BlockId::ZERO,
                prev_id: BlockId::ZERO,
                epoch_seconds: 0,
                payload_hash,
                payload_hint,
                proof: 0,
                depth: 0,
            },
            payload,
        }
    }

    /// `SHA256(payload) == header.payload_hash`.
    pub fn check_payload_hash(&self) -> bool {
        let actual: [u8; 32] = Sha256::digest(&self.payload).into();
        actual == self.header.payload_hash
    }
}

/// The proof-of-work predicate. Whole zero words are checked first so a
/// high work level does not degenerate into bit-by-bit scanning.
fn leading_zero_bits_at_least(id: &BlockId, bits: u32) -> bool {
    let mut remaining = bits;
    for chunk in id.0.chunks_exact(8) {
        let word = u64::from_be_bytes(chunk.try_into().expect("8-byte chunk"));
        if remaining >= 64 {
            if word != 0 {
                return false;
            }
            remaining -= 64;
        } else {
            return word.leading_zeros() >= remaining;
        }
    }
    remaining == 0
}

//! The error taxonomy surfaced by the validator and the chain.
//!
//! Lower layers have their own small error types ([`GroupError`],
//! [`KeyError`], [`CryptoError`], [`DlogError`]); everything a block can be
//! rejected for converges on [`ValidationError`], and the chain wraps that
//! with the offending block id and depth. The first error encountered wins;
//! nothing is recovered locally.

use thiserror::Error;

use crate::block::BlockId;
use crate::crypto::dlog::DlogError;
use crate::crypto::elgamal::KeyError;
use crate::crypto::group::GroupError;
use crate::crypto::CryptoError;

/// Why a block's payload was rejected by the election validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    // structural
    #[error("payload does not parse: {0}")]
    PayloadEncoding(String),
    #[error("payload is not canonically encoded")]
    NotCanonical,
    #[error("payload hash does not match header")]
    PayloadHashMismatch,
    #[error("expecting payload hint {expected}, got {got}")]
    UnexpectedHint { expected: u8, got: u8 },
    #[error("expecting genesis block")]
    ExpectedGenesis,
    #[error("genesis block timestamp is in the future")]
    GenesisInFuture,
    #[error("genesis block id does not match the configured election id")]
    ElectionIdMismatch,
    #[error("unknown protocol version: {0}")]
    UnknownVersion(String),
    #[error("block difficulty out of range")]
    DifficultyOutOfRange,
    #[error("{what} count incorrect: expected {want}, got {got}")]
    WrongLength {
        what: &'static str,
        want: usize,
        got: usize,
    },
    #[error("must be at least {min} {what}, only {got} present")]
    TooFew {
        what: &'static str,
        min: usize,
        got: usize,
    },
    #[error("max choices must be between 1 and {candidates}: got {got}")]
    MaxChoicesOutOfRange { candidates: usize, got: usize },
    #[error("trustees required must be between 2 and {total}: got {got}")]
    TrusteesRequiredOutOfRange { total: usize, got: usize },
    #[error("trustee {index} has a previously seen {what}")]
    DuplicateTrusteeData { index: usize, what: &'static str },
    #[error("registrar url invalid: {0}")]
    RegistrarUrl(String),
    #[error("timing data timezone is invalid: {0}")]
    UnknownTimezone(String),
    #[error("timing for {phase} invalid: {reason}")]
    BadTiming {
        phase: &'static str,
        reason: &'static str,
    },

    // arithmetic
    #[error("encryption params invalid: {0}")]
    Group(#[from] GroupError),
    #[error("{who} key invalid: {source}")]
    Key { who: String, source: KeyError },

    // cryptographic
    #[error("{who}: {source}")]
    Crypto { who: String, source: CryptoError },

    // protocol
    #[error("block timestamp is not within any election phase")]
    OutsidePhases,
    #[error("all trustee data present, no more blocks accepted in this phase")]
    PhaseExhausted,
    #[error("alleged trustee {0} is not part of this election")]
    UnknownTrustee(usize),
    #[error("trustee {0} has already submitted this payload")]
    DuplicateTrustee(usize),
    #[error("trustee {sender} provided invalid share recipient {recipient}")]
    BadShareRecipient { sender: usize, recipient: usize },
    #[error("trustee {sender} provided share for duplicate recipient {recipient}")]
    DuplicateShareRecipient { sender: usize, recipient: usize },
    #[error("trustee {index} published a shard key that does not match the commitments")]
    ShardKeyMismatch { index: usize },
    #[error("no shard key on record for trustee {0}")]
    MissingShardKey(usize),
    #[error("voter already registered: {0}")]
    DuplicateVoter(String),
    #[error("unknown voter in cast vote: {0}")]
    UnknownVoter(String),
    #[error("partial tally does not match the locally computed tally")]
    TallyMismatch,

    #[error(transparent)]
    Dlog(#[from] DlogError),
}

impl ValidationError {
    /// Attach an actor description to a key failure.
    pub fn key(who: impl Into<String>, source: KeyError) -> ValidationError {
        ValidationError::Key {
            who: who.into(),
            source,
        }
    }

    /// Attach an actor description to a signature/proof failure.
    pub fn crypto(who: impl Into<String>, source: CryptoError) -> ValidationError {
        ValidationError::Crypto {
            who: who.into(),
            source,
        }
    }
}

/// Failures of the block store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("block not found")]
    NotFound,
    #[error("storage io: {0}")]
    Io(String),
}

/// Failures at the chain layer, each naming the block involved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("chain has no blocks")]
    Empty,
    #[error("block {0} missing from storage")]
    BlockMissing(BlockId),
    #[error("block {id}: depth {got}, expected {want}")]
    DepthGap { id: BlockId, want: u64, got: u64 },
    #[error("block {id} does not link back to the current head")]
    BrokenLink { id: BlockId },
    #[error("walked back to depth 0 but {id} is not a genesis header")]
    BadGenesisShape { id: BlockId },
    #[error("genesis block {id} does not match chain id {expected}")]
    GenesisMismatch { id: BlockId, expected: BlockId },
    #[error("block {id}: proof of work does not meet level {level}")]
    ProofOfWork { id: BlockId, level: u32 },
    #[error("block {id}: header id does not match its contents")]
    HeaderMismatch { id: BlockId },
    #[error("block {id}: payload hash does not match payload")]
    PayloadMismatch { id: BlockId },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("minting cancelled")]
    Cancelled,
    #[error("block {id} at depth {depth} rejected: {source}")]
    Rejected {
        id: BlockId,
        depth: u64,
        source: ValidationError,
    },
}

//! Astris: a peer-to-peer electronic voting protocol whose verifiable
//! record is an append-only, proof-of-work blockchain.
//!
//! This crate is the election chain validator and cryptographic engine.
//! It ingests blocks in depth order, enforces the per-phase structural
//! and cryptographic rules of the four-phase protocol, accumulates the
//! derived election state (threshold public key, registered voters,
//! encrypted ballots, partial decryptions) and reconstructs the final
//! tally, so that any auditor can recompute the result from the chain
//! alone.
//!
//! Peer transport, persistent SQLite storage and the actor CLIs live
//! outside this crate; [`chain::Storage`] is the seam they plug into.

pub mod block;
pub mod cancel;
pub mod chain;
pub mod crypto;
pub mod election;
pub mod errors;
pub mod serialize;

pub use block::{Block, BlockHeader, BlockId};
pub use cancel::Cancel;
pub use chain::{BlockValidator, Chain, MemoryStore, Storage};
pub use election::payload::{Payload, PayloadHint, DEFAULT_WORK_LEVEL, PROTOCOL_VERSION};
pub use election::state::{ElectionStats, Tally};
pub use election::validator::ElectionValidator;
pub use errors::{ChainError, StorageError, ValidationError};

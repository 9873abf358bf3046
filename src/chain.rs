//! The append-only chain over an abstract block store.
//!
//! The store keeps blocks by id; the chain object owns the validator and
//! is the single mutation point. Opening an existing store runs two
//! passes: a backward header walk from the stored head down to genesis,
//! building the linkage and checking depths, then a forward walk over the
//! full blocks feeding each one to the validator in order. After a
//! successful open the in-memory footprint is just the head header;
//! everything else is read back on demand.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::block::{Block, BlockHeader, BlockId};
use crate::cancel::Cancel;
use crate::errors::{ChainError, StorageError, ValidationError};

/// The persistence contract. A SQLite implementation stores one row per
/// block `(id, prev_id, depth, epoch_seconds, proof, payload_hint,
/// payload_hash, payload)` and selects the head with
/// `ORDER BY depth DESC, epoch_seconds DESC, id ASC LIMIT 1`.
pub trait Storage {
    /// The current head block id, or `None` for an empty store.
    fn head(&self) -> Result<Option<BlockId>, StorageError>;
    fn header(&self, id: &BlockId) -> Result<BlockHeader, StorageError>;
    fn payload(&self, id: &BlockId) -> Result<Vec<u8>, StorageError>;
    fn write(&mut self, block: &Block) -> Result<(), StorageError>;
}

/// Stateful per-block validation, driven by the chain in depth order.
pub trait BlockValidator {
    fn validate(&mut self, block: &Block) -> Result<(), ValidationError>;

    /// The proof-of-work level blocks must currently meet. May change as
    /// validated blocks carry new configuration (the genesis block does).
    fn work_level(&self) -> u32;
}

/// In-memory store, also the reference for the head ordering.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    blocks: BTreeMap<BlockId, Block>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl Storage for MemoryStore {
    fn head(&self) -> Result<Option<BlockId>, StorageError> {
        // depth desc, epoch desc, id asc; ids are unique so this is total
        Ok(self
            .blocks
            .values()
            .max_by(|a, b| {
                a.header
                    .depth
                    .cmp(&b.header.depth)
                    .then(a.header.epoch_seconds.cmp(&b.header.epoch_seconds))
                    .then(b.header.id.cmp(&a.header.id))
            })
            .map(|b| b.header.id))
    }

    fn header(&self, id: &BlockId) -> Result<BlockHeader, StorageError> {
        self.blocks
            .get(id)
            .map(|b| b.header.clone())
            .ok_or(StorageError::NotFound)
    }

    fn payload(&self, id: &BlockId) -> Result<Vec<u8>, StorageError> {
        self.blocks
            .get(id)
            .map(|b| b.payload.clone())
            .ok_or(StorageError::NotFound)
    }

    fn write(&mut self, block: &Block) -> Result<(), StorageError> {
        self.blocks.insert(block.header.id, block.clone());
        Ok(())
    }
}

/// A validated chain: storage plus validator plus the current head.
#[derive(Debug)]
pub struct Chain<S, V> {
    id: BlockId,
    storage: S,
    validator: V,
    head: Option<BlockHeader>,
}

impl<S: Storage, V: BlockValidator> Chain<S, V> {
    /// Open and fully validate whatever the store holds. An empty store
    /// gives an empty chain awaiting its genesis block.
    pub fn open(storage: S, chain_id: BlockId, validator: V) -> Result<Chain<S, V>, ChainError> {
        let mut chain = Chain {
            id: chain_id,
            storage,
            validator,
            head: None,
        };

        let head_id = match chain.storage.head()? {
            None => return Ok(chain),
            Some(id) => id,
        };

        // Pass one: walk the headers backward to genesis.
        let mut headers: Vec<BlockHeader> = Vec::new();
        let mut cursor = head_id;
        loop {
            let header = match chain.storage.header(&cursor) {
                Ok(h) => h,
                Err(StorageError::NotFound) => return Err(ChainError::BlockMissing(cursor)),
                Err(e) => return Err(e.into()),
            };
            if let Some(child) = headers.last() {
                if header.depth + 1 != child.depth {
                    return Err(ChainError::DepthGap {
                        id: header.id,
                        want: child.depth - 1,
                        got: header.depth,
                    });
                }
            }
            let genesis_depth = header.depth == 0;
            if genesis_depth && !header.is_genesis() {
                return Err(ChainError::BadGenesisShape { id: header.id });
            }
            headers.push(header);
            if genesis_depth {
                break;
            }
            cursor = headers.last().expect("just pushed").prev_id;
        }

        let genesis = headers.last().expect("walk found genesis");
        if genesis.id != chain_id {
            return Err(ChainError::GenesisMismatch {
                id: genesis.id,
                expected: chain_id,
            });
        }

        // Pass two: forward over full blocks, through the validator.
        headers.reverse();
        info!(blocks = headers.len(), chain = %chain_id, "validating stored chain");
        for header in headers {
            let payload = match chain.storage.payload(&header.id) {
                Ok(p) => p,
                Err(StorageError::NotFound) => return Err(ChainError::BlockMissing(header.id)),
                Err(e) => return Err(e.into()),
            };
            let block = Block { header, payload };
            chain.accept(&block)?;
            chain.head = Some(block.header);
        }
        Ok(chain)
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn head(&self) -> Option<&BlockHeader> {
        self.head.as_ref()
    }

    pub fn validator(&self) -> &V {
        &self.validator
    }

    pub fn validator_mut(&mut self) -> &mut V {
        &mut self.validator
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Read-only header access for gossip and auditing.
    pub fn header(&self, id: &BlockId) -> Result<BlockHeader, StorageError> {
        self.storage.header(id)
    }

    pub fn payload(&self, id: &BlockId) -> Result<Vec<u8>, StorageError> {
        self.storage.payload(id)
    }

    /// All checks for the block at the next depth, no persistence.
    fn accept(&mut self, block: &Block) -> Result<(), ChainError> {
        let header = &block.header;
        match &self.head {
            None => {
                if !header.is_genesis() {
                    return Err(ChainError::DepthGap {
                        id: header.id,
                        want: 0,
                        got: header.depth,
                    });
                }
            }
            Some(head) => {
                if header.depth != head.depth + 1 {
                    return Err(ChainError::DepthGap {
                        id: header.id,
                        want: head.depth + 1,
                        got: header.depth,
                    });
                }
                if header.prev_id != head.id {
                    return Err(ChainError::BrokenLink { id: header.id });
                }
            }
        }
        if !block.check_payload_hash() {
            return Err(ChainError::PayloadMismatch { id: header.id });
        }
        header.validate(self.validator.work_level())?;
        self.validator
            .validate(block)
            .map_err(|source| ChainError::Rejected {
                id: header.id,
                depth: header.depth,
                source,
            })?;
        debug!(id = %header.id, depth = header.depth, "block accepted");
        Ok(())
    }

    /// Append a block: full validation, then persist and advance the head.
    pub fn add(&mut self, block: Block) -> Result<(), ChainError> {
        self.accept(&block)?;
        self.storage.write(&block)?;
        self.head = Some(block.header);
        Ok(())
    }

    /// Mint a proof of work over the payload at the next depth and append
    /// the result. Returns the new block id.
    pub fn mint_add(
        &mut self,
        payload_hint: u8,
        payload: Vec<u8>,
        epoch_seconds: u32,
        cancel: &Cancel,
    ) -> Result<BlockId, ChainError> {
        let mut block = Block::base(payload_hint, payload);
        block.header.epoch_seconds = epoch_seconds;
        if let Some(head) = &self.head {
            block.header.prev_id = head.id;
            block.header.depth = head.depth + 1;
        }
        block.header.mint(self.validator.work_level(), cancel)?;
        let id = block.header.id;
        self.add(block)?;
        Ok(id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Accepts everything; fixed work level.
    #[derive(Debug)]
    struct Permissive;

    impl BlockValidator for Permissive {
        fn validate(&mut self, _block: &Block) -> Result<(), ValidationError> {
            Ok(())
        }
        fn work_level(&self) -> u32 {
            4
        }
    }

    fn build_chain(blocks: usize) -> Chain<MemoryStore, Permissive> {
        let mut chain = Chain::open(MemoryStore::new(), BlockId::ZERO, Permissive).unwrap();
        let cancel = Cancel::new();
        for i in 0..blocks {
            let payload = format!("{{\"n\":{}}}\n", i).into_bytes();
            let id = chain
                .mint_add(1, payload, 1_600_000_000 + i as u32, &cancel)
                .unwrap();
            if i == 0 {
                // adopt the genesis id as the chain id for reopening
                chain.id = id;
            }
        }
        chain
    }

    #[test]
    fn mint_extends_depths() {
        let chain = build_chain(3);
        assert_eq!(chain.head().unwrap().depth, 2);
    }

    #[test]
    fn reopen_validates_everything() {
        let chain = build_chain(3);
        let (id, storage) = (chain.id(), chain.storage.clone());
        let reopened = Chain::open(storage, id, Permissive).unwrap();
        assert_eq!(reopened.head(), chain.head());
    }

    #[test]
    fn reopen_rejects_wrong_chain_id() {
        let chain = build_chain(2);
        let storage = chain.storage.clone();
        let err = Chain::open(storage, BlockId([9; 32]), Permissive).unwrap_err();
        assert!(matches!(err, ChainError::GenesisMismatch { .. }));
    }

    #[test]
    fn reopen_rejects_tampered_payload() {
        let chain = build_chain(3);
        let id = chain.id();
        let mut storage = chain.storage.clone();
        let head_id = storage.head().unwrap().unwrap();
        let mut block = storage.blocks.get(&head_id).unwrap().clone();
        block.payload[3] ^= 1;
        storage.blocks.insert(head_id, block);
        let err = Chain::open(storage, id, Permissive).unwrap_err();
        assert!(matches!(err, ChainError::PayloadMismatch { .. }));
    }

    #[test]
    fn add_rejects_depth_gap() {
        let mut chain = build_chain(2);
        let cancel = Cancel::new();
        let mut block = Block::base(1, b"{}\n".to_vec());
        block.header.depth = 5;
        block.header.prev_id = chain.head().unwrap().id;
        block.header.epoch_seconds = 1_600_000_100;
        block.header.mint(4, &cancel).unwrap();
        assert!(matches!(
            chain.add(block),
            Err(ChainError::DepthGap { want: 2, got: 5, .. })
        ));
    }

    #[test]
    fn add_rejects_broken_link() {
        let mut chain = build_chain(2);
        let cancel = Cancel::new();
        let mut block = Block::base(1, b"{}\n".to_vec());
        block.header.depth = 2;
        block.header.prev_id = BlockId([3; 32]);
        block.header.epoch_seconds = 1_600_000_100;
        block.header.mint(4, &cancel).unwrap();
        assert!(matches!(chain.add(block), Err(ChainError::BrokenLink { .. })));
    }

    #[test]
    fn add_rejects_insufficient_work() {
        let mut chain = build_chain(2);
        let mut block = Block::base(1, b"{}\n".to_vec());
        block.header.depth = 2;
        block.header.prev_id = chain.head().unwrap().id;
        block.header.epoch_seconds = 1_600_000_100;
        // search for a nonce whose id does NOT meet the level
        loop {
            let candidate = BlockHeader {
                id: block.header.compute_id(),
                ..block.header.clone()
            };
            if !candidate.check_proof_of_work(4) {
                block.header = candidate;
                break;
            }
            block.header.proof += 1;
        }
        assert!(matches!(
            chain.add(block),
            Err(ChainError::ProofOfWork { .. })
        ));
    }

    #[test]
    fn memory_store_head_ordering() {
        fn put(store: &mut MemoryStore, depth: u64, epoch: u32, tag: u8) -> BlockId {
            let mut block = Block::base(1, vec![tag]);
            block.header.depth = depth;
            block.header.epoch_seconds = epoch;
            block.header.id = BlockId([tag; 32]);
            store.write(&block).unwrap();
            block.header.id
        }

        let mut store = MemoryStore::new();
        put(&mut store, 0, 100, 1);
        put(&mut store, 1, 100, 9);
        let c = put(&mut store, 1, 100, 2);
        // same depth and epoch: lowest id wins
        assert_eq!(store.head().unwrap(), Some(c));
        let d = put(&mut store, 1, 200, 8);
        // higher epoch wins at equal depth
        assert_eq!(store.head().unwrap(), Some(d));
        let e = put(&mut store, 2, 50, 7);
        // depth dominates
        assert_eq!(store.head().unwrap(), Some(e));
    }
}

//! Bounded discrete-log recovery for decoding tallies.
//!
//! After threshold combination each candidate's result is `g^m` for some
//! `m` no larger than the turnout. Two strategies recover `m`, picked by
//! the expected bound. Small elections use an incremental walker that
//! caches every visited power of `g` in a map keyed by fixed-width
//! big-endian bytes, so repeated lookups are O(1). Large bounds would make
//! that table enormous (a 2048-bit entry per vote), so instead one sweep
//! over the exponent range matches the handful of per-candidate targets.

use std::collections::HashMap;

use num::traits::One;
use num::BigUint;

use super::group::Group;
use crate::cancel::Cancel;

/// Below this bound the cached walker is used; at or above it, the
/// targeted sweep.
pub const SPARSE_LIMIT: u64 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DlogError {
    #[error("discrete log recovery cancelled")]
    Cancelled,
    #[error("no exponent in [0, {max}] matches the combined tally")]
    ImpossibleTally { max: u64 },
}

/// A resolver for discrete logs of `g` bounded by `max`.
#[derive(Debug)]
pub struct DlogLookup {
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    Lazy(Walker),
    Resolved { found: Vec<(BigUint, u64)>, max: u64 },
}

impl DlogLookup {
    /// Build a resolver. `targets` matters only above [`SPARSE_LIMIT`],
    /// where the whole sweep happens here; the walker variant fills its
    /// cache on demand instead.
    pub fn new(
        group: &Group,
        max: u64,
        targets: &[BigUint],
        cancel: &Cancel,
    ) -> Result<DlogLookup, DlogError> {
        if max < SPARSE_LIMIT {
            return Ok(DlogLookup {
                inner: Inner::Lazy(Walker::new(group.clone(), max)),
            });
        }

        let mut found: Vec<Option<(BigUint, u64)>> = vec![None; targets.len()];
        let mut remaining = targets.len();
        let mut last = BigUint::one();
        let mut counter = 0_u64;
        while counter <= max && remaining > 0 {
            if cancel.is_cancelled() {
                return Err(DlogError::Cancelled);
            }
            for (i, t) in targets.iter().enumerate() {
                if found[i].is_none() && *t == last {
                    found[i] = Some((last.clone(), counter));
                    remaining -= 1;
                }
            }
            counter += 1;
            last = last * &group.g % &group.p;
        }
        if remaining > 0 {
            return Err(DlogError::ImpossibleTally { max });
        }
        Ok(DlogLookup {
            inner: Inner::Resolved {
                found: found.into_iter().map(Option::unwrap).collect(),
                max,
            },
        })
    }

    /// The `m` with `g^m == x`.
    pub fn resolve(&mut self, x: &BigUint, cancel: &Cancel) -> Result<u64, DlogError> {
        match &mut self.inner {
            Inner::Lazy(walker) => walker.resolve(x, cancel),
            Inner::Resolved { found, max } => found
                .iter()
                .find(|(value, _)| value == x)
                .map(|(_, log)| *log)
                .ok_or(DlogError::ImpossibleTally { max: *max }),
        }
    }
}

/// Incremental power-of-`g` walker with a byte-keyed cache.
#[derive(Debug)]
struct Walker {
    group: Group,
    max: u64,
    key_width: usize,
    cache: HashMap<Vec<u8>, u64>,
    last: BigUint,
    counter: u64,
}

impl Walker {
    fn new(group: Group, max: u64) -> Walker {
        let key_width = ((group.p.bits() + 7) / 8) as usize;
        let mut walker = Walker {
            group,
            max,
            key_width,
            cache: HashMap::new(),
            last: BigUint::one(),
            counter: 0,
        };
        let key = walker.key(&BigUint::one());
        walker.cache.insert(key, 0);
        walker
    }

    /// Fixed-width big-endian bytes; `BigUint` itself hashes fine but the
    /// padded form keeps every key the same size as the modulus.
    fn key(&self, x: &BigUint) -> Vec<u8> {
        let bytes = x.to_bytes_be();
        let mut key = vec![0_u8; self.key_width];
        key[self.key_width - bytes.len()..].copy_from_slice(&bytes);
        key
    }

    fn resolve(&mut self, x: &BigUint, cancel: &Cancel) -> Result<u64, DlogError> {
        let wanted = self.key(x);
        if let Some(&log) = self.cache.get(&wanted) {
            return Ok(log);
        }
        while self.counter < self.max {
            if cancel.is_cancelled() {
                return Err(DlogError::Cancelled);
            }
            self.counter += 1;
            self.last = &self.last * &self.group.g % &self.group.p;
            let key = self.key(&self.last);
            self.cache.insert(key.clone(), self.counter);
            if key == wanted {
                return Ok(self.counter);
            }
        }
        Err(DlogError::ImpossibleTally { max: self.max })
    }
}

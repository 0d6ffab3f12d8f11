// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{KvStore, Result, StateView, WriteSet};
use hash::keccak;
use pexec_primitives::{Bytes, H256};
use rlp::RlpStream;
use std::collections::BTreeMap;

pub type StateRoot = H256;

/// An immutable-once-committed key/value state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot(BTreeMap<Bytes, Bytes>);

impl Snapshot {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Bytes)> {
        self.0.iter()
    }

    pub fn get_ref(&self, key: &[u8]) -> Option<&Bytes> { self.0.get(key) }

    /// Returns a copy with `writes` applied.
    pub fn with_writes(&self, writes: WriteSet) -> Snapshot {
        let mut next = self.clone();
        next.apply(writes);
        next
    }

    pub fn state_root(&self) -> StateRoot { state_root(self) }
}

impl StateView for Snapshot {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.0.get(key).cloned())
    }
}

impl KvStore for Snapshot {
    fn set(&mut self, key: Bytes, value: Bytes) { self.0.insert(key, value); }

    fn delete(&mut self, key: Bytes) { self.0.remove(&key); }
}

impl FromIterator<(Bytes, Bytes)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (Bytes, Bytes)>>(iter: I) -> Self {
        Snapshot(iter.into_iter().collect())
    }
}

/// Keccak over the RLP list of sorted `[key, value]` pairs.
pub fn state_root(snapshot: &Snapshot) -> StateRoot {
    let mut stream = RlpStream::new_list(snapshot.len());
    for (key, value) in snapshot.iter() {
        stream.begin_list(2).append(key).append(value);
    }
    keccak(stream.out())
}

// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use pexec_primitives::Bytes;
use std::collections::{btree_map, BTreeMap};

/// Keys written by one execution attempt, `None` marking a deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSet(BTreeMap<Bytes, Option<Bytes>>);

impl WriteSet {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, key: Bytes, value: Option<Bytes>) {
        self.0.insert(key, value);
    }

    pub fn get(&self, key: &[u8]) -> Option<&Option<Bytes>> { self.0.get(key) }

    pub fn contains_key(&self, key: &[u8]) -> bool { self.0.contains_key(key) }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn keys(&self) -> impl Iterator<Item = &Bytes> { self.0.keys() }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Option<Bytes>)> {
        self.0.iter()
    }

    /// Layers `later` over `self`.
    pub fn extend(&mut self, later: WriteSet) { self.0.extend(later.0); }
}

impl IntoIterator for WriteSet {
    type IntoIter = btree_map::IntoIter<Bytes, Option<Bytes>>;
    type Item = (Bytes, Option<Bytes>);

    fn into_iter(self) -> Self::IntoIter { self.0.into_iter() }
}

impl FromIterator<(Bytes, Option<Bytes>)> for WriteSet {
    fn from_iter<I: IntoIterator<Item = (Bytes, Option<Bytes>)>>(
        iter: I,
    ) -> Self {
        WriteSet(iter.into_iter().collect())
    }
}

/// Keys read from outside an execution attempt, with the value first
/// observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadSet(BTreeMap<Bytes, Option<Bytes>>);

impl ReadSet {
    pub fn new() -> Self { Self::default() }

    /// Keeps the first observation of `key`.
    pub fn record(&mut self, key: &[u8], value: &Option<Bytes>) {
        if !self.0.contains_key(key) {
            self.0.insert(key.to_vec(), value.clone());
        }
    }

    pub fn contains_key(&self, key: &[u8]) -> bool { self.0.contains_key(key) }

    pub fn observed(&self, key: &[u8]) -> Option<&Option<Bytes>> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn keys(&self) -> impl Iterator<Item = &Bytes> { self.0.keys() }

    /// Union, keeping the earliest observation of every key.
    pub fn union(&mut self, other: &ReadSet) {
        for (key, value) in &other.0 {
            self.record(key, value);
        }
    }
}

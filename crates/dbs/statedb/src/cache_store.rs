// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{KvStore, ReadSet, Result, StateView, WriteSet};
use parking_lot::Mutex;
use pexec_primitives::Bytes;
use std::collections::BTreeMap;

/// A copy-on-write view over a parent state. Writes stay in the view until
/// handed to the parent; every read that falls through to the parent is
/// recorded. Views nest: a view over a view records the fall-through reads
/// in both, so the outermost view holds the reads of the whole attempt.
pub struct CacheStore<'a> {
    parent: &'a dyn StateView,
    dirty: BTreeMap<Bytes, Option<Bytes>>,
    reads: Mutex<ReadSet>,
}

impl<'a> CacheStore<'a> {
    pub fn new(parent: &'a dyn StateView) -> Self {
        CacheStore {
            parent,
            dirty: BTreeMap::new(),
            reads: Mutex::new(ReadSet::new()),
        }
    }

    pub fn parent(&self) -> &'a dyn StateView { self.parent }

    pub fn is_dirty(&self) -> bool { !self.dirty.is_empty() }

    pub fn write_set(&self) -> WriteSet {
        self.dirty
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn read_set(&self) -> ReadSet { self.reads.lock().clone() }

    pub fn into_writes(self) -> WriteSet { self.dirty.into_iter().collect() }

    pub fn into_parts(self) -> (WriteSet, ReadSet) {
        (self.dirty.into_iter().collect(), self.reads.into_inner())
    }
}

impl<'a> StateView for CacheStore<'a> {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        if let Some(value) = self.dirty.get(key) {
            return Ok(value.clone());
        }
        let value = self.parent.get(key)?;
        self.reads.lock().record(key, &value);
        Ok(value)
    }
}

impl<'a> KvStore for CacheStore<'a> {
    fn set(&mut self, key: Bytes, value: Bytes) {
        self.dirty.insert(key, Some(value));
    }

    fn delete(&mut self, key: Bytes) { self.dirty.insert(key, None); }
}

// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{Result, Snapshot, StateView, WriteSet};
use parking_lot::RwLock;
use pexec_primitives::Bytes;
use std::sync::Arc;

/// The state of the block being executed: the pre-block snapshot plus the
/// writes of every transaction accepted so far. Concurrent readers see
/// either all or none of one accepted transaction's writes.
pub struct BlockState {
    base: Arc<Snapshot>,
    overlay: RwLock<WriteSet>,
}

impl BlockState {
    pub fn new(base: Arc<Snapshot>) -> Self {
        BlockState {
            base,
            overlay: RwLock::new(WriteSet::new()),
        }
    }

    /// The pre-block snapshot, unaffected by accepted writes.
    pub fn base(&self) -> &Arc<Snapshot> { &self.base }

    pub fn apply(&self, writes: WriteSet) {
        if writes.is_empty() {
            return;
        }
        self.overlay.write().extend(writes);
    }

    pub fn pending_writes(&self) -> WriteSet { self.overlay.read().clone() }

    pub fn into_writes(self) -> WriteSet { self.overlay.into_inner() }
}

impl StateView for BlockState {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        if let Some(value) = self.overlay.read().get(key) {
            return Ok(value.clone());
        }
        self.base.get(key)
    }
}

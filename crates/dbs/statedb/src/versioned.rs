// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{Error, Result, Snapshot, StateRoot, WriteSet};
use std::{collections::BTreeMap, sync::Arc};

/// Committed states by height. Only the latest `history` heights are kept
/// for historical reads.
pub struct VersionedStore {
    states: BTreeMap<u64, Arc<Snapshot>>,
    latest: u64,
    history: u64,
}

impl VersionedStore {
    pub fn new(genesis: Snapshot, history: u64) -> Self {
        let mut states = BTreeMap::new();
        states.insert(0, Arc::new(genesis));
        VersionedStore {
            states,
            latest: 0,
            history: history.max(1),
        }
    }

    pub fn latest_height(&self) -> u64 { self.latest }

    pub fn earliest_height(&self) -> u64 {
        self.states.keys().next().copied().unwrap_or(self.latest)
    }

    /// The latest height is never pruned; a store without it is corrupt.
    pub fn latest(&self) -> Arc<Snapshot> {
        match self.states.get(&self.latest) {
            Some(state) => state.clone(),
            None => {
                error!("state of latest height {} is missing", self.latest);
                panic!("corrupt versioned store: no state at latest height");
            }
        }
    }

    pub fn state_at(&self, height: u64) -> Result<Arc<Snapshot>> {
        if height > self.latest {
            return Err(Error::UnknownHeight {
                height,
                latest: self.latest,
            });
        }
        self.states
            .get(&height)
            .cloned()
            .ok_or_else(|| Error::PrunedHeight {
                height,
                earliest: self.earliest_height(),
            })
    }

    pub fn commit(
        &mut self, height: u64, writes: WriteSet,
    ) -> Result<StateRoot> {
        if height != self.latest + 1 {
            return Err(Error::NonSequentialHeight {
                got: height,
                latest: self.latest,
            });
        }
        let next = self.latest().with_writes(writes);
        let root = next.state_root();
        self.states.insert(height, Arc::new(next));
        self.latest = height;

        let keep_from = (height + 1).saturating_sub(self.history);
        let pruned: Vec<u64> =
            self.states.range(..keep_from).map(|(h, _)| *h).collect();
        for h in &pruned {
            self.states.remove(h);
        }
        if !pruned.is_empty() {
            debug!(
                "pruned {} states below height {}",
                pruned.len(),
                keep_from
            );
        }
        Ok(root)
    }
}

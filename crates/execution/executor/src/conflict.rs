// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::error::RerunReason;
use pexec_primitives::Bytes;
use pexec_statedb::{ReadSet, WriteSet};
use rustc_hex::ToHex;
use std::collections::{HashMap, HashSet};

/// Remembers, for every key written in the block so far, the index of the
/// last accepted transaction that wrote it. Every write a transaction makes
/// is tracked; the exempt keys are the only ones the block may change
/// outside of any transaction, when the fee collector is credited.
#[derive(Debug, Default)]
pub struct ConflictTracker {
    last_writer: HashMap<Bytes, usize>,
    exempt: HashSet<Bytes>,
}

impl ConflictTracker {
    pub fn new(exempt: impl IntoIterator<Item = Bytes>) -> Self {
        ConflictTracker {
            last_writer: HashMap::new(),
            exempt: exempt.into_iter().collect(),
        }
    }

    pub fn is_exempt(&self, key: &[u8]) -> bool { self.exempt.contains(key) }

    pub fn record(&mut self, index: usize, writes: &WriteSet) {
        for key in writes.keys() {
            self.last_writer.insert(key.clone(), index);
        }
    }

    /// First key of a write made outside of any transaction that is not
    /// exempt. Such a write is invisible to the conflict checks.
    pub fn unexempt_key<'w>(
        &self, writes: &'w WriteSet,
    ) -> Option<&'w Bytes> {
        writes.keys().find(|key| !self.exempt.contains(*key))
    }

    /// Checks an attempt that saw the writes of transactions up to
    /// `visible_upto` (none if it read the pre-block state) against the
    /// writes accepted since.
    pub fn check(
        &self, reads: &ReadSet, visible_upto: Option<usize>,
    ) -> Option<RerunReason> {
        self.first_unseen_write(reads, |writer| {
            visible_upto.map_or(false, |upto| writer <= upto)
        })
    }

    /// Checks an attempt that read the pre-block state plus the writes of
    /// the transactions in `seen`, each accepted exactly as it was seen.
    pub fn check_seen(
        &self, reads: &ReadSet, seen: &[usize],
    ) -> Option<RerunReason> {
        self.first_unseen_write(reads, |writer| seen.contains(&writer))
    }

    fn first_unseen_write(
        &self, reads: &ReadSet, visible: impl Fn(usize) -> bool,
    ) -> Option<RerunReason> {
        reads.keys().find_map(|key| {
            let writer = *self.last_writer.get(key)?;
            if visible(writer) {
                None
            } else {
                Some(RerunReason::Conflict {
                    key: key.to_hex(),
                    writer,
                })
            }
        })
    }

    pub fn written_keys(&self) -> usize { self.last_writer.len() }
}

// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

extern crate keccak_hash as hash;
#[macro_use]
extern crate log;

mod block_state;
mod cache_store;
mod error;
mod rw_set;
mod snapshot;
mod statedb_ext;
mod versioned;

#[cfg(test)]
mod tests;

pub use self::{
    block_state::BlockState,
    cache_store::CacheStore,
    error::{Error, Result},
    rw_set::{ReadSet, WriteSet},
    snapshot::{state_root, Snapshot, StateRoot},
    statedb_ext::{KvStoreExt, StateViewExt},
    versioned::VersionedStore,
};
pub use pexec_primitives::Bytes;

/// Read access to a key/value state. Implementations are shared between
/// concurrently running executions.
pub trait StateView: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    fn has(&self, key: &[u8]) -> Result<bool> { Ok(self.get(key)?.is_some()) }
}

/// A state that can also be written.
pub trait KvStore: StateView {
    fn set(&mut self, key: Bytes, value: Bytes);

    fn delete(&mut self, key: Bytes);

    /// Applies `writes` on top of the current content, later entries win.
    fn apply(&mut self, writes: WriteSet) {
        for (key, value) in writes.into_iter() {
            match value {
                Some(value) => self.set(key, value),
                None => self.delete(key),
            }
        }
    }
}

// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{KvStore, Result, StateView};
use rlp::{Decodable, Encodable};

pub trait StateViewExt {
    fn get_decoded<T: Decodable>(&self, key: &[u8]) -> Result<Option<T>>;
}

pub trait KvStoreExt {
    fn set_encoded<T: Encodable>(&mut self, key: Vec<u8>, value: &T);
}

impl<S: StateView + ?Sized> StateViewExt for S {
    fn get_decoded<T: Decodable>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.get(key)? {
            None => Ok(None),
            Some(raw) => Ok(Some(rlp::decode(&raw)?)),
        }
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {
    fn set_encoded<T: Encodable>(&mut self, key: Vec<u8>, value: &T) {
        self.set(key, rlp::encode(value).to_vec());
    }
}

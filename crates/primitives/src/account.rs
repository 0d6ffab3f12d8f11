// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{coin::Coins, Bytes};
use ethereum_types::Address;
use rlp_derive::{RlpDecodable, RlpEncodable};

pub const ACCOUNT_KEY_PREFIX: &[u8] = b"acc/";

/// Store key of the account of `address`.
pub fn account_key(address: &Address) -> Bytes {
    let mut key = Vec::with_capacity(ACCOUNT_KEY_PREFIX.len() + 20);
    key.extend_from_slice(ACCOUNT_KEY_PREFIX);
    key.extend_from_slice(address.as_bytes());
    key
}

#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Account {
    pub nonce: u64,
    pub balance: Coins,
}

impl Account {
    pub fn new(nonce: u64, balance: Coins) -> Self {
        Account { nonce, balance }
    }
}

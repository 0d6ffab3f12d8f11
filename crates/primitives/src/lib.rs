// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

//! Value types shared by the state layer and the execution engine: coins,
//! transactions and their messages, accounts, events and per-transaction
//! responses.

extern crate rlp;

pub mod account;
pub mod coin;
pub mod event;
pub mod receipt;
pub mod transaction;

pub use crate::{
    account::{account_key, Account, ACCOUNT_KEY_PREFIX},
    coin::{Coin, Coins, CoinsError},
    event::{Attribute, Event},
    receipt::{GasInfo, TxResponse, CODESPACE_ROOT, CODE_OK},
    transaction::{Msg, Transaction},
};
pub use ethereum_types::{Address, H256};

/// Raw bytes of a key or value in the key/value store.
pub type Bytes = Vec<u8>;

// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{event::Event, Bytes};
use rlp_derive::{RlpDecodable, RlpEncodable};

pub const CODE_OK: u32 = 0;
/// Codespace of errors raised by the engine itself rather than a module.
pub const CODESPACE_ROOT: &str = "sdk";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasInfo {
    pub gas_wanted: u64,
    pub gas_used: u64,
}

/// Outcome of one transaction as handed back to consensus.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable,
)]
pub struct TxResponse {
    pub code: u32,
    pub codespace: String,
    pub log: String,
    pub data: Bytes,
    pub gas_wanted: u64,
    pub gas_used: u64,
    pub events: Vec<Event>,
}

impl TxResponse {
    pub fn is_ok(&self) -> bool { self.code == CODE_OK }

    pub fn gas_info(&self) -> GasInfo {
        GasInfo {
            gas_wanted: self.gas_wanted,
            gas_used: self.gas_used,
        }
    }
}

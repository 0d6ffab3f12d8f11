// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use rlp::DecoderError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Decoder(#[from] DecoderError),

    #[error("height {height} has not been produced yet, latest is {latest}")]
    UnknownHeight { height: u64, latest: u64 },

    #[error("height {height} is pruned, earliest kept is {earliest}")]
    PrunedHeight { height: u64, earliest: u64 },

    #[error("commit height {got} does not follow latest height {latest}")]
    NonSequentialHeight { got: u64, latest: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;

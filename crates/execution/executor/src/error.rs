// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::gas::OutOfGas;
use pexec_primitives::CODESPACE_ROOT;
use thiserror::Error;

pub mod codes {
    pub const INTERNAL: u32 = 1;
    pub const TX_DECODE: u32 = 2;
    pub const INSUFFICIENT_FUNDS: u32 = 5;
    pub const UNKNOWN_REQUEST: u32 = 6;
    pub const OUT_OF_GAS: u32 = 11;
    pub const INVALID_REQUEST: u32 = 18;
    pub const INVALID_HEIGHT: u32 = 26;
    pub const INVALID_SEQUENCE: u32 = 32;
    pub const PANIC: u32 = 111222;
}

/// Why one transaction failed. Everything except `Aborted` ends up in the
/// transaction's response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("tx parse error: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("invalid height: {0}")]
    InvalidHeight(String),

    #[error("ante handler failed: {0}")]
    Ante(Box<ExecError>),

    #[error("failed to execute message; message index: {index}: {source}")]
    MessageExecution {
        index: usize,
        #[source]
        source: Box<ExecError>,
    },

    #[error("unknown route: {0}")]
    UnknownRoute(String),

    /// An application-defined failure.
    #[error("{log}")]
    App {
        codespace: String,
        code: u32,
        log: String,
    },

    #[error(
        "out of gas in location: {}; gasWanted: {}, gasUsed: {}",
        .0.descriptor, .0.limit, .0.consumed
    )]
    OutOfGas(OutOfGas),

    #[error("out of block gas")]
    OutOfBlockGas,

    #[error("panic: {message}")]
    Panic { message: String },

    /// The block was stopped before this transaction could run.
    #[error("execution aborted")]
    Aborted,

    #[error(transparent)]
    Store(#[from] pexec_statedb::Error),
}

impl ExecError {
    pub fn app(
        codespace: impl Into<String>, code: u32, log: impl Into<String>,
    ) -> Self {
        ExecError::App {
            codespace: codespace.into(),
            code,
            log: log.into(),
        }
    }

    /// The error a stage wrapper was attached to.
    pub fn root_cause(&self) -> &ExecError {
        match self {
            ExecError::Ante(inner) => inner.root_cause(),
            ExecError::MessageExecution { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// `(codespace, code)` reported in the transaction response.
    pub fn abci_code(&self) -> (String, u32) {
        use codes::*;
        let code = match self.root_cause() {
            ExecError::App { codespace, code, .. } => {
                return (codespace.clone(), *code)
            }
            ExecError::Decode(_) => TX_DECODE,
            ExecError::Validation(_) => INVALID_REQUEST,
            ExecError::InvalidHeight(_) => INVALID_HEIGHT,
            ExecError::UnknownRoute(_) => UNKNOWN_REQUEST,
            ExecError::OutOfGas(_) | ExecError::OutOfBlockGas => OUT_OF_GAS,
            ExecError::Panic { .. } => PANIC,
            ExecError::Aborted
            | ExecError::Store(_)
            | ExecError::Ante(_)
            | ExecError::MessageExecution { .. } => INTERNAL,
        };
        (CODESPACE_ROOT.to_string(), code)
    }

    pub fn is_out_of_gas(&self) -> bool {
        matches!(self.root_cause(), ExecError::OutOfGas(_))
    }

    pub fn is_panic(&self) -> bool {
        matches!(self.root_cause(), ExecError::Panic { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.root_cause(), ExecError::Aborted)
    }
}

/// Why a speculative or concurrently prepared result was thrown away. Never
/// part of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RerunReason {
    /// `key` was read before transaction `writer` committed a write to it.
    Conflict { key: String, writer: usize },
    BlockGasOverflow,
    Panicked,
    /// An earlier transaction of the same sender was still in flight.
    SenderHazard,
    /// The attempt ran on the writes of an earlier transaction of the same
    /// sender, which then ran again.
    SenderRerun { previous: usize },
}

#[derive(Error, Debug)]
pub enum BlockError {
    #[error("block execution stopped")]
    Stopped,

    #[error("no block has been begun")]
    NotBegun,

    #[error("block {0} has already been delivered")]
    AlreadyDelivered(u64),

    #[error("block {0} has not been delivered")]
    NotDelivered(u64),

    #[error("unexpected block height {got}, expected {expected}")]
    UnexpectedHeight { expected: u64, got: u64 },

    #[error("failed to update the fee collector: {0}")]
    FeeCollector(ExecError),

    #[error("failed to build execution thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] pexec_statedb::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_root_cause() {
        let err = ExecError::MessageExecution {
            index: 1,
            source: Box::new(ExecError::app("bank", 10, "boom")),
        };
        assert_eq!(err.abci_code(), ("bank".to_string(), 10));
        assert_eq!(
            err.to_string(),
            "failed to execute message; message index: 1: boom"
        );

        let err = ExecError::Ante(Box::new(ExecError::OutOfGas(OutOfGas {
            descriptor: "ReadFlat".into(),
            limit: 10,
            consumed: 11,
        })));
        assert!(err.is_out_of_gas());
        assert_eq!(err.abci_code(), (CODESPACE_ROOT.to_string(), 11));
    }
}

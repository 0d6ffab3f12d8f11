// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

//! Concurrent transaction execution: a single-transaction pipeline
//! parameterized by execution mode, and three block schedulers built on it
//! (sequential, speculative whole-block, bounded sender-aware window) that
//! all produce the outcome of executing the block in order.

extern crate keccak_hash as hash;
#[macro_use]
extern crate log;

/// Per-block result assembly and execution statistics.
pub mod block_result;

/// Transaction decoding and fee/sender/class extraction.
pub mod classifier;

pub mod config;

/// Key-level write tracking used to validate speculative reads.
pub mod conflict;

/// The capabilities an application provides, and the context they run in.
pub mod context;

/// Block lifecycle facade over the schedulers and the versioned state.
pub mod engine;

pub mod error;

/// Single-transaction execution pipeline.
pub mod executive;

/// Per-block fee accumulation and the single fee collector update.
pub mod fee_ledger;

pub mod gas;

mod guard;

pub mod mode;

pub mod router;

pub mod scheduler;

/// Per-sender ordering hazards between in-flight transactions.
pub mod sender_queue;

#[cfg(any(test, feature = "testonly_code"))]
pub mod mock_app;

pub use block_result::{BlockResult, BlockResultAssembler, ExecutionStats};
pub use classifier::{TxEnvelope, TxInfo};
pub use config::{ConfigError, ExecutionConfig, GasConfig};
pub use context::{Application, BlockEnv, MsgResult, TxContext};
pub use engine::Engine;
pub use error::{BlockError, ExecError, RerunReason};
pub use executive::{
    ExecutionOutcome, ExecutiveContext, StopHandle, TxOutcome,
};
pub use fee_ledger::FeeLedger;
pub use gas::{BlockGasMeter, GasMeter, OutOfGas};
pub use mode::{ExecutionMode, Strategy};
pub use router::{MsgHandler, MsgRouter};

// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::error::ExecError;
use pexec_primitives::{Bytes, Coins, Event, GasInfo, TxResponse, CODE_OK};
use pexec_statedb::{ReadSet, WriteSet};

/// Fee paid by a transaction whose ante check passed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeeCharge {
    pub charged: Coins,
    pub refunded: Coins,
}

impl FeeCharge {
    /// Amount owed to the fee collector. A refund larger than the charge is
    /// an application bug.
    pub fn net(&self) -> Coins {
        match self.charged.checked_sub(&self.refunded) {
            Ok(net) => net,
            Err(e) => {
                error!(
                    "refund {} exceeds fee {}",
                    self.refunded, self.charged
                );
                panic!("refund exceeds the charged fee: {}", e);
            }
        }
    }
}

/// A transaction that went through message execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executed {
    pub gas_wanted: u64,
    pub gas_used: u64,
    /// Ante writes, plus message and refund writes when the messages
    /// succeeded.
    pub writes: WriteSet,
    pub fee: FeeCharge,
    pub data: Bytes,
    pub log: String,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Rejected without touching state or charging a fee.
    NotExecuted { error: ExecError, gas: GasInfo },
    /// Messages failed; ante writes stand and the fee is charged.
    ExecutionErrorChargeFee(ExecError, Executed),
    Finished(Executed),
}
use ExecutionOutcome::*;

impl ExecutionOutcome {
    pub fn executed(&self) -> Option<&Executed> {
        match self {
            NotExecuted { .. } => None,
            ExecutionErrorChargeFee(_, executed) | Finished(executed) => {
                Some(executed)
            }
        }
    }

    pub fn error(&self) -> Option<&ExecError> {
        match self {
            NotExecuted { error, .. } | ExecutionErrorChargeFee(error, _) => {
                Some(error)
            }
            Finished(_) => None,
        }
    }

    pub fn gas_info(&self) -> GasInfo {
        match self {
            NotExecuted { gas, .. } => *gas,
            ExecutionErrorChargeFee(_, executed) | Finished(executed) => {
                GasInfo {
                    gas_wanted: executed.gas_wanted,
                    gas_used: executed.gas_used,
                }
            }
        }
    }

    pub fn fee(&self) -> Option<&FeeCharge> {
        self.executed().map(|executed| &executed.fee)
    }

    pub fn writes(&self) -> Option<&WriteSet> {
        self.executed().map(|executed| &executed.writes)
    }

    pub fn into_writes(self) -> WriteSet {
        match self {
            NotExecuted { .. } => WriteSet::new(),
            ExecutionErrorChargeFee(_, executed) | Finished(executed) => {
                executed.writes
            }
        }
    }

    pub fn make_response(&self) -> TxResponse {
        let GasInfo {
            gas_wanted,
            gas_used,
        } = self.gas_info();
        match self {
            Finished(executed) => TxResponse {
                code: CODE_OK,
                codespace: String::new(),
                log: executed.log.clone(),
                data: executed.data.clone(),
                gas_wanted,
                gas_used,
                events: executed.events.clone(),
            },
            NotExecuted { error, .. } => {
                error_response(error, gas_wanted, gas_used, vec![])
            }
            ExecutionErrorChargeFee(error, executed) => error_response(
                error,
                gas_wanted,
                gas_used,
                executed.events.clone(),
            ),
        }
    }
}

fn error_response(
    error: &ExecError, gas_wanted: u64, gas_used: u64, events: Vec<Event>,
) -> TxResponse {
    let (codespace, code) = error.abci_code();
    TxResponse {
        code,
        codespace,
        log: error.to_string(),
        data: Bytes::new(),
        gas_wanted,
        gas_used,
        events,
    }
}

/// Result of one execution attempt of the transaction at `index`, with
/// everything the attempt read from outside its own writes.
#[derive(Debug, Clone)]
pub struct TxOutcome {
    pub index: usize,
    pub outcome: ExecutionOutcome,
    pub reads: ReadSet,
}

impl TxOutcome {
    pub fn not_executed(
        index: usize, error: ExecError, gas: GasInfo, reads: ReadSet,
    ) -> Self {
        TxOutcome {
            index,
            outcome: NotExecuted { error, gas },
            reads,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.outcome.error().map_or(false, ExecError::is_aborted)
    }

    pub fn panicked(&self) -> bool {
        self.outcome.error().map_or(false, ExecError::is_panic)
    }

    /// Gas to charge against the block meter.
    pub fn block_gas(&self) -> u64 {
        self.outcome.executed().map_or(0, |executed| executed.gas_used)
    }

    pub fn response(&self) -> TxResponse { self.outcome.make_response() }
}

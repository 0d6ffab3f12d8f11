// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

//! Block schedulers. Each one drives the single-transaction pipeline over
//! the transactions of a block and must produce exactly the responses and
//! state of executing them one by one in block order.

mod bounded;
mod serial;
mod speculative;

pub use bounded::BoundedScheduler;
pub use serial::SerialScheduler;
pub use speculative::SpeculativeScheduler;

use crate::{
    block_result::{BlockResult, BlockResultAssembler},
    classifier::{classify, TxEnvelope},
    config::GasConfig,
    conflict::ConflictTracker,
    context::{Application, BlockEnv},
    error::{BlockError, ExecError},
    executive::{ExecutiveContext, StopHandle, TxOutcome},
    fee_ledger::FeeLedger,
    gas::BlockGasMeter,
    guard::guarded,
    mode::{ExecutionMode, Strategy},
};
use parking_lot::Mutex;
use pexec_primitives::{Bytes, GasInfo};
use pexec_statedb::{BlockState, ReadSet};

pub trait Scheduler {
    fn strategy(&self) -> Strategy;

    /// Executes `raw_txs` on `block`, leaving one response per transaction
    /// in its assembler. Fails only if the block was stopped.
    fn execute_block<A: Application + ?Sized>(
        &self, block: &BlockContext<'_, A>, raw_txs: &[Bytes],
    ) -> Result<(), BlockError>;
}

/// Everything shared by the transactions of one block while it is being
/// delivered.
pub struct BlockContext<'a, A: ?Sized> {
    pub app: &'a A,
    pub env: &'a BlockEnv,
    pub gas_config: &'a GasConfig,
    pub stop: &'a StopHandle,
    pub state: &'a BlockState,
    pub block_gas: BlockGasMeter,
    pub ledger: FeeLedger,
    pub conflicts: Mutex<ConflictTracker>,
    pub assembler: Mutex<BlockResultAssembler>,
}

impl<'a, A: Application + ?Sized> BlockContext<'a, A> {
    pub fn new(
        app: &'a A, env: &'a BlockEnv, gas_config: &'a GasConfig,
        stop: &'a StopHandle, state: &'a BlockState, strategy: Strategy,
        txs: usize, exempt_keys: Vec<Bytes>,
    ) -> Self {
        let exempt = exempt_keys.into_iter().chain(app.conflict_exempt_keys());
        BlockContext {
            app,
            env,
            gas_config,
            stop,
            state,
            block_gas: BlockGasMeter::new(env.max_gas),
            ledger: FeeLedger::new(),
            conflicts: Mutex::new(ConflictTracker::new(exempt)),
            assembler: Mutex::new(BlockResultAssembler::new(strategy, txs)),
        }
    }

    pub fn executive(&self, mode: ExecutionMode) -> ExecutiveContext<'a, A> {
        ExecutiveContext::new(
            self.app,
            self.env,
            self.gas_config,
            mode,
            self.stop,
        )
    }

    /// Decodes the transaction at `index`. A panicking decoder counts as a
    /// failed decode of that transaction only.
    pub fn classify(
        &self, index: usize, raw: &[u8],
    ) -> Result<TxEnvelope, ExecError> {
        guarded(|| classify(self.app, index, raw))
    }

    /// Serial re-execution of the transaction against the block state as
    /// committed so far.
    pub fn rerun(&self, envelope: &TxEnvelope) -> TxOutcome {
        self.executive(ExecutionMode::Deliver).transact(
            envelope,
            self.state,
            Some(&self.block_gas),
        )
    }

    /// Makes an accepted outcome part of the block: its writes become
    /// visible to later transactions, its fee goes to the ledger and its
    /// response to the assembler.
    pub fn commit_outcome(&self, outcome: TxOutcome) {
        let response = outcome.response();
        let index = outcome.index;
        if let Some(fee) = outcome.outcome.fee() {
            self.ledger.record(fee);
        }
        let writes = outcome.outcome.into_writes();
        self.conflicts.lock().record(index, &writes);
        self.state.apply(writes);
        self.assembler.lock().push(index, response);
    }

    /// A transaction that could not be decoded gets a response and
    /// nothing else.
    pub fn commit_undecodable(&self, index: usize, error: ExecError) {
        debug!("tx #{} could not be decoded: {}", index, error);
        let outcome = TxOutcome::not_executed(
            index,
            error,
            GasInfo::default(),
            ReadSet::new(),
        );
        self.assembler.lock().push(index, outcome.response());
    }

    /// Credits the fee collector and collects the responses.
    pub fn finish(self) -> Result<BlockResult, BlockError> {
        let fees = self
            .ledger
            .flush(self.app, self.state, &self.conflicts.lock())
            .map_err(BlockError::FeeCollector)?;
        let result = self.assembler.into_inner().finish(
            self.env.height,
            self.block_gas.consumed(),
            fees,
        );
        result.stats.log_summary(result.height);
        Ok(result)
    }
}

// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

pub mod execution_outcome;
mod fresh_executive;
mod pre_checked_executive;

pub use execution_outcome::{Executed, ExecutionOutcome, FeeCharge, TxOutcome};
pub use fresh_executive::FreshExecutive;
pub use pre_checked_executive::{AnteOutcome, PreCheckedExecutive};

use crate::{
    classifier::TxEnvelope, config::GasConfig, context::BlockEnv,
    error::ExecError, gas::BlockGasMeter, mode::ExecutionMode, Application,
};
use pexec_statedb::{Snapshot, StateView, VersionedStore};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Block-level stop signal, observed before the ante and before the
/// messages of every transaction.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self { Self::default() }

    pub fn stop(&self) { self.0.store(true, Ordering::SeqCst); }

    pub fn reset(&self) { self.0.store(false, Ordering::SeqCst); }

    pub fn is_stopped(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

/// Everything a transaction execution needs besides the transaction and
/// the state it reads.
pub struct ExecutiveContext<'a, A: ?Sized> {
    pub app: &'a A,
    pub env: &'a BlockEnv,
    pub gas_config: &'a GasConfig,
    pub mode: ExecutionMode,
    pub stop: &'a StopHandle,
}

impl<'a, A: ?Sized> Clone for ExecutiveContext<'a, A> {
    fn clone(&self) -> Self { *self }
}

impl<'a, A: ?Sized> Copy for ExecutiveContext<'a, A> {}

impl<'a, A: Application + ?Sized> ExecutiveContext<'a, A> {
    pub fn new(
        app: &'a A, env: &'a BlockEnv, gas_config: &'a GasConfig,
        mode: ExecutionMode, stop: &'a StopHandle,
    ) -> Self {
        ExecutiveContext {
            app,
            env,
            gas_config,
            mode,
            stop,
        }
    }

    pub fn with_mode(self, mode: ExecutionMode) -> Self {
        ExecutiveContext { mode, ..self }
    }

    /// Runs the whole pipeline for one transaction against `parent`.
    pub fn transact(
        self, envelope: &'a TxEnvelope, parent: &dyn StateView,
        block_gas: Option<&BlockGasMeter>,
    ) -> TxOutcome {
        let outcome = match self.run_ante(envelope, parent, block_gas) {
            Ok(executive) => executive.execute_transaction(parent, block_gas),
            Err(outcome) => outcome,
        };
        trace!(
            "tx #{} {:?} in {} mode: {:?}",
            envelope.index,
            envelope.hash,
            self.mode,
            outcome.outcome.gas_info()
        );
        outcome
    }

    /// The stages up to and including the ante check.
    pub fn run_ante(
        self, envelope: &'a TxEnvelope, parent: &dyn StateView,
        block_gas: Option<&BlockGasMeter>,
    ) -> Result<PreCheckedExecutive<'a, A>, TxOutcome> {
        FreshExecutive::new(self, envelope).check_all(parent, block_gas)
    }
}

/// Picks the state a transaction starts from. Modes reading history use
/// the committed state at `height` (0 for latest); every other mode uses
/// the latest state.
pub fn resolve_start_state(
    mode: ExecutionMode, height: u64, store: &VersionedStore,
) -> Result<Arc<Snapshot>, ExecError> {
    if !mode.reads_history() || height == 0 {
        return Ok(store.latest());
    }
    store
        .state_at(height)
        .map_err(|e| ExecError::InvalidHeight(e.to_string()))
}

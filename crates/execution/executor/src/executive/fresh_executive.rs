// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use super::{
    pre_checked_executive::AnteOutcome, ExecutiveContext, PreCheckedExecutive,
    TxOutcome,
};
use crate::{
    classifier::TxEnvelope, context::TxContext, error::ExecError,
    gas::{BlockGasMeter, GasMeter}, guard::guarded, mode::BlockGasPolicy,
    Application,
};
use pexec_primitives::GasInfo;
use pexec_statedb::{CacheStore, ReadSet, StateView};

/// A transaction that has not passed any check yet.
pub struct FreshExecutive<'a, A: ?Sized> {
    context: ExecutiveContext<'a, A>,
    envelope: &'a TxEnvelope,
}

impl<'a, A: Application + ?Sized> FreshExecutive<'a, A> {
    pub fn new(
        context: ExecutiveContext<'a, A>, envelope: &'a TxEnvelope,
    ) -> Self {
        FreshExecutive { context, envelope }
    }

    pub fn check_all(
        self, parent: &dyn StateView, block_gas: Option<&BlockGasMeter>,
    ) -> Result<PreCheckedExecutive<'a, A>, TxOutcome> {
        self.check_stopped()?;
        self.check_block_gas(block_gas)?;
        self.validate_basic()?;
        let ante = self.run_ante(parent)?;
        Ok(PreCheckedExecutive::new(self.context, self.envelope, ante))
    }

    fn reject(&self, error: ExecError) -> TxOutcome {
        TxOutcome::not_executed(
            self.envelope.index,
            error,
            GasInfo::default(),
            ReadSet::new(),
        )
    }

    fn check_stopped(&self) -> Result<(), TxOutcome> {
        if self.context.stop.is_stopped() {
            return Err(self.reject(ExecError::Aborted));
        }
        Ok(())
    }

    fn check_block_gas(
        &self, block_gas: Option<&BlockGasMeter>,
    ) -> Result<(), TxOutcome> {
        if self.context.mode.block_gas_policy() != BlockGasPolicy::Immediate {
            return Ok(());
        }
        match block_gas {
            Some(meter) if meter.is_exhausted() => {
                Err(self.reject(ExecError::OutOfBlockGas))
            }
            _ => Ok(()),
        }
    }

    fn validate_basic(&self) -> Result<(), TxOutcome> {
        let msgs = &self.envelope.tx.msgs;
        if msgs.is_empty() {
            return Err(self.reject(ExecError::Validation(
                "must contain at least one message".into(),
            )));
        }
        for msg in msgs {
            if let Err(reason) = msg.validate_basic() {
                return Err(self.reject(ExecError::Validation(reason)));
            }
        }
        Ok(())
    }

    /// Runs the ante capability in its own view. On failure nothing it
    /// wrote survives, but its reads are kept so a stale rejection can be
    /// detected.
    fn run_ante(
        &self, parent: &dyn StateView,
    ) -> Result<AnteOutcome, TxOutcome> {
        let context = self.context;
        let envelope = self.envelope;
        let gas_limit = if context.mode.unlimited_gas() {
            u64::MAX
        } else {
            envelope.info.gas_limit
        };

        let mut view = CacheStore::new(parent);
        let result = {
            let mut ctx = TxContext::new(
                context.env,
                context.mode,
                context.gas_config,
                &envelope.info,
                envelope.index,
                GasMeter::new(gas_limit),
                &mut view,
            );
            let result = guarded(|| context.app.ante(&mut ctx, &envelope.tx));
            let (meter, events) = ctx.into_parts();
            result.map(|gas_wanted| (gas_wanted, meter.consumed(), events))
        };
        let (writes, reads) = view.into_parts();

        match result {
            Ok((gas_wanted, gas_used, events)) => Ok(AnteOutcome {
                writes,
                reads,
                gas_wanted,
                gas_used,
                events,
            }),
            Err(e) => {
                debug!("ante rejected tx #{}: {}", envelope.index, e);
                Err(TxOutcome::not_executed(
                    envelope.index,
                    ExecError::Ante(Box::new(e)),
                    GasInfo::default(),
                    reads,
                ))
            }
        }
    }
}

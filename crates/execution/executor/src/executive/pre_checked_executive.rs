// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use super::{
    execution_outcome::{Executed, ExecutionOutcome, FeeCharge},
    ExecutiveContext, TxOutcome,
};
use crate::{
    classifier::TxEnvelope,
    context::{MsgResult, TxContext},
    error::ExecError,
    gas::{BlockGasMeter, GasMeter},
    guard::guarded,
    mode::BlockGasPolicy,
    Application,
};
use pexec_primitives::{Bytes, Coins, Event, GasInfo};
use pexec_statedb::{CacheStore, KvStore, ReadSet, StateView, WriteSet};

/// What a passed ante check leaves behind. Plain data, so it can be carried
/// from the thread that ran the check to the one that finishes the
/// transaction.
#[derive(Debug, Clone, Default)]
pub struct AnteOutcome {
    pub writes: WriteSet,
    pub reads: ReadSet,
    pub gas_wanted: u64,
    /// Gas the ante check consumed; message execution continues from here.
    pub gas_used: u64,
    pub events: Vec<Event>,
}

/// Combined output of all messages of a transaction.
struct MsgsOutput {
    data: Bytes,
    log: String,
    events: Vec<Event>,
}

/// A transaction that passed its ante check.
pub struct PreCheckedExecutive<'a, A: ?Sized> {
    context: ExecutiveContext<'a, A>,
    envelope: &'a TxEnvelope,
    ante: AnteOutcome,
}

impl<'a, A: Application + ?Sized> PreCheckedExecutive<'a, A> {
    pub fn new(
        context: ExecutiveContext<'a, A>, envelope: &'a TxEnvelope,
        ante: AnteOutcome,
    ) -> Self {
        PreCheckedExecutive {
            context,
            envelope,
            ante,
        }
    }

    pub fn ante(&self) -> &AnteOutcome { &self.ante }

    pub fn into_ante(self) -> AnteOutcome { self.ante }

    /// Runs the messages on top of the ante writes, then finalizes gas,
    /// refund and fee. Finalization happens on every path out of message
    /// execution, including a panic.
    pub fn execute_transaction(
        self, parent: &dyn StateView, block_gas: Option<&BlockGasMeter>,
    ) -> TxOutcome {
        let context = self.context;
        let index = self.envelope.index;
        let AnteOutcome {
            writes: ante_writes,
            reads: ante_reads,
            gas_wanted,
            gas_used: ante_gas,
            events: ante_events,
        } = self.ante;

        if context.stop.is_stopped() {
            return TxOutcome::not_executed(
                index,
                ExecError::Aborted,
                GasInfo::default(),
                ante_reads,
            );
        }
        let block_gas = match context.mode.block_gas_policy() {
            BlockGasPolicy::Immediate => block_gas,
            _ => None,
        };
        if block_gas.map_or(false, BlockGasMeter::is_exhausted) {
            return TxOutcome::not_executed(
                index,
                ExecError::OutOfBlockGas,
                GasInfo::default(),
                ante_reads,
            );
        }

        if !context.mode.runs_messages() {
            let executed = Executed {
                gas_wanted,
                gas_used: ante_gas,
                writes: ante_writes,
                fee: FeeCharge {
                    charged: self.envelope.info.fee.clone(),
                    refunded: Coins::empty(),
                },
                data: Bytes::new(),
                log: String::new(),
                events: ante_events,
            };
            return TxOutcome {
                index,
                outcome: ExecutionOutcome::Finished(executed),
                reads: ante_reads,
            };
        }

        let gas_limit = if context.mode.unlimited_gas() {
            u64::MAX
        } else {
            gas_wanted
        };
        let mut meter = GasMeter::resume(gas_limit, ante_gas);
        let mut tx_view = CacheStore::new(parent);
        tx_view.apply(ante_writes.clone());

        let msgs_result =
            Self::run_msgs(context, self.envelope, &mut tx_view, &mut meter);

        // Finalize.
        let gas_used = match &msgs_result {
            Err(e) if e.is_out_of_gas() => gas_wanted,
            _ => meter.consumed(),
        };
        let (refunded, refund_error) = match msgs_result {
            Ok(_) if self.envelope.info.privileged
                && context.mode.applies_refund() =>
            {
                match Self::refund(
                    context,
                    self.envelope,
                    &mut tx_view,
                    gas_wanted,
                    gas_used,
                ) {
                    Ok(refunded) => (refunded, None),
                    Err(e) => (Coins::empty(), Some(e)),
                }
            }
            _ => (Coins::empty(), None),
        };
        let msgs_result = match refund_error {
            Some(e) => Err(e),
            None => msgs_result,
        };

        let (tx_writes, tx_reads) = tx_view.into_parts();
        let mut reads = ante_reads;
        reads.union(&tx_reads);

        if let Some(meter) = block_gas {
            if meter.consume(gas_used).is_err() {
                debug!(
                    "tx #{} overflows the block gas limit {} with {} gas",
                    index,
                    meter.limit(),
                    gas_used
                );
                return TxOutcome::not_executed(
                    index,
                    ExecError::OutOfBlockGas,
                    GasInfo {
                        gas_wanted,
                        gas_used,
                    },
                    reads,
                );
            }
        }

        let fee = FeeCharge {
            charged: self.envelope.info.fee.clone(),
            refunded,
        };
        let outcome = match msgs_result {
            Ok(output) => {
                let mut events = ante_events;
                events.extend(output.events);
                ExecutionOutcome::Finished(Executed {
                    gas_wanted,
                    gas_used,
                    writes: tx_writes,
                    fee,
                    data: output.data,
                    log: output.log,
                    events,
                })
            }
            Err(e) => {
                debug!("tx #{} failed: {}", index, e);
                ExecutionOutcome::ExecutionErrorChargeFee(
                    e,
                    Executed {
                        gas_wanted,
                        gas_used,
                        writes: ante_writes,
                        fee,
                        data: Bytes::new(),
                        log: String::new(),
                        events: ante_events,
                    },
                )
            }
        };
        TxOutcome {
            index,
            outcome,
            reads,
        }
    }

    /// Runs every message in a view layered on `tx_view`. The view is
    /// merged only if all messages succeed.
    fn run_msgs(
        context: ExecutiveContext<'a, A>, envelope: &TxEnvelope,
        tx_view: &mut CacheStore, meter: &mut GasMeter,
    ) -> Result<MsgsOutput, ExecError> {
        if context.stop.is_stopped() {
            return Err(ExecError::Aborted);
        }
        let mut msg_view = CacheStore::new(&*tx_view);
        let result = {
            let mut ctx = TxContext::new(
                context.env,
                context.mode,
                context.gas_config,
                &envelope.info,
                envelope.index,
                meter.clone(),
                &mut msg_view,
            );
            let mut current = 0;
            let result = guarded(|| {
                let mut results = Vec::with_capacity(envelope.tx.msgs.len());
                for (i, msg) in envelope.tx.msgs.iter().enumerate() {
                    current = i;
                    let result = context.app.route_msg(&mut ctx, msg)?;
                    let mut events = vec![Event::new("message")
                        .with_attribute("action", msg.msg_type.as_str())];
                    events.extend(ctx.take_events());
                    results.push((result, events));
                }
                Ok(results)
            })
            .map_err(|e| ExecError::MessageExecution {
                index: current,
                source: Box::new(e),
            });
            let (used_meter, _) = ctx.into_parts();
            *meter = used_meter;
            result
        };
        let writes = msg_view.into_writes();
        let results = result?;
        tx_view.apply(writes);
        Ok(assemble_msgs_output(results))
    }

    fn refund(
        context: ExecutiveContext<'a, A>, envelope: &TxEnvelope,
        tx_view: &mut CacheStore, gas_wanted: u64, gas_used: u64,
    ) -> Result<Coins, ExecError> {
        let mut refund_view = CacheStore::new(&*tx_view);
        let result = {
            let mut ctx = TxContext::new(
                context.env,
                context.mode,
                context.gas_config,
                &envelope.info,
                envelope.index,
                GasMeter::infinite(),
                &mut refund_view,
            );
            guarded(|| context.app.refund_gas(&mut ctx, gas_wanted, gas_used))
        };
        let writes = refund_view.into_writes();
        let refunded = result?;
        tx_view.apply(writes);
        Ok(refunded)
    }
}

fn assemble_msgs_output(results: Vec<(MsgResult, Vec<Event>)>) -> MsgsOutput {
    let mut data = Vec::with_capacity(results.len());
    let mut logs = Vec::with_capacity(results.len());
    let mut events = Vec::new();
    for (i, (result, msg_events)) in results.into_iter().enumerate() {
        data.push(result.data);
        logs.push(format!("{{\"msg_index\":{},\"log\":{:?}}}", i, result.log));
        events.extend(msg_events);
        events.extend(result.events);
    }
    MsgsOutput {
        data: rlp::encode_list::<Bytes, _>(&data).to_vec(),
        log: format!("[{}]", logs.join(",")),
        events,
    }
}

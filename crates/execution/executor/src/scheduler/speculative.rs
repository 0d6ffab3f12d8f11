// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use super::{BlockContext, Scheduler};
use crate::{
    classifier::TxEnvelope,
    context::Application,
    error::{BlockError, ExecError, RerunReason},
    executive::TxOutcome,
    mode::{ExecutionMode, Strategy},
};
use pexec_primitives::{Address, Bytes};
use pexec_statedb::BlockState;
use rayon::{prelude::*, ThreadPool};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::mpsc::{channel, Receiver, Sender},
};

enum Speculation {
    Undecodable(ExecError),
    Attempted {
        envelope: TxEnvelope,
        outcome: TxOutcome,
        /// Earlier transactions of the same sender whose writes the
        /// attempt ran on.
        seen: Vec<usize>,
    },
}

/// Transactions of one sender in block order.
type SenderGroup = Vec<TxEnvelope>;

/// Splits decoded transactions into per-sender groups, ordered by the
/// first transaction of each group. Undecodable ones are returned apart.
fn group_by_sender(
    classified: Vec<Result<TxEnvelope, ExecError>>,
) -> (Vec<SenderGroup>, Vec<(usize, ExecError)>) {
    let mut groups: Vec<SenderGroup> = Vec::new();
    let mut group_of: HashMap<Address, usize> = HashMap::new();
    let mut undecodable = Vec::new();
    for (index, envelope) in classified.into_iter().enumerate() {
        let envelope = match envelope {
            Ok(envelope) => envelope,
            Err(e) => {
                undecodable.push((index, e));
                continue;
            }
        };
        let group = *group_of
            .entry(envelope.info.sender)
            .or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
        groups[group].push(envelope);
    }
    (groups, undecodable)
}

/// Executes every transaction of the block at once against the state the
/// block started from, then settles the results in block order: a result
/// is accepted if nothing it read was written by an earlier accepted
/// transaction it did not see, otherwise the transaction runs again in
/// order.
///
/// Transactions of one sender form a group. A group runs on one worker,
/// each transaction on top of the writes of the ones before it, so the
/// nonce and fee updates of a sender do not force reruns. If a group
/// member runs again, every later member does too.
pub struct SpeculativeScheduler<'p> {
    pool: &'p ThreadPool,
}

impl<'p> SpeculativeScheduler<'p> {
    pub fn new(pool: &'p ThreadPool) -> Self { SpeculativeScheduler { pool } }

    /// Runs the members of `group` one after another, each on the start
    /// state plus the writes of the members before it.
    fn speculate_group<A: Application + ?Sized>(
        block: &BlockContext<'_, A>, group: SenderGroup,
        sender: &Sender<(usize, Speculation)>,
    ) {
        let executive =
            block.executive(ExecutionMode::DeliverConcurrentSpeculative);
        let view = BlockState::new(block.state.base().clone());
        let mut seen = Vec::new();
        for envelope in group {
            let index = envelope.index;
            let outcome = executive.transact(&envelope, &view, None);
            let aborted = outcome.is_aborted();
            if let Some(writes) = outcome.outcome.writes() {
                view.apply(writes.clone());
            }
            let speculation = Speculation::Attempted {
                envelope,
                outcome,
                seen: seen.clone(),
            };
            // The receiver is gone only if the block was stopped.
            if sender.send((index, speculation)).is_err() || aborted {
                return;
            }
            seen.push(index);
        }
    }

    fn settle<A: Application + ?Sized>(
        &self, block: &BlockContext<'_, A>, index: usize,
        speculation: Speculation, rerun: &mut HashSet<usize>,
    ) -> Result<(), BlockError> {
        let (envelope, outcome, seen) = match speculation {
            Speculation::Undecodable(e) => {
                block.commit_undecodable(index, e);
                return Ok(());
            }
            Speculation::Attempted {
                envelope,
                outcome,
                seen,
            } => (envelope, outcome, seen),
        };
        // Attempts still running when the stop was raised may have
        // finished anyway.
        if outcome.is_aborted() || block.stop.is_stopped() {
            return Err(BlockError::Stopped);
        }
        let reason = Self::rerun_reason(block, &outcome, &seen, rerun);
        let accepted = match reason {
            None => {
                // Only this thread consumes the meter, so this cannot fail
                // after `rerun_reason` passed.
                match block.block_gas.consume(outcome.block_gas()) {
                    Ok(()) => {
                        block.assembler.lock().note_concurrent();
                        outcome
                    }
                    Err(_) => {
                        rerun.insert(index);
                        block.rerun(&envelope)
                    }
                }
            }
            Some(reason) => {
                block.assembler.lock().note_rerun(index, &reason);
                rerun.insert(index);
                block.rerun(&envelope)
            }
        };
        if accepted.is_aborted() {
            return Err(BlockError::Stopped);
        }
        block.commit_outcome(accepted);
        Ok(())
    }

    fn rerun_reason<A: Application + ?Sized>(
        block: &BlockContext<'_, A>, outcome: &TxOutcome, seen: &[usize],
        rerun: &HashSet<usize>,
    ) -> Option<RerunReason> {
        if outcome.panicked() {
            return Some(RerunReason::Panicked);
        }
        if let Some(&previous) = seen.iter().find(|i| rerun.contains(*i)) {
            return Some(RerunReason::SenderRerun { previous });
        }
        let conflicts = block.conflicts.lock();
        if let Some(conflict) = conflicts.check_seen(&outcome.reads, seen) {
            return Some(conflict);
        }
        drop(conflicts);
        if block.block_gas.would_exceed(outcome.block_gas()) {
            return Some(RerunReason::BlockGasOverflow);
        }
        None
    }

    /// Settles results in block order as they arrive.
    fn drain<A: Application + ?Sized>(
        &self, block: &BlockContext<'_, A>,
        receiver: Receiver<(usize, Speculation)>, total: usize,
    ) -> Result<(), BlockError> {
        let mut arrived = BTreeMap::new();
        let mut rerun = HashSet::new();
        let mut cursor = 0;
        while cursor < total {
            let (index, speculation) = match receiver.recv() {
                Ok(received) => received,
                // Only if a task died outside the panic guard.
                Err(_) => return Err(BlockError::Stopped),
            };
            arrived.insert(index, speculation);
            while let Some(speculation) = arrived.remove(&cursor) {
                self.settle(block, cursor, speculation, &mut rerun)?;
                cursor += 1;
            }
        }
        Ok(())
    }
}

impl<'p> Scheduler for SpeculativeScheduler<'p> {
    fn strategy(&self) -> Strategy { Strategy::Speculative }

    fn execute_block<A: Application + ?Sized>(
        &self, block: &BlockContext<'_, A>, raw_txs: &[Bytes],
    ) -> Result<(), BlockError> {
        let classified: Vec<_> = self.pool.install(|| {
            raw_txs
                .par_iter()
                .enumerate()
                .map(|(index, raw)| block.classify(index, raw))
                .collect()
        });
        let (groups, undecodable) = group_by_sender(classified);
        debug!(
            "speculating {} txs in {} sender groups",
            raw_txs.len(),
            groups.len()
        );
        let (sender, receiver) = channel();
        for (index, e) in undecodable {
            // The receiver is still held here.
            let _ = sender.send((index, Speculation::Undecodable(e)));
        }
        self.pool.in_place_scope(|scope| {
            for group in groups {
                let sender = sender.clone();
                scope.spawn(move |_| {
                    Self::speculate_group(block, group, &sender)
                });
            }
            drop(sender);
            let result = self.drain(block, receiver, raw_txs.len());
            if result.is_err() {
                block.stop.stop();
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classifier::classify,
        mock_app::{address, MockBankApp, TxBuilder},
    };

    #[test]
    fn test_group_by_sender() {
        let app = MockBankApp::new();
        let txs = [(2, 0), (1, 0), (2, 1), (3, 0), (1, 1)];
        let mut classified: Vec<_> = txs
            .iter()
            .enumerate()
            .map(|(index, &(sender, nonce))| {
                let raw = TxBuilder::new(address(sender), nonce)
                    .incr("a")
                    .encode();
                classify(&app, index, &raw)
            })
            .collect();
        classified.insert(2, classify(&app, 2, &[0xc1, 0xff]));
        for (index, envelope) in classified.iter_mut().enumerate() {
            if let Ok(envelope) = envelope {
                envelope.index = index;
            }
        }

        let (groups, undecodable) = group_by_sender(classified);
        let indices: Vec<Vec<usize>> = groups
            .iter()
            .map(|group| group.iter().map(|e| e.index).collect())
            .collect();
        assert_eq!(indices, vec![vec![0, 3], vec![1, 5], vec![4]]);
        assert_eq!(undecodable.len(), 1);
        assert_eq!(undecodable[0].0, 2);
    }
}

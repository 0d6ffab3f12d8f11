// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use super::{BlockContext, Scheduler};
use crate::{
    classifier::TxEnvelope,
    context::Application,
    error::{BlockError, ExecError, RerunReason},
    executive::{AnteOutcome, ExecutiveContext, PreCheckedExecutive, TxOutcome},
    mode::{ExecutionMode, Strategy},
    sender_queue::{SenderQueues, TaskHandle, TaskStage},
};
use parking_lot::{Condvar, Mutex};
use pexec_primitives::Bytes;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc::{channel, Receiver, Sender},
        Arc,
    },
    thread,
};

struct SlotState {
    free: usize,
    closed: bool,
}

/// Admission control of the window. A slot is held from the moment a
/// worker fetches a transaction until that transaction commits.
struct Slots {
    state: Mutex<SlotState>,
    freed: Condvar,
}

impl Slots {
    fn new(size: usize) -> Self {
        Slots {
            state: Mutex::new(SlotState {
                free: size,
                closed: false,
            }),
            freed: Condvar::new(),
        }
    }

    /// Blocks until a slot is free. Returns false once closed.
    fn acquire(&self) -> bool {
        let mut state = self.state.lock();
        while state.free == 0 && !state.closed {
            self.freed.wait(&mut state);
        }
        if state.closed {
            return false;
        }
        state.free -= 1;
        true
    }

    fn release(&self) {
        self.state.lock().free += 1;
        self.freed.notify_one();
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.freed.notify_all();
    }
}

/// A transaction whose ante check ran ahead of its turn.
struct CheckedTx {
    envelope: TxEnvelope,
    task: Arc<TaskHandle>,
    ante: Result<AnteOutcome, TxOutcome>,
    /// Last transaction whose writes were committed when the check
    /// started, none if it started before the first commit.
    visible_upto: Option<usize>,
}

enum Prepared {
    Undecodable { index: usize, error: ExecError },
    Checked(CheckedTx),
}

impl Prepared {
    fn index(&self) -> usize {
        match self {
            Prepared::Undecodable { index, .. } => *index,
            Prepared::Checked(checked) => checked.envelope.index,
        }
    }
}

/// Runs decoding and ante checks of up to `window` transactions ahead of
/// the commit point on worker threads, while the calling thread executes
/// messages and commits strictly in block order.
#[derive(Debug)]
pub struct BoundedScheduler {
    window: usize,
}

impl BoundedScheduler {
    pub fn new(window: usize) -> Self {
        BoundedScheduler {
            window: window.max(1),
        }
    }
}

impl Scheduler for BoundedScheduler {
    fn strategy(&self) -> Strategy { Strategy::Bounded }

    fn execute_block<A: Application + ?Sized>(
        &self, block: &BlockContext<'_, A>, raw_txs: &[Bytes],
    ) -> Result<(), BlockError> {
        if raw_txs.is_empty() {
            return Ok(());
        }
        let window = Window {
            block,
            raw_txs,
            slots: Slots::new(self.window),
            queues: SenderQueues::new(),
            next: AtomicUsize::new(0),
            committed: AtomicUsize::new(0),
        };
        let workers = self.window.min(raw_txs.len());
        let (sender, receiver) = channel();
        thread::scope(|scope| {
            let spawned = (0..workers).try_for_each(|i| {
                let sender = sender.clone();
                let window = &window;
                thread::Builder::new()
                    .name(format!("pexec-window-{}", i))
                    .spawn_scoped(scope, move || window.work(sender))
                    .map(|_| ())
            });
            drop(sender);
            let result = match spawned {
                Ok(()) => window.commit_all(receiver),
                Err(e) => Err(BlockError::Io(e)),
            };
            if result.is_err() {
                block.stop.stop();
            }
            window.slots.close();
            result
        })
    }
}

struct Window<'w, A: ?Sized> {
    block: &'w BlockContext<'w, A>,
    raw_txs: &'w [Bytes],
    slots: Slots,
    queues: SenderQueues,
    /// Next transaction to hand to a worker.
    next: AtomicUsize,
    /// Number of transactions committed so far.
    committed: AtomicUsize,
}

impl<'w, A: Application + ?Sized> Window<'w, A> {
    fn executive(&self) -> ExecutiveContext<'w, A> {
        self.block.executive(ExecutionMode::DeliverConcurrentBounded)
    }

    fn work(&self, sender: Sender<Prepared>) {
        loop {
            if self.block.stop.is_stopped() || !self.slots.acquire() {
                break;
            }
            let index = self.next.fetch_add(1, Ordering::SeqCst);
            if index >= self.raw_txs.len() {
                self.slots.release();
                break;
            }
            if sender.send(self.prepare(index)).is_err() {
                break;
            }
        }
    }

    fn prepare(&self, index: usize) -> Prepared {
        let envelope = match self.block.classify(index, &self.raw_txs[index])
        {
            Ok(envelope) => envelope,
            Err(error) => return Prepared::Undecodable { index, error },
        };
        let sender = envelope.info.sender;
        let task = TaskHandle::new(index);
        self.queues.register(sender, task.clone());
        self.queues.begin_ante(&sender, &task);
        let (mut ante, mut visible_upto) = self.check_ante(&envelope);
        if task.needs_rerun() && !self.queues.has_pending_before(&sender, index)
        {
            // Earlier transactions of the sender committed meanwhile.
            task.take_rerun();
            self.block
                .assembler
                .lock()
                .note_ante_rerun(index, &RerunReason::SenderHazard);
            (ante, visible_upto) = self.check_ante(&envelope);
        }
        task.advance(TaskStage::AnteDone);
        Prepared::Checked(CheckedTx {
            envelope,
            task,
            ante,
            visible_upto,
        })
    }

    fn check_ante(
        &self, envelope: &TxEnvelope,
    ) -> (Result<AnteOutcome, TxOutcome>, Option<usize>) {
        // Loaded before reading any state: everything up to here is
        // already applied to the block state.
        let committed = self.committed.load(Ordering::SeqCst);
        let ante = self
            .executive()
            .run_ante(envelope, self.block.state, Some(&self.block.block_gas))
            .map(PreCheckedExecutive::into_ante);
        (ante, committed.checked_sub(1))
    }

    fn commit_all(
        &self, receiver: Receiver<Prepared>,
    ) -> Result<(), BlockError> {
        let mut arrived = BTreeMap::new();
        let mut cursor = 0;
        while cursor < self.raw_txs.len() {
            // Fails only once every worker is gone, i.e. after a stop.
            let prepared = receiver.recv().map_err(|_| BlockError::Stopped)?;
            arrived.insert(prepared.index(), prepared);
            while let Some(prepared) = arrived.remove(&cursor) {
                self.commit(prepared)?;
                self.committed.store(cursor + 1, Ordering::SeqCst);
                self.slots.release();
                cursor += 1;
            }
        }
        Ok(())
    }

    fn commit(&self, prepared: Prepared) -> Result<(), BlockError> {
        let checked = match prepared {
            Prepared::Undecodable { index, error } => {
                self.block.commit_undecodable(index, error);
                return Ok(());
            }
            Prepared::Checked(checked) => checked,
        };
        if self.block.stop.is_stopped() {
            return Err(BlockError::Stopped);
        }
        let index = checked.envelope.index;
        let executive = self.executive();
        let ante = match self.recheck_reason(&checked) {
            None => checked.ante,
            Some(reason) => {
                self.block
                    .assembler
                    .lock()
                    .note_ante_rerun(index, &reason);
                executive
                    .run_ante(
                        &checked.envelope,
                        self.block.state,
                        Some(&self.block.block_gas),
                    )
                    .map(PreCheckedExecutive::into_ante)
            }
        };
        checked.task.advance(TaskStage::ReadyForCommit);
        let outcome = match ante {
            Ok(ante) => {
                PreCheckedExecutive::new(executive, &checked.envelope, ante)
                    .execute_transaction(
                        self.block.state,
                        Some(&self.block.block_gas),
                    )
            }
            Err(rejected) => rejected,
        };
        if outcome.is_aborted() {
            return Err(BlockError::Stopped);
        }
        self.block.commit_outcome(outcome);
        self.queues.pop(&checked.envelope.info.sender, index);
        checked.task.advance(TaskStage::Committed);
        Ok(())
    }

    /// Why an ante result prepared ahead of time cannot be used now that
    /// every earlier transaction has committed.
    fn recheck_reason(&self, checked: &CheckedTx) -> Option<RerunReason> {
        if checked.task.take_rerun() {
            return Some(RerunReason::SenderHazard);
        }
        let reads = match &checked.ante {
            Ok(ante) => &ante.reads,
            Err(rejected) if rejected.panicked() => {
                return Some(RerunReason::Panicked)
            }
            // A rejection must turn into an out of block gas error if
            // the block ran out of gas since.
            Err(_) if self.block.block_gas.is_exhausted() => {
                return Some(RerunReason::BlockGasOverflow)
            }
            Err(rejected) => &rejected.reads,
        };
        self.block.conflicts.lock().check(reads, checked.visible_upto)
    }
}

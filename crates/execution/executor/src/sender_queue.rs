// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use parking_lot::Mutex;
use pexec_primitives::Address;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        Arc,
    },
};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskStage {
    Pending = 0,
    AnteRunning = 1,
    AnteDone = 2,
    ReadyForCommit = 3,
    Committed = 4,
}

impl TaskStage {
    fn from_u8(stage: u8) -> Self {
        match stage {
            0 => TaskStage::Pending,
            1 => TaskStage::AnteRunning,
            2 => TaskStage::AnteDone,
            3 => TaskStage::ReadyForCommit,
            _ => TaskStage::Committed,
        }
    }

    /// The only stage a task may enter this one from.
    fn previous(self) -> Option<TaskStage> {
        match self {
            TaskStage::Pending => None,
            TaskStage::AnteRunning => Some(TaskStage::Pending),
            TaskStage::AnteDone => Some(TaskStage::AnteRunning),
            TaskStage::ReadyForCommit => Some(TaskStage::AnteDone),
            TaskStage::Committed => Some(TaskStage::ReadyForCommit),
        }
    }

    /// Whether a task in this stage has read the sender's account.
    fn has_checked(self) -> bool {
        matches!(self, TaskStage::AnteRunning | TaskStage::AnteDone)
    }
}

/// Shared state of one in-flight transaction of the bounded scheduler.
#[derive(Debug)]
pub struct TaskHandle {
    index: usize,
    stage: AtomicU8,
    rerun: AtomicBool,
}

impl TaskHandle {
    pub fn new(index: usize) -> Arc<Self> {
        Arc::new(TaskHandle {
            index,
            stage: AtomicU8::new(TaskStage::Pending as u8),
            rerun: AtomicBool::new(false),
        })
    }

    pub fn index(&self) -> usize { self.index }

    pub fn stage(&self) -> TaskStage {
        TaskStage::from_u8(self.stage.load(Ordering::SeqCst))
    }

    /// Moves the task one stage forward. Tasks never skip or repeat a
    /// stage.
    pub fn advance(&self, next: TaskStage) {
        let moved = next.previous().and_then(|previous| {
            self.stage
                .compare_exchange(
                    previous as u8,
                    next as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .ok()
        });
        if moved.is_none() {
            let current = self.stage();
            error!(
                "tx #{} cannot move from {:?} to {:?}",
                self.index, current, next
            );
            panic!(
                "illegal task stage transition {:?} -> {:?}",
                current, next
            );
        }
    }

    pub fn mark_rerun(&self) { self.rerun.store(true, Ordering::SeqCst); }

    pub fn needs_rerun(&self) -> bool { self.rerun.load(Ordering::SeqCst) }

    /// Clears the rerun flag, returning whether it was set.
    pub fn take_rerun(&self) -> bool {
        self.rerun.swap(false, Ordering::SeqCst)
    }
}

/// In-flight transactions per sender, ordered by block index.
#[derive(Default)]
pub struct SenderQueues {
    queues: Mutex<HashMap<Address, BTreeMap<usize, Arc<TaskHandle>>>>,
}

impl SenderQueues {
    pub fn new() -> Self { Self::default() }

    /// Adds a pending `task` to its sender's queue. Later in-flight tasks
    /// of the sender that already checked the sender's account did so
    /// against state this task is about to change, so they are flagged.
    /// Returns how many were flagged.
    pub fn register(&self, sender: Address, task: Arc<TaskHandle>) -> usize {
        let index = task.index();
        let mut queues = self.queues.lock();
        let queue = queues.entry(sender).or_default();
        let mut flagged = 0;
        for later in queue.range(index + 1..).map(|(_, t)| t) {
            if later.stage().has_checked() {
                trace!(
                    "tx #{} of {:?} flagged by earlier tx #{}",
                    later.index(),
                    sender,
                    index
                );
                later.mark_rerun();
                flagged += 1;
            }
        }
        queue.insert(index, task);
        flagged
    }

    /// Moves a registered task into its ante check. The task flags itself
    /// if an earlier task of the sender is still uncommitted, since the
    /// check is bound to miss that task's changes. Returns whether it did.
    pub fn begin_ante(&self, sender: &Address, task: &TaskHandle) -> bool {
        let queues = self.queues.lock();
        task.advance(TaskStage::AnteRunning);
        let flagged = queues.get(sender).map_or(false, |queue| {
            queue.range(..task.index()).next().is_some()
        });
        if flagged {
            task.mark_rerun();
        }
        flagged
    }

    /// Whether an earlier transaction of `sender` is still in flight.
    pub fn has_pending_before(&self, sender: &Address, index: usize) -> bool {
        self.queues
            .lock()
            .get(sender)
            .map_or(false, |queue| queue.range(..index).next().is_some())
    }

    /// Removes a committed task.
    pub fn pop(&self, sender: &Address, index: usize) {
        let mut queues = self.queues.lock();
        if let Some(queue) = queues.get_mut(sender) {
            queue.remove(&index);
            if queue.is_empty() {
                queues.remove(sender);
            }
        }
    }

    pub fn in_flight(&self, sender: &Address) -> usize {
        self.queues.lock().get(sender).map_or(0, BTreeMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checking(index: usize) -> Arc<TaskHandle> {
        let task = TaskHandle::new(index);
        task.advance(TaskStage::AnteRunning);
        task
    }

    #[test]
    fn test_later_task_flags_itself_on_ante() {
        let queues = SenderQueues::new();
        let sender = Address::from_low_u64_be(1);
        let first = TaskHandle::new(1);
        let second = TaskHandle::new(3);

        assert_eq!(queues.register(sender, first.clone()), 0);
        assert!(!queues.begin_ante(&sender, &first));
        assert_eq!(queues.register(sender, second.clone()), 0);
        assert!(queues.begin_ante(&sender, &second));
        assert!(second.needs_rerun());
        assert!(!first.needs_rerun());
        assert!(queues.has_pending_before(&sender, 3));

        queues.pop(&sender, 1);
        assert!(!queues.has_pending_before(&sender, 3));
        assert_eq!(queues.in_flight(&sender), 1);
    }

    #[test]
    fn test_earlier_task_registering_late_flags_checked_tasks() {
        let queues = SenderQueues::new();
        let sender = Address::from_low_u64_be(1);
        let other = Address::from_low_u64_be(2);
        let checked = checking(3);
        checked.advance(TaskStage::AnteDone);
        let pending = TaskHandle::new(5);
        let unrelated = checking(4);

        queues.register(sender, checked.clone());
        queues.register(sender, pending.clone());
        queues.register(other, unrelated.clone());
        assert_eq!(queues.register(sender, TaskHandle::new(1)), 1);
        assert!(checked.take_rerun());
        assert!(!checked.needs_rerun());
        assert!(!unrelated.needs_rerun());

        // Not checked yet, so it finds the earlier task when it starts.
        assert!(!pending.needs_rerun());
        assert!(queues.begin_ante(&sender, &pending));
        assert!(pending.needs_rerun());
    }

    #[test]
    fn test_stages_move_forward_one_at_a_time() {
        let task = checking(0);
        task.advance(TaskStage::AnteDone);
        task.advance(TaskStage::ReadyForCommit);
        task.advance(TaskStage::Committed);
        assert_eq!(task.stage(), TaskStage::Committed);
    }

    #[test]
    #[should_panic(expected = "illegal task stage transition")]
    fn test_skipping_a_stage_panics() {
        checking(0).advance(TaskStage::ReadyForCommit);
    }

    #[test]
    fn test_pop_cleans_up() {
        let queues = SenderQueues::new();
        let sender = Address::from_low_u64_be(9);
        queues.register(sender, TaskHandle::new(0));
        queues.pop(&sender, 0);
        assert_eq!(queues.in_flight(&sender), 0);
        queues.pop(&sender, 0);
    }
}

// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use super::{BlockContext, Scheduler};
use crate::{
    context::Application,
    error::BlockError,
    mode::{ExecutionMode, Strategy},
};
use pexec_primitives::Bytes;

/// Runs every transaction in order directly on the block state. The
/// reference the concurrent schedulers are measured against.
#[derive(Debug, Default)]
pub struct SerialScheduler;

impl Scheduler for SerialScheduler {
    fn strategy(&self) -> Strategy { Strategy::Sequential }

    fn execute_block<A: Application + ?Sized>(
        &self, block: &BlockContext<'_, A>, raw_txs: &[Bytes],
    ) -> Result<(), BlockError> {
        let executive = block.executive(ExecutionMode::Deliver);
        for (index, raw) in raw_txs.iter().enumerate() {
            let envelope = match block.classify(index, raw) {
                Ok(envelope) => envelope,
                Err(e) => {
                    block.commit_undecodable(index, e);
                    continue;
                }
            };
            let outcome = executive.transact(
                &envelope,
                block.state,
                Some(&block.block_gas),
            );
            if outcome.is_aborted() {
                return Err(BlockError::Stopped);
            }
            block.commit_outcome(outcome);
        }
        Ok(())
    }
}

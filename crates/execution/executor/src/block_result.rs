// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{error::RerunReason, mode::Strategy};
use hash::keccak;
use pexec_primitives::{Coins, TxResponse, H256};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStats {
    pub strategy: Strategy,
    pub txs: usize,
    /// Results taken from a concurrent attempt without a rerun.
    pub accepted_concurrent: usize,
    /// Whole transactions executed again in order.
    pub reruns: usize,
    /// Ante checks executed again in order.
    pub ante_reruns: usize,
    pub elapsed: Duration,
}

impl ExecutionStats {
    pub fn log_summary(&self, height: u64) {
        info!(
            "block {} executed by {} scheduler: txs={} concurrent={} \
             reruns={} ante_reruns={} elapsed={:?}",
            height,
            self.strategy,
            self.txs,
            self.accepted_concurrent,
            self.reruns,
            self.ante_reruns,
            self.elapsed
        );
    }
}

/// Outcome of delivering a block: one response per transaction in block
/// order, block gas used and the net fee credited to the collector.
#[derive(Debug, Clone)]
pub struct BlockResult {
    pub height: u64,
    pub responses: Vec<TxResponse>,
    pub gas_used: u64,
    pub fees: Coins,
    pub stats: ExecutionStats,
}

impl BlockResult {
    /// Commits to every response field, so two results with the same root
    /// are indistinguishable to clients.
    pub fn responses_root(&self) -> H256 {
        keccak(rlp::encode_list::<TxResponse, _>(&self.responses))
    }
}

/// Collects per-transaction responses as the schedulers accept them.
pub struct BlockResultAssembler {
    strategy: Strategy,
    responses: Vec<Option<TxResponse>>,
    accepted_concurrent: usize,
    reruns: usize,
    ante_reruns: usize,
    started: Instant,
}

impl BlockResultAssembler {
    pub fn new(strategy: Strategy, txs: usize) -> Self {
        BlockResultAssembler {
            strategy,
            responses: vec![None; txs],
            accepted_concurrent: 0,
            reruns: 0,
            ante_reruns: 0,
            started: Instant::now(),
        }
    }

    pub fn push(&mut self, index: usize, response: TxResponse) {
        let slot = &mut self.responses[index];
        assert!(slot.is_none(), "response for tx #{} set twice", index);
        *slot = Some(response);
    }

    pub fn note_concurrent(&mut self) { self.accepted_concurrent += 1; }

    pub fn note_rerun(&mut self, index: usize, reason: &RerunReason) {
        debug!("rerunning tx #{} in order: {:?}", index, reason);
        self.reruns += 1;
    }

    pub fn note_ante_rerun(&mut self, index: usize, reason: &RerunReason) {
        debug!("rerunning ante of tx #{}: {:?}", index, reason);
        self.ante_reruns += 1;
    }

    pub fn finish(
        self, height: u64, gas_used: u64, fees: Coins,
    ) -> BlockResult {
        let responses: Vec<TxResponse> = self
            .responses
            .into_iter()
            .enumerate()
            .map(|(index, response)| match response {
                Some(response) => response,
                None => panic!("no response for tx #{}", index),
            })
            .collect();
        let stats = ExecutionStats {
            strategy: self.strategy,
            txs: responses.len(),
            accepted_concurrent: self.accepted_concurrent,
            reruns: self.reruns,
            ante_reruns: self.ante_reruns,
            elapsed: self.started.elapsed(),
        };
        BlockResult {
            height,
            responses,
            gas_used,
            fees,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(code: u32) -> TxResponse {
        TxResponse {
            code,
            ..Default::default()
        }
    }

    #[test]
    fn test_assemble_in_block_order() {
        let mut assembler = BlockResultAssembler::new(Strategy::Speculative, 3);
        assembler.push(2, response(2));
        assembler.push(0, response(0));
        assembler.note_concurrent();
        assembler.note_rerun(1, &RerunReason::Panicked);
        assembler.push(1, response(1));

        let result = assembler.finish(7, 10, Coins::empty());
        let codes: Vec<u32> = result.responses.iter().map(|r| r.code).collect();
        assert_eq!(codes, vec![0, 1, 2]);
        assert_eq!(result.stats.txs, 3);
        assert_eq!(result.stats.reruns, 1);
        assert_eq!(result.stats.accepted_concurrent, 1);
    }

    #[test]
    fn test_responses_root_tracks_content() {
        let mut a = BlockResultAssembler::new(Strategy::Sequential, 1);
        a.push(0, response(0));
        let mut b = BlockResultAssembler::new(Strategy::Bounded, 1);
        b.push(0, response(5));
        let a = a.finish(1, 0, Coins::empty());
        let b = b.finish(1, 0, Coins::empty());
        assert_ne!(a.responses_root(), b.responses_root());
    }

    #[test]
    #[should_panic(expected = "set twice")]
    fn test_double_push_panics() {
        let mut assembler = BlockResultAssembler::new(Strategy::Sequential, 1);
        assembler.push(0, response(0));
        assembler.push(0, response(0));
    }

    #[test]
    #[should_panic(expected = "no response for tx #1")]
    fn test_missing_response_panics() {
        let mut assembler = BlockResultAssembler::new(Strategy::Sequential, 2);
        assembler.push(0, response(0));
        assembler.finish(1, 0, Coins::empty());
    }
}

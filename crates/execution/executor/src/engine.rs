// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{
    block_result::BlockResult,
    classifier::classify,
    config::ExecutionConfig,
    context::{Application, BlockEnv},
    error::{BlockError, ExecError},
    executive::{
        resolve_start_state, ExecutionOutcome, ExecutiveContext, StopHandle,
        TxOutcome,
    },
    guard::guarded,
    mode::{ExecutionMode, Strategy},
    scheduler::{
        BlockContext, BoundedScheduler, Scheduler, SerialScheduler,
        SpeculativeScheduler,
    },
};
use pexec_primitives::{Bytes, GasInfo, TxResponse};
use pexec_statedb::{
    BlockState, KvStore, ReadSet, Snapshot, StateRoot, VersionedStore,
    WriteSet,
};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

/// A block between `begin_block` and `commit`.
struct PendingBlock {
    env: BlockEnv,
    /// Set once the block has been delivered.
    writes: Option<WriteSet>,
}

/// Drives blocks through begin, deliver and commit on top of a versioned
/// state, and answers mempool checks and queries in between.
pub struct Engine<A: Application> {
    app: A,
    config: ExecutionConfig,
    exempt_keys: Vec<Bytes>,
    store: VersionedStore,
    /// Latest committed state plus the writes of transactions accepted by
    /// `check_tx` since.
    check_state: Snapshot,
    last_env: BlockEnv,
    pending: Option<PendingBlock>,
    stop: StopHandle,
    pool: ThreadPool,
}

impl<A: Application> Engine<A> {
    pub fn new(
        app: A, config: ExecutionConfig, genesis: Snapshot,
    ) -> Result<Self, BlockError> {
        config.validate()?;
        let exempt_keys = config.exempt_keys()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.speculative_threads)
            .thread_name(|i| format!("pexec-speculative-{}", i))
            .build()?;
        info!(
            "execution engine started: strategy={} window={} threads={}",
            config.strategy,
            config.concurrency_window,
            pool.current_num_threads()
        );
        Ok(Engine {
            app,
            check_state: genesis.clone(),
            store: VersionedStore::new(genesis, config.state_history),
            config,
            exempt_keys,
            last_env: BlockEnv::default(),
            pending: None,
            stop: StopHandle::new(),
            pool,
        })
    }

    pub fn app(&self) -> &A { &self.app }

    pub fn config(&self) -> &ExecutionConfig { &self.config }

    pub fn latest_height(&self) -> u64 { self.store.latest_height() }

    pub fn latest_state(&self) -> Arc<Snapshot> { self.store.latest() }

    pub fn state_root(&self) -> StateRoot { self.store.latest().state_root() }

    /// Stops the block being delivered. Transactions that have not started
    /// yet are not executed and the block is discarded.
    pub fn stop_handle(&self) -> StopHandle { self.stop.clone() }

    pub fn begin_block(&mut self, env: BlockEnv) -> Result<(), BlockError> {
        let expected = self.store.latest_height() + 1;
        if env.height != expected {
            return Err(BlockError::UnexpectedHeight {
                expected,
                got: env.height,
            });
        }
        if let Some(pending) = &self.pending {
            warn!("discarding uncommitted block {}", pending.env.height);
        }
        debug!("begin block {} max_gas={}", env.height, env.max_gas);
        self.stop.reset();
        self.last_env = env.clone();
        self.pending = Some(PendingBlock { env, writes: None });
        Ok(())
    }

    pub fn deliver_block(
        &mut self, raw_txs: &[Bytes],
    ) -> Result<BlockResult, BlockError> {
        self.deliver_block_with(self.config.strategy, raw_txs)
    }

    pub fn deliver_block_with(
        &mut self, strategy: Strategy, raw_txs: &[Bytes],
    ) -> Result<BlockResult, BlockError> {
        let pending = self.pending.as_mut().ok_or(BlockError::NotBegun)?;
        if pending.writes.is_some() {
            return Err(BlockError::AlreadyDelivered(pending.env.height));
        }
        let state = BlockState::new(self.store.latest());
        let block = BlockContext::new(
            &self.app,
            &pending.env,
            &self.config.gas,
            &self.stop,
            &state,
            strategy,
            raw_txs.len(),
            self.exempt_keys.clone(),
        );
        let executed = match strategy {
            Strategy::Sequential => {
                SerialScheduler.execute_block(&block, raw_txs)
            }
            Strategy::Speculative => SpeculativeScheduler::new(&self.pool)
                .execute_block(&block, raw_txs),
            Strategy::Bounded => {
                BoundedScheduler::new(self.config.concurrency_window)
                    .execute_block(&block, raw_txs)
            }
        };
        if let Err(e) = executed {
            warn!("block {} discarded: {}", pending.env.height, e);
            return Err(e);
        }
        let result = block.finish()?;
        pending.writes = Some(state.into_writes());
        Ok(result)
    }

    /// Persists the delivered block and makes it the latest state.
    pub fn commit(&mut self) -> Result<StateRoot, BlockError> {
        let pending = self.pending.take().ok_or(BlockError::NotBegun)?;
        let writes = match pending.writes {
            Some(writes) => writes,
            None => {
                let height = pending.env.height;
                self.pending = Some(pending);
                return Err(BlockError::NotDelivered(height));
            }
        };
        let height = pending.env.height;
        let root = self.store.commit(height, writes)?;
        self.check_state = self.store.latest().as_ref().clone();
        info!("committed block {} state_root={:?}", height, root);
        Ok(root)
    }

    /// Mempool admission. Only the ante check runs; its writes are kept
    /// for later checks if it passes.
    pub fn check_tx(&mut self, raw: &[u8], mode: ExecutionMode) -> TxResponse {
        if !mode.is_check() {
            return rejected(ExecError::Validation(format!(
                "{} is not a check mode",
                mode
            )));
        }
        let env = self.next_env();
        let envelope = match guarded(|| classify(&self.app, 0, raw)) {
            Ok(envelope) => envelope,
            Err(e) => return rejected(e),
        };
        let stop = StopHandle::new();
        let context = ExecutiveContext::new(
            &self.app,
            &env,
            &self.config.gas,
            mode,
            &stop,
        );
        let outcome = context.transact(&envelope, &self.check_state, None);
        let response = outcome.response();
        if let ExecutionOutcome::Finished(executed) = outcome.outcome {
            self.check_state.apply(executed.writes);
        }
        response
    }

    /// Executes a transaction against the state at `height` (0 for
    /// latest) without block or transaction gas limits and discards the
    /// result.
    pub fn simulate(&self, raw: &[u8], height: u64) -> TxResponse {
        self.query(ExecutionMode::Simulate, raw, height)
    }

    /// Re-executes a transaction against the state at `height` (0 for
    /// latest) with its own gas limit and discards the result.
    pub fn trace_tx(&self, raw: &[u8], height: u64) -> TxResponse {
        self.query(ExecutionMode::Trace, raw, height)
    }

    fn query(
        &self, mode: ExecutionMode, raw: &[u8], height: u64,
    ) -> TxResponse {
        let start = match resolve_start_state(mode, height, &self.store) {
            Ok(start) => start,
            Err(e) => return rejected(e),
        };
        let mut env = self.next_env();
        if height != 0 {
            env.height = height;
        }
        let envelope = match guarded(|| classify(&self.app, 0, raw)) {
            Ok(envelope) => envelope,
            Err(e) => return rejected(e),
        };
        let stop = StopHandle::new();
        let context = ExecutiveContext::new(
            &self.app,
            &env,
            &self.config.gas,
            mode,
            &stop,
        );
        context.transact(&envelope, start.as_ref(), None).response()
    }

    fn next_env(&self) -> BlockEnv {
        BlockEnv {
            height: self.store.latest_height() + 1,
            ..self.last_env.clone()
        }
    }
}

fn rejected(error: ExecError) -> TxResponse {
    TxOutcome::not_executed(0, error, GasInfo::default(), ReadSet::new())
        .response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::codes,
        mock_app::{
            account_of, address, balance_of, genesis, MockBankApp, TxBuilder,
            DEFAULT_FEE, DEFAULT_GAS_LIMIT,
        },
    };

    fn engine(strategy: Strategy) -> Engine<MockBankApp> {
        let config = ExecutionConfig {
            strategy,
            speculative_threads: 2,
            ..Default::default()
        };
        let genesis = genesis(&[(address(1), 1_000), (address(2), 1_000)]);
        Engine::new(MockBankApp::new(), config, genesis).unwrap()
    }

    fn env(height: u64) -> BlockEnv {
        BlockEnv {
            height,
            time: 1_600_000_000 + height,
            chain_id: "pexec-test".into(),
            max_gas: 0,
        }
    }

    fn blocks() -> Vec<Vec<Bytes>> {
        vec![
            vec![
                TxBuilder::new(address(1), 0).send(address(2), 100).encode(),
                TxBuilder::new(address(2), 0).send(address(1), 50).encode(),
                TxBuilder::new(address(1), 1).incr("a").encode(),
            ],
            vec![
                TxBuilder::new(address(2), 1).incr("a").fail().encode(),
                TxBuilder::new(address(1), 2).send(address(3), 1).encode(),
            ],
        ]
    }

    #[test]
    fn test_lifecycle_errors() {
        let mut engine = engine(Strategy::Sequential);
        assert!(matches!(
            engine.deliver_block(&[]),
            Err(BlockError::NotBegun)
        ));
        assert!(matches!(
            engine.begin_block(env(2)),
            Err(BlockError::UnexpectedHeight {
                expected: 1,
                got: 2
            })
        ));
        engine.begin_block(env(1)).unwrap();
        assert!(matches!(engine.commit(), Err(BlockError::NotDelivered(1))));
        engine.deliver_block(&[]).unwrap();
        assert!(matches!(
            engine.deliver_block(&[]),
            Err(BlockError::AlreadyDelivered(1))
        ));
        engine.commit().unwrap();
        assert_eq!(engine.latest_height(), 1);
        assert!(matches!(engine.commit(), Err(BlockError::NotBegun)));
    }

    #[test]
    fn test_strategies_agree_across_blocks() {
        let mut roots = Vec::new();
        for strategy in
            [Strategy::Sequential, Strategy::Speculative, Strategy::Bounded]
        {
            let mut engine = engine(strategy);
            let mut results = Vec::new();
            for (i, raw_txs) in blocks().iter().enumerate() {
                engine.begin_block(env(i as u64 + 1)).unwrap();
                let result = engine.deliver_block(raw_txs).unwrap();
                assert_eq!(result.stats.strategy, strategy);
                results.push(result.responses_root());
                engine.commit().unwrap();
            }
            roots.push((results, engine.state_root()));
        }
        assert_eq!(roots[0], roots[1]);
        assert_eq!(roots[0], roots[2]);
    }

    #[test]
    fn test_collector_credited_on_deliver() {
        let mut engine = engine(Strategy::Bounded);
        engine.begin_block(env(1)).unwrap();
        let result = engine.deliver_block(&blocks()[0]).unwrap();
        assert_eq!(result.fees.amount_of("okt"), 3 * DEFAULT_FEE);
        let root = engine.commit().unwrap();
        assert_eq!(root, engine.state_root());

        let state = engine.latest_state();
        let collector = engine.app().fee_collector();
        assert_eq!(balance_of(&*state, &collector), 3 * DEFAULT_FEE);
        assert_eq!(balance_of(&*state, &address(1)), 1_000 - 50 - 20);
    }

    #[test]
    fn test_stopped_block_is_discarded() {
        let mut engine = engine(Strategy::Speculative);
        let root = engine.state_root();
        engine.begin_block(env(1)).unwrap();
        engine.stop_handle().stop();
        assert!(matches!(
            engine.deliver_block(&blocks()[0]),
            Err(BlockError::Stopped)
        ));
        assert!(matches!(engine.commit(), Err(BlockError::NotDelivered(1))));

        // The same height can be begun again.
        engine.begin_block(env(1)).unwrap();
        engine.deliver_block(&blocks()[0]).unwrap();
        assert_ne!(engine.commit().unwrap(), root);
    }

    #[test]
    fn test_check_tx_tracks_nonces() {
        let mut engine = engine(Strategy::Sequential);
        let first = TxBuilder::new(address(1), 0).fail().encode();
        let second = TxBuilder::new(address(1), 1).incr("a").encode();

        assert!(engine.check_tx(&first, ExecutionMode::Check).is_ok());
        // The check state now expects nonce 1.
        let replay = engine.check_tx(&first, ExecutionMode::ReCheck);
        assert_eq!(replay.code, codes::INVALID_SEQUENCE);
        assert!(engine.check_tx(&second, ExecutionMode::Check).is_ok());

        let response = engine.check_tx(&second, ExecutionMode::Deliver);
        assert_eq!(response.code, codes::INVALID_REQUEST);
        let response = engine.check_tx(&[0x01, 0x02], ExecutionMode::Check);
        assert_eq!(response.code, codes::TX_DECODE);

        // Committing a block resets the check state.
        engine.begin_block(env(1)).unwrap();
        engine.deliver_block(&[]).unwrap();
        engine.commit().unwrap();
        assert!(engine.check_tx(&first, ExecutionMode::Check).is_ok());
    }

    #[test]
    fn test_simulate_reads_history() {
        let mut engine = engine(Strategy::Sequential);
        let history = [
            TxBuilder::new(address(1), 0).send(address(2), 900),
            TxBuilder::new(address(1), 1).incr("a"),
        ];
        for (i, tx) in history.iter().enumerate() {
            engine.begin_block(env(i as u64 + 1)).unwrap();
            engine.deliver_block(&[tx.clone().encode()]).unwrap();
            engine.commit().unwrap();
        }

        // Valid only on top of height 1.
        let second = history[1].clone().encode();
        assert!(engine.simulate(&second, 1).is_ok());
        assert!(engine.trace_tx(&second, 1).is_ok());
        let response = engine.simulate(&second, 0);
        assert_eq!(response.code, codes::INVALID_SEQUENCE);
        let response = engine.simulate(&second, 5);
        assert_eq!(response.code, codes::INVALID_HEIGHT);

        let heavy = TxBuilder::new(address(1), 2)
            .burn_gas(DEFAULT_GAS_LIMIT * 3)
            .encode();
        let simulated = engine.simulate(&heavy, 0);
        assert!(simulated.is_ok(), "{}", simulated.log);
        assert!(simulated.gas_used > DEFAULT_GAS_LIMIT * 3);
        let traced = engine.trace_tx(&heavy, 0);
        assert_eq!(traced.code, codes::OUT_OF_GAS);

        // Queries never change state.
        let state = engine.latest_state();
        assert_eq!(account_of(&*state, &address(1)).nonce, 2);
        assert_eq!(balance_of(&*state, &address(1)), 1_000 - 900 - 20);
    }
}

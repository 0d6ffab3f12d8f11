// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use clap::{ArgAction, Parser};
use log::{debug, info};
use pexec_executor::{
    mock_app::{address, genesis, MockBankApp, TxBuilder},
    BlockEnv, BlockError, ConfigError, Engine, ExecutionConfig, Strategy,
};
use pexec_primitives::{Bytes, H256};
use pexec_statedb::StateRoot;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

const GENESIS_BALANCE: u64 = 1_000_000_000;
const HOT_COUNTER: &str = "hot";

/// Executes generated blocks of bank transactions with each scheduling
/// strategy and reports how long they took.
#[derive(Parser, Debug)]
#[command(name = "pexec-bench", version)]
pub struct BenchCmd {
    /// Engine configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Strategies to run; defaults to all of them
    #[arg(short, long, value_delimiter = ',')]
    strategies: Vec<Strategy>,

    #[arg(long, default_value_t = 10)]
    blocks: u64,

    /// Transactions per block
    #[arg(long, default_value_t = 1000)]
    txs: usize,

    #[arg(long, default_value_t = 200)]
    senders: u64,

    /// Share of transactions incrementing one shared counter
    #[arg(long, default_value_t = 0.05)]
    hot_ratio: f64,

    /// Block gas limit, 0 for unlimited
    #[arg(long, default_value_t = 0)]
    max_gas: u64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Fail unless every strategy produces the same results
    #[arg(long)]
    compare: bool,

    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{strategy} diverged from {reference} at block {height}")]
    Mismatch {
        strategy: Strategy,
        reference: Strategy,
        height: u64,
    },
}

/// What a strategy produced for every block.
struct Run {
    strategy: Strategy,
    /// Responses root and state root per block.
    roots: Vec<(H256, StateRoot)>,
    elapsed: Duration,
    reruns: usize,
    ante_reruns: usize,
}

impl BenchCmd {
    pub fn run(&self) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&self.hot_ratio) {
            return Err(Error::InvalidArgument(format!(
                "hot_ratio must be within [0, 1], got {}",
                self.hot_ratio
            )));
        }
        let config = match &self.config {
            Some(path) => ExecutionConfig::load(path)?,
            None => ExecutionConfig::default(),
        };
        let strategies = if self.strategies.is_empty() {
            vec![Strategy::Sequential, Strategy::Speculative, Strategy::Bounded]
        } else {
            self.strategies.clone()
        };
        let blocks = self.generate_blocks();
        info!(
            "generated {} blocks of {} txs from {} senders",
            blocks.len(),
            self.txs,
            self.senders
        );

        let mut runs = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            runs.push(self.run_strategy(&config, strategy, &blocks)?);
        }
        for run in &runs {
            println!(
                "{:<12} {:>10.1?} {:>10.0} tx/s  reruns={} ante_reruns={}",
                run.strategy.to_string(),
                run.elapsed,
                self.throughput(run.elapsed),
                run.reruns,
                run.ante_reruns
            );
        }
        if self.compare {
            compare(&runs)?;
        }
        Ok(())
    }

    fn run_strategy(
        &self, config: &ExecutionConfig, strategy: Strategy,
        blocks: &[Vec<Bytes>],
    ) -> Result<Run, Error> {
        let config = ExecutionConfig {
            strategy,
            ..config.clone()
        };
        let accounts: Vec<_> = (1..=self.senders)
            .map(|i| (address(i), GENESIS_BALANCE))
            .collect();
        let mut engine =
            Engine::new(MockBankApp::new(), config, genesis(&accounts))?;
        let mut run = Run {
            strategy,
            roots: Vec::with_capacity(blocks.len()),
            elapsed: Duration::ZERO,
            reruns: 0,
            ante_reruns: 0,
        };
        for (i, raw_txs) in blocks.iter().enumerate() {
            let height = i as u64 + 1;
            engine.begin_block(BlockEnv {
                height,
                time: height,
                chain_id: "pexec-bench".into(),
                max_gas: self.max_gas,
            })?;
            let result = engine.deliver_block(raw_txs)?;
            let root = engine.commit()?;
            debug!(
                "{} block {}: gas_used={} fees={}",
                strategy, height, result.gas_used, result.fees
            );
            run.elapsed += result.stats.elapsed;
            run.reruns += result.stats.reruns;
            run.ante_reruns += result.stats.ante_reruns;
            run.roots.push((result.responses_root(), root));
        }
        Ok(run)
    }

    /// Transfers between random senders, with a share of transactions
    /// contending on one counter. Nonces follow the order of generation so
    /// every transaction is valid unless the block runs out of gas.
    fn generate_blocks(&self) -> Vec<Vec<Bytes>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let senders = self.senders.max(1);
        let mut nonces = vec![0u64; senders as usize + 1];
        (0..self.blocks)
            .map(|_| {
                (0..self.txs)
                    .map(|_| {
                        let sender = rng.gen_range(1..=senders);
                        let nonce = nonces[sender as usize];
                        nonces[sender as usize] += 1;
                        let builder = TxBuilder::new(address(sender), nonce);
                        if rng.gen_bool(self.hot_ratio) {
                            builder.incr(HOT_COUNTER).encode()
                        } else {
                            let to = address(rng.gen_range(1..=senders));
                            builder.send(to, rng.gen_range(1..100)).encode()
                        }
                    })
                    .collect()
            })
            .collect()
    }

    fn throughput(&self, elapsed: Duration) -> f64 {
        let txs = self.blocks as f64 * self.txs as f64;
        txs / elapsed.as_secs_f64().max(f64::EPSILON)
    }
}

fn compare(runs: &[Run]) -> Result<(), Error> {
    let reference = match runs.first() {
        Some(reference) => reference,
        None => return Ok(()),
    };
    for run in &runs[1..] {
        let diverged = run
            .roots
            .iter()
            .zip(&reference.roots)
            .position(|(got, want)| got != want);
        if let Some(i) = diverged {
            return Err(Error::Mismatch {
                strategy: run.strategy,
                reference: reference.strategy,
                height: i as u64 + 1,
            });
        }
    }
    info!("all {} strategies agree", runs.len());
    Ok(())
}

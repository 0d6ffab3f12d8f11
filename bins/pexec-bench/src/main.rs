// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

mod cmd;

use clap::Parser;
use cmd::BenchCmd;
use log::LevelFilter;

/// Crates whose records the bench prints.
const LOG_TARGETS: [&str; 3] =
    ["pexec_bench", "pexec_executor", "pexec_statedb"];

/// `-v` steps from info to debug to trace.
fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Logs go to stderr so the report on stdout stays clean. `RUST_LOG`
/// directives are applied last and win over `-v`.
fn init_logger(verbosity: u8) {
    let level = level_for(verbosity);
    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Warn);
    for target in LOG_TARGETS {
        builder.filter_module(target, level);
    }
    builder.parse_default_env().format_timestamp_millis().init();
}

fn main() {
    let cmd = BenchCmd::parse();
    init_logger(cmd.verbose);
    if let Err(e) = cmd.run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(level_for(0), LevelFilter::Info);
        assert_eq!(level_for(1), LevelFilter::Debug);
        assert_eq!(level_for(2), LevelFilter::Trace);
        assert_eq!(level_for(9), LevelFilter::Trace);
    }
}

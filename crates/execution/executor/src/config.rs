// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::mode::Strategy;
use pexec_primitives::Bytes;
use rustc_hex::FromHex;
use serde_derive::Deserialize;
use std::{fs, path::Path};
use thiserror::Error;

pub const DEFAULT_CONCURRENCY_WINDOW: usize = 4;
pub const DEFAULT_STATE_HISTORY: u64 = 100;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid conflict exempt key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Gas charged by the store for every access made during execution.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GasConfig {
    pub has_cost: u64,
    pub delete_cost: u64,
    pub read_cost_flat: u64,
    pub read_cost_per_byte: u64,
    pub write_cost_flat: u64,
    pub write_cost_per_byte: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        GasConfig {
            has_cost: 1000,
            delete_cost: 1000,
            read_cost_flat: 1000,
            read_cost_per_byte: 3,
            write_cost_flat: 2000,
            write_cost_per_byte: 30,
        }
    }
}

impl GasConfig {
    pub fn read_cost(&self, value_len: usize) -> u64 {
        let per_byte =
            self.read_cost_per_byte.saturating_mul(value_len as u64);
        self.read_cost_flat.saturating_add(per_byte)
    }

    pub fn write_cost(&self, key_len: usize, value_len: usize) -> u64 {
        let bytes = (key_len + value_len) as u64;
        self.write_cost_flat
            .saturating_add(self.write_cost_per_byte.saturating_mul(bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    pub strategy: Strategy,
    /// Transactions in flight at once in the bounded scheduler.
    pub concurrency_window: usize,
    /// Threads of the speculative pool, 0 for available parallelism.
    pub speculative_threads: usize,
    /// Hex encoded keys exempt from conflict detection, on top of those the
    /// application declares.
    pub conflict_exempt_keys: Vec<String>,
    /// Committed heights kept for historical queries.
    pub state_history: u64,
    pub gas: GasConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            strategy: Strategy::default(),
            concurrency_window: DEFAULT_CONCURRENCY_WINDOW,
            speculative_threads: 0,
            conflict_exempt_keys: Vec::new(),
            state_history: DEFAULT_STATE_HISTORY,
            gas: GasConfig::default(),
        }
    }
}

impl ExecutionConfig {
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: ExecutionConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_window == 0 {
            return Err(ConfigError::InvalidValue(
                "concurrency_window must be at least 1".into(),
            ));
        }
        if self.state_history == 0 {
            return Err(ConfigError::InvalidValue(
                "state_history must be at least 1".into(),
            ));
        }
        self.exempt_keys().map(|_| ())
    }

    pub fn exempt_keys(&self) -> Result<Vec<Bytes>, ConfigError> {
        self.conflict_exempt_keys
            .iter()
            .map(|key| {
                key.trim_start_matches("0x").from_hex::<Bytes>().map_err(|e| {
                    ConfigError::InvalidKey {
                        key: key.clone(),
                        reason: e.to_string(),
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecutionConfig::from_toml("").unwrap();
        assert_eq!(config, ExecutionConfig::default());
        assert_eq!(config.concurrency_window, 4);
        assert_eq!(config.gas.write_cost(2, 3), 2000 + 30 * 5);
        assert_eq!(config.gas.read_cost(10), 1030);
    }

    #[test]
    fn test_parse() {
        let config = ExecutionConfig::from_toml(
            r#"
            strategy = "bounded"
            concurrency_window = 8
            conflict_exempt_keys = ["0x6163632f", "ff"]

            [gas]
            read_cost_flat = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.strategy, Strategy::Bounded);
        assert_eq!(config.concurrency_window, 8);
        assert_eq!(config.gas.read_cost_flat, 10);
        assert_eq!(config.gas.write_cost_flat, 2000);
        assert_eq!(
            config.exempt_keys().unwrap(),
            vec![b"acc/".to_vec(), vec![0xff]]
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            ExecutionConfig::from_toml("concurrency_window = 0"),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            ExecutionConfig::from_toml(r#"conflict_exempt_keys = ["zz"]"#),
            Err(ConfigError::InvalidKey { .. })
        ));
        assert!(matches!(
            ExecutionConfig::from_toml("unknown = 1"),
            Err(ConfigError::Toml(_))
        ));
    }
}

// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use serde_derive::Deserialize;
use strum_macros::{Display, EnumString};

/// Selects the behavior of the few mode-specific pipeline steps; the rest
/// of the pipeline is the same for every mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionMode {
    Check,
    ReCheck,
    WrappedCheck,
    Simulate,
    Deliver,
    DeliverConcurrentSpeculative,
    DeliverConcurrentBounded,
    Trace,
}

/// How a mode settles its gas usage against the block gas meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockGasPolicy {
    None,
    /// Charged when the transaction finalizes.
    Immediate,
    /// Charged by the scheduler when the result is accepted.
    Deferred,
}

impl ExecutionMode {
    pub fn is_check(self) -> bool {
        matches!(
            self,
            ExecutionMode::Check
                | ExecutionMode::ReCheck
                | ExecutionMode::WrappedCheck
        )
    }

    pub fn is_deliver(self) -> bool {
        matches!(
            self,
            ExecutionMode::Deliver
                | ExecutionMode::DeliverConcurrentSpeculative
                | ExecutionMode::DeliverConcurrentBounded
        )
    }

    pub fn runs_messages(self) -> bool { !self.is_check() }

    /// Whether the start state is picked by height instead of being the
    /// latest state.
    pub fn reads_history(self) -> bool {
        matches!(self, ExecutionMode::Simulate | ExecutionMode::Trace)
    }

    pub fn block_gas_policy(self) -> BlockGasPolicy {
        match self {
            ExecutionMode::Deliver
            | ExecutionMode::DeliverConcurrentBounded => {
                BlockGasPolicy::Immediate
            }
            ExecutionMode::DeliverConcurrentSpeculative => {
                BlockGasPolicy::Deferred
            }
            _ => BlockGasPolicy::None,
        }
    }

    pub fn applies_refund(self) -> bool {
        self.is_deliver() || self == ExecutionMode::Trace
    }

    pub fn unlimited_gas(self) -> bool { self == ExecutionMode::Simulate }
}

/// Block scheduling strategy.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Sequential,
    Speculative,
    Bounded,
}

impl Strategy {
    pub fn deliver_mode(self) -> ExecutionMode {
        match self {
            Strategy::Sequential => ExecutionMode::Deliver,
            Strategy::Speculative => {
                ExecutionMode::DeliverConcurrentSpeculative
            }
            Strategy::Bounded => ExecutionMode::DeliverConcurrentBounded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_mode_names() {
        assert_eq!(ExecutionMode::ReCheck.to_string(), "re_check");
        assert_eq!(
            ExecutionMode::from_str("deliver_concurrent_bounded").unwrap(),
            ExecutionMode::DeliverConcurrentBounded
        );
        assert_eq!(
            Strategy::from_str("speculative").unwrap(),
            Strategy::Speculative
        );
        assert!(Strategy::from_str("parallel").is_err());
    }

    #[test]
    fn test_mode_behavior() {
        assert!(!ExecutionMode::WrappedCheck.runs_messages());
        assert!(ExecutionMode::Simulate.runs_messages());
        assert!(ExecutionMode::Trace.reads_history());
        assert!(!ExecutionMode::Deliver.reads_history());
        assert_eq!(
            ExecutionMode::DeliverConcurrentSpeculative.block_gas_policy(),
            BlockGasPolicy::Deferred
        );
        assert_eq!(
            ExecutionMode::Check.block_gas_policy(),
            BlockGasPolicy::None
        );
        assert!(!ExecutionMode::Simulate.applies_refund());
    }
}

// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::error::ExecError;
use parking_lot::Mutex;

/// Details of a gas limit violation. Handlers may also abort with
/// `std::panic::panic_any(OutOfGas { .. })`; the pipeline turns that into
/// the same error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutOfGas {
    pub descriptor: String,
    pub limit: u64,
    pub consumed: u64,
}

/// Gas meter of a single transaction.
#[derive(Debug, Clone)]
pub struct GasMeter {
    limit: u64,
    consumed: u64,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self { GasMeter { limit, consumed: 0 } }

    pub fn infinite() -> Self { Self::new(u64::MAX) }

    /// A meter with `limit` that has already consumed `consumed`.
    pub fn resume(limit: u64, consumed: u64) -> Self {
        GasMeter { limit, consumed }
    }

    pub fn limit(&self) -> u64 { self.limit }

    pub fn consumed(&self) -> u64 { self.consumed }

    pub fn remaining(&self) -> u64 { self.limit.saturating_sub(self.consumed) }

    pub fn is_past_limit(&self) -> bool { self.consumed > self.limit }

    pub fn consume(
        &mut self, amount: u64, descriptor: &str,
    ) -> Result<(), ExecError> {
        self.consumed = self.consumed.saturating_add(amount);
        if self.consumed > self.limit {
            return Err(ExecError::OutOfGas(OutOfGas {
                descriptor: descriptor.to_string(),
                limit: self.limit,
                consumed: self.consumed,
            }));
        }
        Ok(())
    }
}

struct BlockGasState {
    consumed: u64,
    exhausted: bool,
}

/// Aggregate gas of a block. A limit of 0 means unlimited. Once a
/// transaction overflows the limit the meter stays exhausted.
pub struct BlockGasMeter {
    limit: u64,
    state: Mutex<BlockGasState>,
}

impl BlockGasMeter {
    pub fn new(limit: u64) -> Self {
        BlockGasMeter {
            limit,
            state: Mutex::new(BlockGasState {
                consumed: 0,
                exhausted: false,
            }),
        }
    }

    pub fn limit(&self) -> u64 { self.limit }

    pub fn consumed(&self) -> u64 { self.state.lock().consumed }

    pub fn is_exhausted(&self) -> bool { self.state.lock().exhausted }

    pub fn would_exceed(&self, amount: u64) -> bool {
        let state = self.state.lock();
        state.exhausted || self.exceeds(state.consumed, amount)
    }

    pub fn consume(&self, amount: u64) -> Result<(), ExecError> {
        let mut state = self.state.lock();
        if state.exhausted {
            return Err(ExecError::OutOfBlockGas);
        }
        if self.exceeds(state.consumed, amount) {
            state.exhausted = true;
            return Err(ExecError::OutOfBlockGas);
        }
        state.consumed = state.consumed.saturating_add(amount);
        Ok(())
    }

    fn exceeds(&self, consumed: u64, amount: u64) -> bool {
        self.limit != 0
            && consumed.checked_add(amount).map_or(true, |t| t > self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_meter() {
        let mut meter = GasMeter::resume(100, 40);
        meter.consume(60, "write").unwrap();
        assert_eq!(meter.remaining(), 0);
        let err = meter.consume(1, "read").unwrap_err();
        assert_eq!(
            err,
            ExecError::OutOfGas(OutOfGas {
                descriptor: "read".into(),
                limit: 100,
                consumed: 101
            })
        );
        assert!(meter.is_past_limit());
    }

    #[test]
    fn test_block_meter_boundary() {
        let meter = BlockGasMeter::new(100);
        meter.consume(60).unwrap();
        // Reaching the limit exactly is allowed.
        assert!(!meter.would_exceed(40));
        assert!(meter.would_exceed(41));
        assert_eq!(meter.consume(41), Err(ExecError::OutOfBlockGas));
        assert!(meter.is_exhausted());
        assert_eq!(meter.consume(0), Err(ExecError::OutOfBlockGas));
        assert_eq!(meter.consumed(), 60);
    }

    #[test]
    fn test_unlimited_block_meter() {
        let meter = BlockGasMeter::new(0);
        meter.consume(u64::MAX).unwrap();
        assert!(!meter.is_exhausted());
    }
}

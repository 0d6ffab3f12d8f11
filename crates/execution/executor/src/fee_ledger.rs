// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{
    conflict::ConflictTracker, context::Application, error::ExecError,
    executive::FeeCharge,
};
use parking_lot::Mutex;
use pexec_primitives::Coins;
use pexec_statedb::{BlockState, CacheStore, KvStore};
use rustc_hex::ToHex;

#[derive(Debug, Default)]
struct LedgerState {
    total: Coins,
    flushed: bool,
}

/// Net fees of the accepted transactions of one block. The fee collector is
/// credited once, after the last transaction, so that charging fees never
/// makes two transactions conflict on the collector account.
#[derive(Debug, Default)]
pub struct FeeLedger {
    state: Mutex<LedgerState>,
}

impl FeeLedger {
    pub fn new() -> Self { Self::default() }

    pub fn add_fee(&self, fee: &Coins) {
        let mut state = self.state.lock();
        Self::assert_open(&state);
        state.total = match state.total.checked_add(fee) {
            Ok(total) => total,
            Err(e) => {
                error!("fee ledger overflow adding {}: {}", fee, e);
                panic!("fee ledger overflow: {}", e);
            }
        };
    }

    pub fn sub_fee(&self, refund: &Coins) {
        let mut state = self.state.lock();
        Self::assert_open(&state);
        state.total = match state.total.checked_sub(refund) {
            Ok(total) => total,
            Err(e) => {
                error!(
                    "fee ledger underflow subtracting {} from {}: {}",
                    refund, state.total, e
                );
                panic!("fee ledger underflow: {}", e);
            }
        };
    }

    /// Books the fee of one accepted transaction.
    pub fn record(&self, charge: &FeeCharge) {
        self.add_fee(&charge.charged);
        if !charge.refunded.is_zero() {
            self.sub_fee(&charge.refunded);
        }
    }

    pub fn total(&self) -> Coins { self.state.lock().total.clone() }

    pub fn is_flushed(&self) -> bool { self.state.lock().flushed }

    /// Hands the block total to the application's fee collector and applies
    /// the resulting writes to `block_state`. Can only happen once. The
    /// update may only write keys `conflicts` exempts.
    pub fn flush<A: Application + ?Sized>(
        &self, app: &A, block_state: &BlockState, conflicts: &ConflictTracker,
    ) -> Result<Coins, ExecError> {
        let total = {
            let mut state = self.state.lock();
            Self::assert_open(&state);
            state.flushed = true;
            state.total.clone()
        };
        if total.is_zero() {
            return Ok(total);
        }
        let mut store = CacheStore::new(block_state);
        app.update_fee_collector(&mut store as &mut dyn KvStore, &total)?;
        let writes = store.into_writes();
        if let Some(key) = conflicts.unexempt_key(&writes) {
            return Err(ExecError::Validation(format!(
                "fee collector update wrote non-exempt key {}",
                key.to_hex::<String>()
            )));
        }
        block_state.apply(writes);
        debug!("credited {} to the fee collector", total);
        Ok(total)
    }

    fn assert_open(state: &LedgerState) {
        if state.flushed {
            error!("fee ledger used after flush");
            panic!("fee ledger used after flush");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_app::{MockBankApp, FEE_DENOM};
    use pexec_primitives::{Account, Coin};
    use pexec_statedb::{Snapshot, StateViewExt};
    use std::sync::Arc;

    fn okt(amount: u64) -> Coins { Coins::single(FEE_DENOM, amount) }

    fn exempt(app: &MockBankApp) -> ConflictTracker {
        ConflictTracker::new(app.conflict_exempt_keys())
    }

    #[test]
    fn test_record_nets_refunds() {
        let ledger = FeeLedger::new();
        ledger.record(&FeeCharge {
            charged: okt(100),
            refunded: okt(30),
        });
        ledger.record(&FeeCharge {
            charged: Coins::new(vec![
                Coin::new(FEE_DENOM, 5),
                Coin::new("usd", 2),
            ]),
            refunded: Coins::empty(),
        });
        assert_eq!(
            ledger.total(),
            Coins::new(vec![Coin::new(FEE_DENOM, 75), Coin::new("usd", 2)])
        );
    }

    #[test]
    fn test_flush_credits_collector_once() {
        let app = MockBankApp::new();
        let state = BlockState::new(Arc::new(Snapshot::new()));
        let ledger = FeeLedger::new();
        ledger.add_fee(&okt(42));

        let flushed = ledger.flush(&app, &state, &exempt(&app)).unwrap();
        assert_eq!(flushed, okt(42));
        assert!(ledger.is_flushed());
        let collector: Account = state
            .get_decoded(&app.fee_collector_key())
            .unwrap()
            .unwrap();
        assert_eq!(collector.balance, okt(42));
    }

    #[test]
    fn test_empty_flush_writes_nothing() {
        let app = MockBankApp::new();
        let state = BlockState::new(Arc::new(Snapshot::new()));
        let ledger = FeeLedger::new();
        let flushed = ledger.flush(&app, &state, &exempt(&app)).unwrap();
        assert!(flushed.is_zero());
        assert!(state.pending_writes().is_empty());
    }

    #[test]
    fn test_flush_rejects_unexempt_collector() {
        let app = MockBankApp::new();
        let state = BlockState::new(Arc::new(Snapshot::new()));
        let ledger = FeeLedger::new();
        ledger.add_fee(&okt(42));

        let none_exempt = ConflictTracker::new(vec![]);
        assert!(matches!(
            ledger.flush(&app, &state, &none_exempt),
            Err(ExecError::Validation(_))
        ));
        assert!(state.pending_writes().is_empty());
    }

    #[test]
    #[should_panic(expected = "fee ledger used after flush")]
    fn test_add_after_flush_panics() {
        let app = MockBankApp::new();
        let state = BlockState::new(Arc::new(Snapshot::new()));
        let ledger = FeeLedger::new();
        ledger.flush(&app, &state, &exempt(&app)).unwrap();
        ledger.add_fee(&okt(1));
    }

    #[test]
    #[should_panic(expected = "fee ledger underflow")]
    fn test_refund_beyond_total_panics() {
        let ledger = FeeLedger::new();
        ledger.add_fee(&okt(1));
        ledger.sub_fee(&okt(2));
    }
}

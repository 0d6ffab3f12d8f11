// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

//! Turns panics raised by application code into per-transaction errors.

use crate::{error::ExecError, gas::OutOfGas};
use std::{
    any::Any,
    backtrace::Backtrace,
    cell::{Cell, RefCell},
    panic::{self, AssertUnwindSafe},
    sync::Once,
};

thread_local! {
    static GUARD_DEPTH: Cell<usize> = Cell::new(0);
    static LAST_PANIC: RefCell<Option<String>> = RefCell::new(None);
}

static INSTALL_HOOK: Once = Once::new();

/// Panics inside a guard are recorded with their backtrace instead of being
/// printed; all other panics go to the previous hook.
fn install_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARD_DEPTH.with(|depth| depth.get()) > 0 {
                let backtrace = Backtrace::force_capture();
                let message = format!("{}\n{}", info, backtrace);
                LAST_PANIC.with(|last| *last.borrow_mut() = Some(message));
            } else {
                previous(info)
            }
        }));
    });
}

/// Runs `f`, converting a panic into `ExecError::OutOfGas` when the payload
/// is an `OutOfGas`, and into `ExecError::Panic` otherwise.
pub(crate) fn guarded<T>(
    f: impl FnOnce() -> Result<T, ExecError>,
) -> Result<T, ExecError> {
    install_hook();
    GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    GUARD_DEPTH.with(|depth| depth.set(depth.get() - 1));
    result.unwrap_or_else(|payload| Err(from_payload(payload)))
}

fn from_payload(payload: Box<dyn Any + Send>) -> ExecError {
    let captured = LAST_PANIC.with(|last| last.borrow_mut().take());
    if let Some(out_of_gas) = payload.downcast_ref::<OutOfGas>() {
        return ExecError::OutOfGas(out_of_gas.clone());
    }
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    debug!(
        "recovered from panic during execution: {}",
        captured.as_deref().unwrap_or(&message)
    );
    ExecError::Panic { message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_passes_results() {
        assert_eq!(guarded(|| Ok(3)), Ok(3));
        assert_eq!(
            guarded::<()>(|| Err(ExecError::OutOfBlockGas)),
            Err(ExecError::OutOfBlockGas)
        );
    }

    #[test]
    fn test_guard_catches_panics() {
        let err = guarded::<()>(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(
            err,
            ExecError::Panic {
                message: "boom 1".into()
            }
        );

        let err = guarded::<()>(|| {
            std::panic::panic_any(OutOfGas {
                descriptor: "burn".into(),
                limit: 5,
                consumed: 9,
            })
        })
        .unwrap_err();
        assert!(err.is_out_of_gas());
    }

    #[test]
    fn test_nested_guards() {
        let outer = guarded(|| {
            let inner = guarded::<()>(|| panic!("inner"));
            assert!(inner.unwrap_err().is_panic());
            Ok(1)
        });
        assert_eq!(outer, Ok(1));
    }
}

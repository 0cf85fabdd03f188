//! Catching handler panics together with the backtrace of where they happened.
//!
//! A process-wide panic hook, installed once, records a backtrace into a thread-local while a
//! guarded closure runs and stays silent for those panics; panics outside a guard still reach
//! the previously installed hook.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

thread_local! {
    static GUARDED: Cell<bool> = const { Cell::new(false) };
    static LAST_TRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// A caught panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicReport {
    pub message: String,
    pub backtrace: String,
}

impl fmt::Display for PanicReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARDED.with(Cell::get) {
                let trace = Backtrace::force_capture();
                LAST_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            } else {
                previous(info);
            }
        }));
    });
}

/// Runs `f`, turning a panic into a [`PanicReport`].
pub fn guard<F, R>(f: F) -> Result<R, PanicReport>
where
    F: FnOnce() -> R,
{
    install_hook();
    let outer = GUARDED.with(|guarded| guarded.replace(true));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    GUARDED.with(|guarded| guarded.set(outer));

    result.map_err(|payload| PanicReport {
        message: panic_message(payload.as_ref()),
        backtrace: LAST_TRACE
            .with(|slot| slot.borrow_mut().take())
            .map(|trace| trace.to_string())
            .unwrap_or_default(),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

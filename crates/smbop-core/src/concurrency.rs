//! Ctrl-C handling for long reconcile runs.
//!
//! The first interrupt lets the running pass finish and asks loops to stop
//! before the next one. A second interrupt aborts the process.

use std::sync::atomic::{AtomicU8, Ordering};
use tracing::warn;

/// Exit status when a second interrupt aborts mid-pass.
pub const ABORT_EXIT_CODE: i32 = 130;

static INTERRUPTS: AtomicU8 = AtomicU8::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnInterrupt {
    StopAfterPass,
    Abort,
}

fn on_interrupt(seen_before: u8) -> OnInterrupt {
    if seen_before == 0 {
        OnInterrupt::StopAfterPass
    } else {
        OnInterrupt::Abort
    }
}

pub fn install_signal_handler() {
    let installed = ctrlc::set_handler(|| {
        match on_interrupt(INTERRUPTS.fetch_add(1, Ordering::SeqCst)) {
            OnInterrupt::StopAfterPass => {
                eprintln!("\ninterrupted: stopping after the current pass (Ctrl-C again aborts)");
            }
            OnInterrupt::Abort => std::process::exit(ABORT_EXIT_CODE),
        }
    });
    if let Err(e) = installed {
        warn!("Ctrl-C handler not installed: {e}");
    }
}

/// True once the user has interrupted at least once.
pub fn shutdown_requested() -> bool {
    INTERRUPTS.load(Ordering::SeqCst) > 0
}

//! User interrupt handling.
//!
//! SIGINT and SIGTERM raise a process wide flag which the dispatcher,
//! sampler and console check while waiting. Handlers are installed without
//! `SA_RESTART` so blocking reads return early when a signal arrives.

use std::os::raw::c_int;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::Cancel;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_: c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Register interrupt handlers for SIGINT and SIGTERM
pub fn install() -> Result<(), nix::Error> {
    let action = SigAction::new(SigHandler::Handler(on_signal), SaFlags::empty(), SigSet::empty());

    for s in [Signal::SIGINT, Signal::SIGTERM].iter() {
        // Safety: the handler only performs an atomic store, which is
        // async-signal-safe
        unsafe { sigaction(*s, &action) }?;
    }

    debug!("Interrupt handlers installed");

    Ok(())
}

/// Cancellation bound to the interrupt flag
pub fn cancel() -> Cancel {
    Cancel::on(&INTERRUPTED)
}

//! Signal-driven cooperative shutdown
//!
//! A single [`TerminationFlag`] is created by the monitor and cloned into every
//! worker thread. The signal handler only flips that flag and writes one raw
//! line to stderr; all cleanup happens on the threads that poll it.

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Process-wide termination request, polled once per loop iteration.
#[derive(Debug, Clone, Default)]
pub struct TerminationFlag(Arc<AtomicBool>);

impl TerminationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

static HANDLER_FLAG: OnceLock<TerminationFlag> = OnceLock::new();
static IN_HANDLER: AtomicBool = AtomicBool::new(false);

const ABORT_MESSAGE: &[u8] = b"Received signal...\taborting.\n";

extern "C" fn handle_signal(_signal: nix::libc::c_int) {
    if IN_HANDLER.swap(true, Ordering::AcqRel) {
        return;
    }

    if let Some(flag) = HANDLER_FLAG.get() {
        flag.request();
    }

    // Only async-signal-safe work from here on
    let _ = nix::unistd::write(std::io::stderr(), ABORT_MESSAGE);
}

/// Route SIGINT, SIGTERM and SIGABRT to `flag`.
///
/// Only the first flag registered is ever signalled; later calls keep the
/// handlers installed but cannot swap the target.
pub fn install_handlers(flag: &TerminationFlag) -> nix::Result<()> {
    if HANDLER_FLAG.set(flag.clone()).is_err() {
        log::warn!("Signal handlers already bound to another termination flag");
    }

    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );

    for sig in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGABRT] {
        // SAFETY: the handler touches only atomics and write(2).
        unsafe { signal::sigaction(sig, &action) }?;
    }

    log::debug!("Installed termination handlers for SIGINT, SIGTERM, SIGABRT");
    Ok(())
}

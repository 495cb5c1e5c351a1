//! SIGINT/SIGTERM handling

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use efca_core::ShutdownToken;
use signal_hook::consts::{SIGINT, SIGTERM};

/// Exit status used when a second signal forces the process down.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Handler body. Returns `true` when the process should exit immediately.
///
/// Only signals count toward "second signal": a shutdown already requested
/// through the API or by the loop finishing does not.
fn on_signal(signalled: &AtomicBool, shutdown: &AtomicBool) -> bool {
    if signalled.swap(true, Ordering::SeqCst) {
        return true;
    }
    shutdown.store(true, Ordering::SeqCst);
    false
}

/// First signal requests graceful shutdown through `token`.
/// A second one exits immediately with [`FORCED_EXIT_CODE`].
pub fn install(token: &ShutdownToken) -> Result<()> {
    let signalled = Arc::new(AtomicBool::new(false));
    for (signal, name) in [(SIGINT, "SIGINT"), (SIGTERM, "SIGTERM")] {
        let flag = token.flag();
        let signalled = Arc::clone(&signalled);
        // SAFETY: the handler only does atomic swaps/stores and `_exit`, all
        // async-signal-safe
        let registered = unsafe {
            signal_hook::low_level::register(signal, move || {
                if on_signal(&signalled, &flag) {
                    signal_hook::low_level::exit(FORCED_EXIT_CODE);
                }
            })
        };
        registered.with_context(|| format!("failed to register {name} handler"))?;
    }
    Ok(())
}

//! Cooperative shutdown for busy-polling workers.
//!
//! A `RunningFlag` starts out true and is flipped to false exactly once.
//! Receive loops check it on every iteration; nothing else cancels them.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct RunningFlag {
    running: Arc<AtomicBool>,
}

impl RunningFlag {
    pub fn new() -> RunningFlag {
        RunningFlag { running: Arc::new(AtomicBool::new(true)) }
    }

    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

impl Default for RunningFlag {
    fn default() -> RunningFlag {
        RunningFlag::new()
    }
}

// Signal handlers cannot capture, so the flag they stop has to live here
static SIGNAL_FLAG: spin::Once<RunningFlag> = spin::Once::new();

extern "C" fn on_signal(_signal: libc::c_int) {
    // Only an atomic store, which is async-signal-safe
    if let Some(flag) = SIGNAL_FLAG.get() {
        flag.stop();
    }
}

/// Stops `flag` on SIGINT or SIGTERM.
/// Only the first flag passed here is ever bridged; later calls keep the original one.
pub fn stop_on_signals(flag: &RunningFlag) -> io::Result<()> {
    SIGNAL_FLAG.call_once(|| flag.clone());
    for signal in [libc::SIGINT, libc::SIGTERM] {
        let previous = unsafe { libc::signal(signal, on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t) };
        if previous == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running_and_stops_for_all_clones() {
        let flag = RunningFlag::new();
        let worker = flag.clone();
        assert!(worker.is_running());
        flag.stop();
        assert!(!worker.is_running());
        flag.stop();
        assert!(!flag.is_running());
    }
}

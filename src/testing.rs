// SPDX-License-Identifier: MIT

//! Test-only watchdog, grounded on `oxidizer_testing::execute_or_terminate_process`.
//!
//! `corio`'s computations are `!Send`, so a regression that deadlocks the scheduler (a task
//! waiting on a condition nothing will ever fulfill) cannot be recovered by moving it to a
//! background thread and abandoning it, the way `oxidizer_testing::execute_or_abandon` does for
//! `Send` work. Instead a watchdog thread races the test body and terminates the process outright
//! if the deadline passes, so a hang fails the test run instead of hanging it indefinitely.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::time::Duration;
use std::{process, thread};

/// If a [`run`][crate::run] call under test has not returned within this long, something is
/// deadlocked; conservative on purpose since this only guards against infinite hangs, not slow
/// but expected I/O.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs `f` on the current thread, with a background watchdog that terminates the process if `f`
/// has not returned within [`TEST_TIMEOUT`].
///
/// `f` is typically a closure that calls [`crate::run`] on some scenario under test; `corio`'s
/// task-local types are `!Send`, so `f` cannot be moved to the watchdog thread itself.
///
/// # Panics
///
/// Re-raises any panic `f` raised.
pub fn run_with_watchdog<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let (sender, receiver) = mpsc::channel();

    let watchdog = thread::Builder::new()
        .name("corio test watchdog".to_string())
        .spawn(move || {
            if receiver.recv_timeout(TEST_TIMEOUT) != Ok(()) {
                eprintln!("corio test timed out after {TEST_TIMEOUT:?}, terminating process.");
                process::exit(112);
            }
        })
        .expect("spawning the watchdog thread should never fail under normal operation");

    let result = catch_unwind(AssertUnwindSafe(f));

    sender.send(()).expect("watchdog thread is still waiting to receive");
    watchdog.join().expect("watchdog thread does not panic");

    match result {
        Ok(value) => value,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_closure_returns_its_value() {
        assert_eq!(run_with_watchdog(|| 1 + 1), 2);
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn panic_is_reraised() {
        run_with_watchdog(|| panic!("boom"));
    }
}

// SPDX-License-Identifier: MIT

//! [`run`]: the outermost driver, per `spec.md` §4.4.

use std::future::Future;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::builder::RuntimeBuilder;
use crate::error::{Error, Result};
use crate::selector::Selector;
use crate::task::{Outcome, Task, TaskInput};

/// Creates a root [`Task`] from `computation` and drives it to completion: repeatedly asks it
/// for its current condition, blocks the selector on that condition, and resumes the task with
/// whatever was observed (or with the selector's own failure, if the wait itself was
/// interrupted), until the task terminates.
///
/// A task that is still waiting on cleanup code (a `finally`-style suspension reached while
/// unwinding) is driven to completion before this function returns — `spec.md` §4.4's closing
/// paragraph.
pub fn run<F, T>(computation: F) -> Result<T>
where
    F: Future<Output = Result<T>> + 'static,
{
    RuntimeBuilder::new().build().run(computation)
}

pub(crate) fn run_with_builder<F, T>(builder: &RuntimeBuilder, computation: F) -> Result<T>
where
    F: Future<Output = Result<T>> + 'static,
{
    let mut selector = Selector::new(builder.event_capacity())?;

    let root = Task::new(computation);
    debug!("root task spawned");

    loop {
        let condition = root.condition();
        let any_future_done = !condition.futures().is_empty()
            && condition
                .futures()
                .iter()
                .any(|id| crate::future::done_futures().contains(id));

        let input = match selector.select(&condition, any_future_done) {
            Ok(observation) => TaskInput::Observation(observation),
            Err(error) => {
                trace!(%error, "selector interrupted, injecting failure into root task");
                TaskInput::Failure(Rc::new(error))
            }
        };

        root.resume(input);

        if root.is_terminated() {
            return match root.take_outcome() {
                Outcome::Completed(value) => Ok(value),
                Outcome::Cancelled => Err(Error::Cancelled),
                Outcome::Failed(error) => {
                    debug!(%error, "root task failed");
                    Err((*error).clone())
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Observation;
    use crate::finally;
    use crate::primitives::sleep;
    use std::io;
    use std::time::Duration;

    /// `spec.md` §4.2/§4.4: a selector failure (e.g. an `EINTR`-style interrupt) is injected into
    /// the root task at its current suspension point, giving its cleanup code a chance to run
    /// before `run()` propagates the failure to its own caller. This drives that injection path
    /// directly against a task's `resume`, rather than through the real `mio`-backed `Selector`
    /// (which already retries genuine `EINTR` internally and so never surfaces it as a failure in
    /// practice) — see `DESIGN.md` for why S9 is exercised this way.
    #[test]
    fn injected_selector_failure_runs_cleanup_before_propagating() {
        let ran_cleanup = std::cell::Cell::new(false);

        let root = Task::new(finally(
            async {
                sleep(Duration::from_secs(5)).await?;
                Ok(())
            },
            async {
                ran_cleanup.set(true);
                Ok(())
            },
        ));

        // First resume: registers the 5-second sleep condition.
        root.resume(TaskInput::Observation(Observation::new()));
        assert!(!root.is_terminated());
        assert!(!ran_cleanup.get());

        // Simulate a selector-level interrupt: inject a failure instead of an observation, as
        // `run_with_builder` does when `Selector::select` itself returns `Err`. The body's sleep
        // fails immediately, and the cleanup block (no suspension points of its own) runs to
        // completion within the same resume — so the task terminates here, cleanup already run.
        let interrupt = Error::from(io::Error::other("simulated interrupt"));
        root.resume(TaskInput::Failure(Rc::new(interrupt)));
        assert!(root.is_terminated());
        assert!(ran_cleanup.get());

        match root.take_outcome() {
            Outcome::Failed(error) => assert!(error.to_string().contains("simulated interrupt")),
            Outcome::Completed(()) => panic!("expected the interrupt to propagate, task completed normally"),
            Outcome::Cancelled => panic!("expected the interrupt to propagate, task reported cancelled"),
        }
    }
}

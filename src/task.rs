// SPDX-License-Identifier: MIT

//! [`Task<T>`]: a driver around one suspendable computation.
//!
//! A `Task` owns an `async` frame, its last yielded [`Condition`], and a pending-cancellation
//! flag, and advances the frame exactly one step per [`Task::resume`] call, per `spec.md` §4.3's
//! priority order. This mirrors the shape of `oxidizer_rt::join::local_join::LocalJoinHandle`:
//! a cheaply `Clone`-able, `!Send`/`!Sync` handle around an `Rc<RefCell<_>>` so the same task can
//! be held by both its owner (to call `cancel()` or read its eventual result) and the scheduler
//! driving it (a [`crate::group::TaskGroup`] or the root driver in [`crate::runtime::run`]).

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::Poll;

use negative_impl::negative_impl;

use crate::channel::{Resume, drive};
use crate::condition::{Condition, Observation};
use crate::error::Error;

/// What a [`Task`] was resumed with. Unlike [`Resume`] (the leaf-suspension protocol), this
/// never carries a bare "first step" marker — whether a given resume is a task's first step is
/// something the `Task` itself decides from its own state (`spec.md` §4.3 cases 3 vs 4), not
/// something its caller declares.
pub(crate) enum TaskInput {
    Observation(Observation),
    Failure(Rc<Error>),
}

/// How a [`Task`]'s frame terminated.
pub(crate) enum Outcome<T> {
    /// The frame returned normally.
    Completed(T),
    /// `Error::Cancelled` propagated out of the frame uncaught; per `spec.md` §4.3 this is
    /// reported to nobody — the task simply has no result.
    Cancelled,
    /// Any other failure propagated out of the frame.
    Failed(Rc<Error>),
}

struct TaskInner<T> {
    frame: Pin<Box<dyn Future<Output = Result<T, Error>>>>,
    current_cond: Option<Condition>,
    cancel_pending: bool,
    outcome: Option<Outcome<T>>,
}

impl<T> TaskInner<T> {
    fn new(computation: impl Future<Output = Result<T, Error>> + 'static) -> Self {
        Self {
            frame: Box::pin(computation),
            current_cond: None,
            cancel_pending: false,
            outcome: None,
        }
    }

    /// The sentinel `deadline = -∞`-equivalent condition `spec.md` §3 requires when a task has
    /// not yet taken its first step: "runnable immediately", so the event loop never blocks
    /// before a fresh task's first resume.
    fn condition(&self) -> Condition {
        self.current_cond
            .clone()
            .unwrap_or_else(Condition::immediate)
    }

    fn is_terminated(&self) -> bool {
        self.outcome.is_some()
    }

    fn cancel(&mut self) {
        if self.outcome.is_some() {
            return;
        }
        self.cancel_pending = true;
        self.current_cond = None;
    }

    fn resume(&mut self, input: TaskInput) {
        if self.outcome.is_some() {
            return;
        }

        let resume = if self.cancel_pending {
            self.cancel_pending = false;
            Resume::Failure(Rc::new(Error::Cancelled))
        } else {
            match input {
                TaskInput::Failure(failure) => Resume::Failure(failure),
                TaskInput::Observation(observation) => match &self.current_cond {
                    None => Resume::Start,
                    Some(cond) => {
                        if cond.fulfilled(&observation, &crate::future::done_futures()) {
                            Resume::Observation(observation)
                        } else {
                            return;
                        }
                    }
                },
            }
        };

        let frame = self.frame.as_mut();
        let (poll, condition) = drive(resume, |cx| frame.poll(cx));

        match poll {
            Poll::Pending => {
                self.current_cond =
                    Some(condition.expect("a suspended frame always registers a condition"));
            }
            Poll::Ready(Ok(value)) => {
                self.current_cond = None;
                self.outcome = Some(Outcome::Completed(value));
            }
            Poll::Ready(Err(error)) => {
                self.current_cond = None;
                self.outcome = Some(if error.is_cancelled() {
                    Outcome::Cancelled
                } else {
                    Outcome::Failed(Rc::new(error))
                });
            }
        }
    }
}

/// A handle to a running or terminated computation.
///
/// Cloning a `Task` clones the handle, not the computation: every clone observes and drives the
/// same underlying frame.
pub struct Task<T> {
    inner: Rc<RefCell<TaskInner<T>>>,
}

impl<T> Task<T> {
    pub(crate) fn new(computation: impl Future<Output = Result<T, Error>> + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(TaskInner::new(computation))),
        }
    }

    /// Requests cooperative cancellation: the task will receive `Error::Cancelled` at its next
    /// resume. A no-op if the task has already terminated.
    pub fn cancel(&self) {
        self.inner.borrow_mut().cancel();
    }

    pub(crate) fn condition(&self) -> Condition {
        self.inner.borrow().condition()
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.inner.borrow().is_terminated()
    }

    pub(crate) fn resume(&self, input: TaskInput) {
        self.inner.borrow_mut().resume(input);
    }

    /// Reads this task's failure without consuming it, for a driving [`crate::group::TaskGroup`]
    /// to decide whether to cancel siblings. Returns `None` both when the task is still running
    /// and when it terminated normally or via cancellation.
    pub(crate) fn peek_failure(&self) -> Option<Rc<Error>> {
        match &self.inner.borrow().outcome {
            Some(Outcome::Failed(error)) => Some(error.clone()),
            _ => None,
        }
    }

    /// Consumes and returns this task's terminal outcome. Panics if the task has not terminated.
    pub(crate) fn take_outcome(&self) -> Outcome<T> {
        self.inner
            .borrow_mut()
            .outcome
            .take()
            .expect("take_outcome called before the task terminated")
    }
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for Task<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

#[negative_impl]
impl<T> !Send for Task<T> {}
#[negative_impl]
impl<T> !Sync for Task<T> {}

/// Object-safe view of a [`Task`] used by [`crate::group::TaskGroup`] to drive children whose
/// result types it does not need to know about (the group reads failures, not values — values
/// are recovered later by the caller through the typed [`Task<T>`] handle returned by
/// `add_task`).
pub(crate) trait Runnable {
    fn condition(&self) -> Condition;
    fn resume(&mut self, input: TaskInput);
    fn is_terminated(&self) -> bool;
    fn cancel(&mut self);
    fn peek_failure(&self) -> Option<Rc<Error>>;
}

impl<T> Runnable for Task<T> {
    fn condition(&self) -> Condition {
        Task::condition(self)
    }

    fn resume(&mut self, input: TaskInput) {
        Task::resume(self, input)
    }

    fn is_terminated(&self) -> bool {
        Task::is_terminated(self)
    }

    fn cancel(&mut self) {
        Task::cancel(self)
    }

    fn peek_failure(&self) -> Option<Rc<Error>> {
        Task::peek_failure(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{READ, WRITE};

    #[test]
    fn fresh_task_condition_is_immediate() {
        let task: Task<()> = Task::new(async { Ok(()) });
        let now = std::time::Instant::now();
        assert!(task.condition().fulfilled(&Observation::new(), &Default::default()));
        let _ = now;
    }

    #[test]
    fn resume_advances_to_completion() {
        let task = Task::new(async { Ok::<_, Error>(7) });
        task.resume(TaskInput::Observation(Observation::new()));
        assert!(task.is_terminated());
        match task.take_outcome() {
            Outcome::Completed(v) => assert_eq!(v, 7),
            _ => panic!("expected Completed"),
        }
    }

    #[test]
    fn cancel_delivers_cancelled_error_on_next_resume() {
        let task = Task::new(async {
            crate::sleep(std::time::Duration::from_secs(10)).await?;
            Ok::<_, Error>(())
        });
        // First step: registers the sleep condition.
        task.resume(TaskInput::Observation(Observation::new()));
        assert!(!task.is_terminated());

        task.cancel();
        task.resume(TaskInput::Observation(Observation::new()));
        assert!(task.is_terminated());
        match task.take_outcome() {
            Outcome::Cancelled => {}
            _ => panic!("expected Cancelled"),
        }
    }

    #[test]
    fn unfulfilled_condition_is_not_stepped() {
        let task = Task::new(async {
            crate::read(3, 16).await?;
            Ok::<_, Error>(())
        });
        task.resume(TaskInput::Observation(Observation::new()));
        assert!(!task.is_terminated());

        // Observation for an unrelated fd/mask should not step the frame.
        let mut obs = Observation::new();
        obs.insert(99, WRITE);
        task.resume(TaskInput::Observation(obs));
        assert!(!task.is_terminated());
        let _ = READ;
    }
}

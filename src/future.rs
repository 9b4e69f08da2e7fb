// SPDX-License-Identifier: MIT

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use negative_impl::negative_impl;

use crate::channel::{fail_on_failure, suspend_once};
use crate::condition::Condition;
use crate::error::{Error, Result};

/// Identifies a [`Future`] within a [`Condition`]'s `futures` set.
///
/// Futures are compared by identity, not by value, so a lightweight opaque id (rather than the
/// `Rc` pointer itself) is what travels through `Condition` — this keeps `Condition` free of any
/// type parameter tied to a specific `Future<T>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FutureId(u64);

impl FutureId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn next_for_test() -> Self {
        Self::next()
    }
}

/// The process-wide registry of which [`FutureId`]s are currently done.
///
/// `Condition::fulfilled` needs to know, for each future it references, whether that future has
/// completed — without holding a reference to the `Future<T>` itself (conditions are type-erased
/// over `T`). The registry is a thread-local set rather than a field on each `Condition` because
/// a `Future` may be named by many live `Condition`s (e.g. a `TaskGroup`'s combined condition)
/// simultaneously.
thread_local! {
    static DONE: RefCell<HashSet<FutureId>> = RefCell::new(HashSet::new());
}

pub(crate) fn done_futures() -> HashSet<FutureId> {
    DONE.with(|d| d.borrow().clone())
}

fn mark_done(id: FutureId) {
    DONE.with(|d| {
        d.borrow_mut().insert(id);
    });
}

fn unmark_done(id: FutureId) {
    DONE.with(|d| {
        d.borrow_mut().remove(&id);
    });
}

#[derive(Debug)]
enum Slot<T> {
    Empty,
    Value(T),
    Failed(Error),
    Taken,
}

struct Inner<T> {
    id: FutureId,
    slot: RefCell<Slot<T>>,
}

/// A single-assignment result cell that a task can wait on, per `spec.md`'s `Future<T>`.
///
/// Once `done` (a value or a failure has been set), the state never changes again. Waiting on a
/// done future with a failure re-raises that failure to the waiter; otherwise the value is
/// returned.
///
/// `set_result`/`set_exception` take `&self` rather than `&mut self`: the original `xiio` source
/// (`examples/original_source/xiio.py`) allows a future to be completed from plain callback code
/// that is not itself a running task (e.g. a signal handler), so cloned handles of this type must
/// all be able to complete the future without exclusive access.
pub struct Future<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Future<T> {
    /// Cloning a handle only bumps the `Rc` refcount; it never touches `T`, so this must not
    /// require `T: Clone` the way a derived `Clone` impl would — that bound would make it
    /// impossible to hand a second handle of `Future<SomeNonCloneResult>` to an external
    /// completer, defeating the whole point of `set_result`/`set_exception` taking `&self`.
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("id", &self.inner.id)
            .field("done", &self.is_done())
            .finish()
    }
}

impl<T> Future<T> {
    /// Creates a new, not-yet-done future.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                id: FutureId::next(),
                slot: RefCell::new(Slot::Empty),
            }),
        }
    }

    pub(crate) fn id(&self) -> FutureId {
        self.inner.id
    }

    /// Returns `true` once a result or failure has been set.
    #[must_use]
    pub fn is_done(&self) -> bool {
        !matches!(&*self.inner.slot.borrow(), Slot::Empty)
    }

    /// Completes the future with a value.
    ///
    /// # Panics
    ///
    /// Panics if the future is already done. This matches
    /// `oxidizer_rt::once_event::isolated::OnceEvent::set`'s "result already set" behavior;
    /// `spec.md` leaves double-set semantics implementation-defined.
    pub fn set_result(&self, value: T) {
        let mut slot = self.inner.slot.borrow_mut();
        match &*slot {
            Slot::Empty => {
                *slot = Slot::Value(value);
                drop(slot);
                mark_done(self.inner.id);
            }
            _ => panic!("result already set on this Future"),
        }
    }

    /// Completes the future with a failure.
    ///
    /// # Panics
    ///
    /// Panics if the future is already done (see [`Future::set_result`]).
    pub fn set_exception(&self, error: Error) {
        let mut slot = self.inner.slot.borrow_mut();
        match &*slot {
            Slot::Empty => {
                *slot = Slot::Failed(error);
                drop(slot);
                mark_done(self.inner.id);
            }
            _ => panic!("result already set on this Future"),
        }
    }

    /// Suspends the current task until this future is done, then returns its value or propagates
    /// its failure.
    pub async fn get(&self) -> Result<T> {
        let id = self.inner.id;
        if !self.is_done() {
            let condition = Condition::on_future(id);
            suspend_once(condition, |resume| fail_on_failure(&resume)).await?;
        }

        let mut slot = self.inner.slot.borrow_mut();
        match std::mem::replace(&mut *slot, Slot::Taken) {
            Slot::Value(v) => {
                drop(slot);
                unmark_done(id);
                Ok(v)
            }
            Slot::Failed(e) => {
                drop(slot);
                unmark_done(id);
                Err(e)
            }
            Slot::Taken => panic!("Future polled again after its result was already consumed"),
            Slot::Empty => unreachable!("suspend_once only returns once the future is done"),
        }
    }
}

impl<T> Default for Future<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[negative_impl]
impl<T> !Send for Future<T> {}
#[negative_impl]
impl<T> !Sync for Future<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::run;

    #[test]
    fn set_result_then_get_returns_value() {
        let result = run(async {
            let f = Future::new();
            f.set_result(42);
            f.get().await
        });
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn set_exception_then_get_propagates_failure() {
        let result = run(async {
            let f: Future<()> = Future::new();
            f.set_exception(Error::Timeout);
            f.get().await
        });
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[test]
    #[should_panic(expected = "result already set")]
    fn double_set_result_panics() {
        let f = Future::new();
        f.set_result(1);
        f.set_result(2);
    }

    #[test]
    fn cancelling_a_task_waiting_on_a_future_propagates_cancellation() {
        use crate::task::{Task, TaskInput};
        use std::collections::HashMap;

        let f: Future<()> = Future::new();
        let task = Task::new(async move { f.get().await });
        task.resume(TaskInput::Observation(HashMap::new()));
        assert!(!task.is_terminated());

        task.cancel();
        task.resume(TaskInput::Observation(HashMap::new()));
        assert!(task.is_terminated());
    }
}

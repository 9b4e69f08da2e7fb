// SPDX-License-Identifier: MIT

//! The task-local suspension channel.
//!
//! `std::future::Future::poll` has no room in its signature for "what condition am I waiting
//! on" or "what was observed since I last ran" — those are exactly what `spec.md`'s suspension
//! protocol needs to pass between a leaf primitive (`sleep`, `read`, `write`, `Future::get`, a
//! nested `TaskGroup` scope) and whichever driver is stepping it (`Task::resume`). This module
//! threads that data through a task-local side channel that is installed for the exact duration
//! of one `poll()` call and restored immediately after, mirroring the RAII-scoped thread-local
//! context `oxidizer_rt` uses for `CurrentExecutorContext`/`CurrentTaskContext`.
//!
//! Because the runtime is strictly single-threaded and non-preemptive, at most one frame is ever
//! mid-`poll()` at a time, so a single thread-local slot (saved and restored around each nested
//! use) is sufficient — no synchronization is needed.

use std::cell::RefCell;
use std::future::Future as StdFuture;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use crate::condition::{Condition, Observation};
use crate::error::{Error, Result};

/// What a frame is being resumed with, for one step.
#[derive(Clone)]
pub(crate) enum Resume {
    /// First step, or a step immediately following cancellation: no value delivered.
    Start,
    /// A readiness observation from the selector.
    Observation(Observation),
    /// An injected failure (cancellation, a propagated interrupt, or a cascading failure from an
    /// enclosing scope).
    Failure(Rc<Error>),
}

struct Slot {
    resume: Option<Resume>,
    condition: Option<Condition>,
}

thread_local! {
    static CHANNEL: RefCell<Option<Slot>> = const { RefCell::new(None) };
}

/// Installs `resume` as the channel's content, calls `poll_fn`, and returns its result together
/// with whatever condition a leaf suspension registered during the call (if any).
///
/// Used by [`crate::task::Task::resume`] to step a frame exactly once. Safe to call reentrantly
/// (a `TaskGroup` scope driving its own children from within a call already inside `drive`): the
/// previous channel contents are saved and restored around the nested call.
pub(crate) fn drive<T>(
    resume: Resume,
    poll_fn: impl FnOnce(&mut Context<'_>) -> Poll<T>,
) -> (Poll<T>, Option<Condition>) {
    let previous = CHANNEL.with(|c| c.borrow_mut().take());
    CHANNEL.with(|c| {
        *c.borrow_mut() = Some(Slot {
            resume: Some(resume),
            condition: None,
        });
    });

    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    let poll = poll_fn(&mut cx);

    let slot = CHANNEL
        .with(|c| c.borrow_mut().take())
        .expect("drive() installed the channel just above and nothing else clears it wholesale");
    CHANNEL.with(|c| *c.borrow_mut() = previous);

    (poll, slot.condition)
}

/// Takes the resume value delivered to the innermost `drive()` call currently in progress.
///
/// Called by a leaf suspension (or a `TaskGroup` scope acting as a frame) on each poll to learn
/// what it is being resumed with. Consumes the value: a second call within the same `drive()`
/// without an intervening resume returns `Resume::Start`, since nothing further was delivered.
pub(crate) fn take_resume() -> Resume {
    CHANNEL.with(|c| {
        let mut slot = c.borrow_mut();
        let slot = slot
            .as_mut()
            .expect("take_resume() called outside of a corio task driver");
        slot.resume.take().unwrap_or(Resume::Start)
    })
}

/// Registers the condition under which the innermost `drive()` call's frame should next be
/// resumed. Called by a leaf suspension just before returning `Poll::Pending`, or by a
/// `TaskGroup` scope after combining its children's conditions.
pub(crate) fn set_condition(condition: Condition) {
    CHANNEL.with(|c| {
        let mut slot = c.borrow_mut();
        let slot = slot
            .as_mut()
            .expect("set_condition() called outside of a corio task driver");
        slot.condition = Some(condition);
    });
}

/// Turns a delivered [`Resume`] into `Err` if it carried an injected failure (cancellation or an
/// interrupt/failure cascading from an enclosing scope), `Ok(())` otherwise.
///
/// Every leaf suspension in `spec.md` §4.1 (`sleep`, `read`, `write`, awaiting a [`crate::Future`])
/// must check this before doing anything else with the delivered value, or a cancellation
/// delivered while it is suspended would silently be treated as ordinary readiness.
pub(crate) fn fail_on_failure(resume: &Resume) -> Result<()> {
    match resume {
        Resume::Failure(error) => Err((**error).clone()),
        Resume::Start | Resume::Observation(_) => Ok(()),
    }
}

fn noop_waker() -> Waker {
    fn clone(_: *const ()) -> RawWaker {
        raw()
    }
    fn no_op(_: *const ()) {}
    fn raw() -> RawWaker {
        RawWaker::new(std::ptr::null(), &VTABLE)
    }
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
    // SAFETY: every function in `VTABLE` ignores the data pointer, so a null pointer is sound.
    unsafe { Waker::from_raw(raw()) }
}

enum OnceSuspendState<F> {
    Start(Option<Condition>, Option<F>),
    Suspended(F),
    Done,
}

/// A future that suspends at most once: on its first poll it registers `condition` and returns
/// `Pending`; on the following poll it consumes whatever the channel was resumed with, invokes
/// `resolve`, and returns `Ready`.
///
/// This is the building block every primitive in `spec.md` §4.1 is expressed in terms of
/// (`sleep`, `read`, `write`, awaiting a [`crate::Future`]) — each yields exactly one
/// `Condition` and resumes exactly once.
struct OnceSuspend<F> {
    state: OnceSuspendState<F>,
}

pub(crate) fn suspend_once<T, F>(condition: Condition, resolve: F) -> impl StdFuture<Output = T>
where
    F: FnOnce(Resume) -> T,
{
    OnceSuspend {
        state: OnceSuspendState::Start(Some(condition), Some(resolve)),
    }
}

impl<T, F> StdFuture for OnceSuspend<F>
where
    F: FnOnce(Resume) -> T,
{
    type Output = T;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<T> {
        // SAFETY: `OnceSuspendState<F>` holds no self-referential data; it is moved freely.
        let this = unsafe { self.get_unchecked_mut() };

        match std::mem::replace(&mut this.state, OnceSuspendState::Done) {
            OnceSuspendState::Start(condition, resolve) => {
                let condition = condition.expect("Start always carries a condition");
                let resolve = resolve.expect("Start always carries a resolver");
                set_condition(condition);
                this.state = OnceSuspendState::Suspended(resolve);
                Poll::Pending
            }
            OnceSuspendState::Suspended(resolve) => {
                let resume = take_resume();
                Poll::Ready(resolve(resume))
            }
            OnceSuspendState::Done => {
                panic!("corio suspension polled again after it already completed")
            }
        }
    }
}

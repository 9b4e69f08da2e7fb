// SPDX-License-Identifier: MIT

//! [`TaskGroup`]: the structured-concurrency core, per `spec.md` §4.5.
//!
//! `spec.md` §9 explicitly authorizes dropping the Python source's frame-splicing trick ("no
//! frame mutation is required") in favor of "a scheduler that accepts an explicit list of
//! runnables at a given scope". [`TaskGroup::scope`] realizes that: it returns a hand-written
//! [`Future`], [`Scope`], which on every poll dispatches one resume to the scope body and every
//! child added via [`TaskGroup::add_task`] through the same task-local channel a leaf suspension
//! uses ([`crate::channel`]), treating the body as simply one more entry in the same dispatch
//! loop the spec's Python `TaskGroup` run loop iterates over. No generator frame is ever
//! spliced.
//!
//! `TaskGroup<R>`'s state lives behind an `Rc<RefCell<_>>`, the same pattern [`crate::task::Task`]
//! uses: the scope body needs a handle it can call `add_task` on from inside its own `async`
//! block (which may itself be suspended mid-poll), while [`Scope`] simultaneously needs to drive
//! the very same children list — two independent owners of one mutable resource, exactly what
//! `Rc<RefCell<_>>` is for in a single-threaded runtime.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use negative_impl::negative_impl;

use crate::channel::{Resume, set_condition, take_resume};
use crate::condition::Condition;
use crate::error::{Error, Result};
use crate::task::{Outcome, Runnable, Task, TaskInput};

struct GroupState<R> {
    children: Vec<Box<dyn Runnable>>,
    visible: Vec<Task<R>>,
    pending_failure: Option<Rc<Error>>,
}

/// An ordered set of concurrently-running child tasks sharing one scope.
///
/// Constructed only via [`TaskGroup::scope`]; there is no public constructor, mirroring
/// `spec.md` §4.5's framing of a `TaskGroup` as inseparable from the scope it multiplexes.
pub struct TaskGroup<R> {
    state: Rc<RefCell<GroupState<R>>>,
}

impl<R> Clone for TaskGroup<R> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

#[negative_impl]
impl<R> !Send for TaskGroup<R> {}
#[negative_impl]
impl<R> !Sync for TaskGroup<R> {}

impl<R: 'static> TaskGroup<R> {
    fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(GroupState {
                children: Vec::new(),
                visible: Vec::new(),
                pending_failure: None,
            })),
        }
    }

    /// Attaches a child computation to the group. The child becomes runnable no later than the
    /// group's next suspension point (`spec.md` §4.5 G1).
    pub fn add_task(&self, computation: impl Future<Output = Result<R>> + 'static) -> Task<R> {
        let task = Task::new(computation);
        let mut state = self.state.borrow_mut();
        state.children.push(Box::new(task.clone()));
        state.visible.push(task.clone());
        task
    }

    /// The currently-running children, in the order they were added. Finished children are not
    /// included (`spec.md` §3 TaskGroup invariants).
    #[must_use]
    pub fn tasks(&self) -> Vec<Task<R>> {
        let mut state = self.state.borrow_mut();
        state.visible.retain(|t| !t.is_terminated());
        state.visible.clone()
    }

    /// Records `failure` as the group's pending failure if none is recorded yet, then cancels
    /// every child (`spec.md` §4.5 G3/G4/G5).
    pub fn cancel(&self, failure: Error) {
        let mut state = self.state.borrow_mut();
        if state.pending_failure.is_none() {
            state.pending_failure = Some(Rc::new(failure));
        }
        for child in &mut state.children {
            child.cancel();
        }
    }

    fn combined_condition(&self) -> Condition {
        let state = self.state.borrow();
        let conditions: Vec<Condition> = state.children.iter().map(|c| c.condition()).collect();
        Condition::combine(conditions.iter())
    }

    /// Delivers `input` to every child whose condition it fulfills (or to every child, if
    /// `input` itself is a failure), removing terminated children and cancelling the rest of the
    /// group on the first child failure seen — `spec.md` §4.5's per-pass run loop body.
    ///
    /// The children being dispatched to are detached from `self.state` for the duration of this
    /// pass (and only reattached at the end): resuming a child — in particular the scope's own
    /// body, which is just another child — runs arbitrary user code, and that code is the normal
    /// place for `TaskGroup::add_task`/`TaskGroup::tasks` to be called from (every `scope`/
    /// `timeout` body does this on its very first poll, before its first suspension). Both of
    /// those reacquire `self.state`'s `RefCell`, so holding our own borrow across the `resume`
    /// call below would panic with `BorrowMutError` the first time a body called `add_task`
    /// synchronously — which is the common case, not an edge case.
    fn dispatch(&self, input: TaskInput) {
        let mut children = std::mem::take(&mut self.state.borrow_mut().children);

        let mut i = 0;
        while i < children.len() {
            let next_input = match &input {
                TaskInput::Failure(f) => TaskInput::Failure(Rc::clone(f)),
                TaskInput::Observation(obs) => TaskInput::Observation(obs.clone()),
            };
            children[i].resume(next_input);

            if children[i].is_terminated() {
                let failure = children[i].peek_failure();
                children.remove(i);
                if let Some(f) = failure {
                    // Cancel every child we're still holding locally (already-visited-but-not-
                    // yet-terminated ones included; `Task::cancel` is a no-op once terminated),
                    // then `self.cancel` records the failure and cancels whatever has already
                    // been reattached to `self.state` by a reentrant `add_task` call above.
                    for child in &mut children {
                        child.cancel();
                    }
                    self.cancel((*f).clone());
                }
            } else {
                i += 1;
            }
        }

        let mut state = self.state.borrow_mut();
        // A reentrant `add_task` during this pass may have attached a new child after the
        // failure above was recorded; make sure it doesn't survive uncancelled.
        if state.pending_failure.is_some() {
            for child in &mut state.children {
                child.cancel();
            }
        }
        children.append(&mut state.children);
        state.children = children;
        state.visible.retain(|t| !t.is_terminated());
    }

    fn is_empty(&self) -> bool {
        self.state.borrow().children.is_empty()
    }

    fn take_pending_failure(&self) -> Option<Rc<Error>> {
        self.state.borrow_mut().pending_failure.take()
    }

    /// Runs `body` inside a fresh scope, then waits for every attached child to finish before
    /// returning, per `spec.md` §4.5's full run loop (G1–G5).
    pub async fn scope<F, Fut>(body: F) -> Result<R>
    where
        F: FnOnce(TaskGroup<R>) -> Fut,
        Fut: Future<Output = Result<R>> + 'static,
    {
        let group = TaskGroup::new();
        let body_future = body(group.clone());
        let body_task = Task::new(body_future);
        group.state.borrow_mut().children.push(Box::new(body_task.clone()));

        Scope { group, body_task }.await
    }
}

/// The hand-written future driving a [`TaskGroup::scope`] call to completion, one dispatch pass
/// per poll — matching every other frame in this crate's "one step per resume" contract.
struct Scope<R> {
    group: TaskGroup<R>,
    body_task: Task<R>,
}

impl<R: 'static> Future for Scope<R> {
    type Output = Result<R>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<R>> {
        // SAFETY: `Scope<R>` holds no self-referential data.
        let this = unsafe { self.get_unchecked_mut() };

        match take_resume() {
            Resume::Start => {}
            Resume::Observation(obs) => this.group.dispatch(TaskInput::Observation(obs)),
            Resume::Failure(f) => this.group.dispatch(TaskInput::Failure(f)),
        }

        if this.group.is_empty() {
            if let Some(failure) = this.group.take_pending_failure() {
                return Poll::Ready(Err((*failure).clone()));
            }
            return Poll::Ready(match this.body_task.take_outcome() {
                Outcome::Completed(value) => Ok(value),
                Outcome::Cancelled => Err(Error::Cancelled),
                Outcome::Failed(error) => Err((*error).clone()),
            });
        }

        set_condition(this.group.combined_condition());
        Poll::Pending
    }
}

/// The hand-written future driving [`gather`]: like [`Scope`] but with no body frame of its own
/// — every child is an element of the input list, and the result is their values in order.
struct Gather<R> {
    group: TaskGroup<R>,
    handles: Vec<Task<R>>,
}

impl<R: 'static> Future for Gather<R> {
    type Output = Result<Vec<R>>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<Vec<R>>> {
        // SAFETY: `Gather<R>` holds no self-referential data.
        let this = unsafe { self.get_unchecked_mut() };

        match take_resume() {
            Resume::Start => {}
            Resume::Observation(obs) => this.group.dispatch(TaskInput::Observation(obs)),
            Resume::Failure(f) => this.group.dispatch(TaskInput::Failure(f)),
        }

        if this.group.is_empty() {
            if let Some(failure) = this.group.take_pending_failure() {
                return Poll::Ready(Err((*failure).clone()));
            }
            let mut results = Vec::with_capacity(this.handles.len());
            for handle in &this.handles {
                match handle.take_outcome() {
                    Outcome::Completed(value) => results.push(value),
                    Outcome::Cancelled => {}
                    Outcome::Failed(error) => return Poll::Ready(Err((*error).clone())),
                }
            }
            return Poll::Ready(Ok(results));
        }

        set_condition(this.group.combined_condition());
        Poll::Pending
    }
}

/// `gather(computations) -> Result<Vec<R>>`: runs every computation concurrently and returns
/// their results in input order, per `spec.md` §4.6. Failure semantics are exactly
/// [`TaskGroup`]'s: the first child failure cancels every sibling and is the result's error.
pub async fn gather<R>(computations: Vec<impl Future<Output = Result<R>> + 'static>) -> Result<Vec<R>>
where
    R: 'static,
{
    let group = TaskGroup::new();
    let handles: Vec<Task<R>> = computations.into_iter().map(|c| group.add_task(c)).collect();
    Gather { group, handles }.await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::run;
    use crate::sleep;
    use std::time::{Duration, Instant};

    #[test]
    fn gather_runs_children_concurrently() {
        let start = Instant::now();
        let result = run(async {
            gather(vec![
                Box::pin(async {
                    sleep(Duration::from_millis(80)).await?;
                    Ok::<_, Error>(1)
                }) as Pin<Box<dyn Future<Output = Result<i32>>>>,
                Box::pin(async {
                    sleep(Duration::from_millis(20)).await?;
                    Ok::<_, Error>(2)
                }),
            ])
            .await
        })
        .unwrap();

        assert_eq!(result, vec![1, 2]);
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[test]
    fn gather_cancels_siblings_on_first_failure() {
        let start = Instant::now();
        let result: Result<Vec<i32>> = run(async {
            gather(vec![
                Box::pin(async {
                    sleep(Duration::from_millis(200)).await?;
                    Ok::<_, Error>(1)
                }) as Pin<Box<dyn Future<Output = Result<i32>>>>,
                Box::pin(async {
                    sleep(Duration::from_millis(20)).await?;
                    Err(Error::failed(std::io::Error::other("boom")))
                }),
            ])
            .await
        });

        assert!(result.is_err());
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[test]
    fn scope_reports_body_failure_and_empties_task_list() {
        let result: Result<()> = run(async {
            TaskGroup::scope(|group: TaskGroup<()>| async move {
                let child = group.add_task(async {
                    sleep(Duration::from_millis(50)).await?;
                    Ok(())
                });
                assert!(group.tasks().contains(&child));
                Err(Error::failed(std::io::Error::other("scope body failed")))
            })
            .await
        });
        assert!(result.is_err());
    }
}

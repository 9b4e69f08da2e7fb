// SPDX-License-Identifier: MIT

use std::collections::{HashMap, HashSet};
use std::ops::{BitOr, BitOrAssign};
use std::os::fd::RawFd;
use std::time::Instant;

use crate::future::FutureId;

/// Bitset of readiness events a task may be waiting for on a single file descriptor.
///
/// Mirrors `spec.md`'s `READ`/`WRITE` constants. Values are bit flags so a descriptor can be
/// awaited for both readability and writability at once (`READ | WRITE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest(u8);

/// Interested in the descriptor becoming readable.
pub const READ: Interest = Interest(0b01);
/// Interested in the descriptor becoming writable.
pub const WRITE: Interest = Interest(0b10);

impl Interest {
    /// Returns `true` if `self` contains every bit set in `mask`.
    #[must_use]
    pub const fn contains(self, mask: Self) -> bool {
        self.0 & mask.0 == mask.0
    }

    /// Returns `true` if this interest set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub(crate) const fn is_readable(self) -> bool {
        self.0 & READ.0 != 0
    }

    pub(crate) const fn is_writable(self) -> bool {
        self.0 & WRITE.0 != 0
    }
}

impl BitOr for Interest {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A mapping from file descriptor to the readiness events observed for it during one pass of
/// the [selector][crate::run]. Delivered to [`Task::resume`][crate::Task] alongside (or instead
/// of) a failure.
pub type Observation = HashMap<RawFd, Interest>;

/// Describes the union of events that would make a suspended task runnable again: a set of
/// `(file descriptor, event mask)` pairs, a set of [`Future`][crate::Future] handles, and a
/// monotonic deadline.
///
/// Values are transient — a [`Task`][crate::Task] holds at most one current `Condition`, and
/// combined conditions (via [`Condition::combine`]) are reconstructed on every scheduler pass
/// rather than maintained incrementally, since the set of waiters is typically small.
#[derive(Debug, Clone, Default)]
pub struct Condition {
    files: HashMap<RawFd, Interest>,
    futures: HashSet<FutureId>,
    deadline: Option<Instant>,
}

impl Condition {
    /// A condition that is already fulfilled, regardless of observation. Used by [`Task`] as the
    /// sentinel "runnable immediately" condition before a frame's first step.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            files: HashMap::new(),
            futures: HashSet::new(),
            deadline: Some(Instant::now()),
        }
    }

    /// A condition fulfilled once `deadline` has passed.
    #[must_use]
    pub fn at_deadline(deadline: Instant) -> Self {
        Self {
            files: HashMap::new(),
            futures: HashSet::new(),
            deadline: Some(deadline),
        }
    }

    /// A condition fulfilled once `fd` is ready for the events in `mask`.
    #[must_use]
    pub fn on_fd(fd: RawFd, mask: Interest) -> Self {
        let mut files = HashMap::with_capacity(1);
        files.insert(fd, mask);
        Self {
            files,
            futures: HashSet::new(),
            deadline: None,
        }
    }

    /// A condition fulfilled once the future identified by `id` is done.
    #[must_use]
    pub fn on_future(id: FutureId) -> Self {
        let mut futures = HashSet::with_capacity(1);
        futures.insert(id);
        Self {
            files: HashMap::new(),
            futures,
            deadline: None,
        }
    }

    pub(crate) fn files(&self) -> &HashMap<RawFd, Interest> {
        &self.files
    }

    pub(crate) fn futures(&self) -> &HashSet<FutureId> {
        &self.futures
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Combines a list of conditions into one: the per-fd bitwise-OR of their file masks, the
    /// union of their future sets, and the minimum of their deadlines.
    ///
    /// `Condition::default()` (empty files, empty futures, deadline `None`) is the neutral
    /// element: combining it with any `C` yields `C` unchanged.
    #[must_use]
    pub fn combine<'a>(conditions: impl IntoIterator<Item = &'a Self>) -> Self {
        let mut files: HashMap<RawFd, Interest> = HashMap::new();
        let mut futures: HashSet<FutureId> = HashSet::new();
        let mut deadline: Option<Instant> = None;

        for cond in conditions {
            for (&fd, &mask) in &cond.files {
                *files.entry(fd).or_insert_with(Interest::default) |= mask;
            }
            futures.extend(cond.futures.iter().copied());
            deadline = match (deadline, cond.deadline) {
                (None, other) => other,
                (current, None) => current,
                (Some(a), Some(b)) => Some(a.min(b)),
            };
        }

        Self {
            files,
            futures,
            deadline,
        }
    }

    /// Returns `true` if this condition is fulfilled by `observation`, given that any future in
    /// `done_futures` has already completed.
    ///
    /// A condition is fulfilled iff: `now >= deadline`, or some future in `self.futures` is
    /// done, or for some `(fd, mask)` in `self.files`, `observation[fd]` contains every bit of
    /// `mask`.
    #[must_use]
    pub fn fulfilled(&self, observation: &Observation, done_futures: &HashSet<FutureId>) -> bool {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return true;
            }
        }

        if self.futures.iter().any(|id| done_futures.contains(id)) {
            return true;
        }

        self.files
            .iter()
            .any(|(fd, &mask)| observation.get(fd).is_some_and(|&ready| ready.contains(mask)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_is_neutral_for_default() {
        let c = Condition::on_fd(3, READ);
        let combined = Condition::combine([&c, &Condition::default()]);
        assert_eq!(combined.files().get(&3), Some(&READ));
        assert!(combined.futures().is_empty());
        assert!(combined.deadline().is_none());
    }

    #[test]
    fn combine_ors_file_masks_and_unions_futures() {
        let a = Condition::on_fd(1, READ);
        let b = Condition::on_fd(1, WRITE);
        let c = Condition::combine([&a, &b]);
        assert!(c.files()[&1].contains(READ));
        assert!(c.files()[&1].contains(WRITE));
    }

    #[test]
    fn combine_takes_min_deadline() {
        let now = Instant::now();
        let a = Condition::at_deadline(now + std::time::Duration::from_secs(5));
        let b = Condition::at_deadline(now + std::time::Duration::from_secs(1));
        let c = Condition::combine([&a, &b]);
        assert_eq!(c.deadline(), b.deadline());
    }

    #[test]
    fn due_deadline_is_fulfilled_regardless_of_observation() {
        let c = Condition::at_deadline(Instant::now() - std::time::Duration::from_millis(1));
        assert!(c.fulfilled(&Observation::new(), &HashSet::new()));
    }

    #[test]
    fn done_future_fulfills_any_condition_containing_it() {
        let id = FutureId::next_for_test();
        let c = Condition::on_future(id);
        let mut done = HashSet::new();
        done.insert(id);
        assert!(c.fulfilled(&Observation::new(), &done));
    }

    #[test]
    fn unfulfilled_file_condition_stays_unfulfilled() {
        let c = Condition::on_fd(4, READ);
        let mut obs = Observation::new();
        obs.insert(4, WRITE);
        assert!(!c.fulfilled(&obs, &HashSet::new()));
        obs.insert(4, READ);
        assert!(c.fulfilled(&obs, &HashSet::new()));
    }
}

// SPDX-License-Identifier: MIT

//! The readiness selector, per `spec.md` §4.2.
//!
//! Wraps a single [`mio::Poll`]: given a [`Condition`], registers every `(fd, mask)` pair for
//! the duration of one wait and returns an [`Observation`] limited to the fds that actually
//! became ready. Registrations are not held across calls — a suspended task's set of awaited
//! fds/masks can change from one wait to the next (a different child may be added to a
//! [`crate::group::TaskGroup`] between passes), and `mio`'s registration is comparatively
//! expensive versus the selector's typical working set (a handful of fds), so a fresh
//! register/poll/deregister cycle per call is simpler to reason about than tracking which
//! registrations are stale. See `DESIGN.md` for the persistent-registration tradeoff this
//! implies.

use std::io;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

use mio::unix::SourceFd;
use mio::{Events, Interest as MioInterest, Poll, Token};
use tracing::trace;

use crate::condition::{Condition, Interest, Observation, READ, WRITE};
use crate::error::Result;

/// Thin wrapper over a host readiness mechanism. One instance is owned by the event loop for
/// its entire lifetime (`spec.md` §4.2: "Global state... run() creates its own scheduler
/// instance").
pub(crate) struct Selector {
    poll: Poll,
    events: Events,
}

impl Selector {
    pub(crate) fn new(event_capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(event_capacity),
        })
    }

    /// Blocks up to `condition`'s deadline (zero if any of its futures is already done, `None`
    /// if `condition` has no deadline) and returns the subset of `condition.files()` observed
    /// ready.
    pub(crate) fn select(&mut self, condition: &Condition, any_future_done: bool) -> Result<Observation> {
        let timeout = self.timeout_for(condition, any_future_done);

        // `Token`s are assigned positionally for this one call only; registrations never
        // persist across calls, so there is no risk of collision with a prior pass's tokens.
        let fds: Vec<RawFd> = condition.files().keys().copied().collect();

        for (token, &fd) in fds.iter().enumerate() {
            let interest = condition.files()[&fd];
            self.poll
                .registry()
                .register(&mut SourceFd(&fd), Token(token), to_mio_interest(interest))?;
        }

        let wait_result = self.poll.poll(&mut self.events, timeout);

        // Deregister unconditionally, even on failure, so the next call starts from a clean
        // registry.
        for &fd in &fds {
            let _ = self.poll.registry().deregister(&mut SourceFd(&fd));
        }

        wait_result?;

        let mut observation = Observation::new();
        for event in &self.events {
            let Some(&fd) = fds.get(event.token().0) else {
                continue;
            };
            let mut ready = Interest::default();
            if event.is_readable() {
                ready |= READ;
            }
            if event.is_writable() {
                ready |= WRITE;
            }
            observation.insert(fd, ready);
        }

        trace!(ready = observation.len(), "selector woken");
        Ok(observation)
    }

    /// `None` means block indefinitely — correct whenever the condition has no deadline, since
    /// waiting on bare fd readiness or a future with no timer attached should never time out on
    /// its own (`spec.md` §4.2: "None/infinite if timeout is +∞").
    fn timeout_for(&self, condition: &Condition, any_future_done: bool) -> Option<Duration> {
        if any_future_done {
            return Some(Duration::ZERO);
        }
        condition
            .deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

fn to_mio_interest(interest: Interest) -> MioInterest {
    match (interest.is_readable(), interest.is_writable()) {
        (true, true) => MioInterest::READABLE.add(MioInterest::WRITABLE),
        (true, false) => MioInterest::READABLE,
        (false, true) => MioInterest::WRITABLE,
        (false, false) => MioInterest::READABLE,
    }
}

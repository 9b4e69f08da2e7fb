// SPDX-License-Identifier: MIT

//! [`RuntimeBuilder`]: the small configuration surface this runtime carries, grounded on
//! `oxidizer_rt::builder::RuntimeBuilder`'s builder pattern.
//!
//! Unlike `oxidizer_rt`'s builder — which configures processor quotas, a clock, and worker
//! thread pools for a multi-threaded runtime — this one has very little to configure: a single
//! thread runs a single selector. The only knob worth exposing is the selector's event buffer
//! capacity, since that bounds how many simultaneously-ready fds one `select` call can surface
//! before a second call is needed.

use std::future::Future;

use crate::error::Result;
use crate::runtime::run_with_builder;

const DEFAULT_EVENT_CAPACITY: usize = 128;

/// Configures and builds a [`Runtime`].
#[derive(Debug, Clone)]
pub struct RuntimeBuilder {
    event_capacity: usize,
}

impl RuntimeBuilder {
    /// Starts building a runtime with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Sets how many readiness events the selector can collect in a single `select` call. Most
    /// programs never need to change this; it only matters when hundreds of fds can become
    /// ready simultaneously.
    #[must_use]
    pub const fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Finishes configuration and returns a runnable [`Runtime`].
    #[must_use]
    pub fn build(self) -> Runtime {
        Runtime { builder: self }
    }

    pub(crate) fn event_capacity(&self) -> usize {
        self.event_capacity
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A configured, ready-to-run instance of the event loop.
///
/// Unlike `oxidizer_rt::Runtime`, which stays alive across many `spawn`/`block_on` calls on a
/// background thread pool, a `corio::Runtime` exists only to drive a single top-level
/// computation to completion on the calling thread — matching `spec.md` §4.4's "run() creates
/// its own scheduler instance", used once per call.
#[derive(Debug, Clone)]
pub struct Runtime {
    builder: RuntimeBuilder,
}

impl Runtime {
    /// Drives `computation` to completion, per `spec.md` §4.4.
    pub fn run<F, T>(&self, computation: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + 'static,
    {
        run_with_builder(&self.builder, computation)
    }
}

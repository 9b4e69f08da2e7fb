// SPDX-License-Identifier: MIT

//! `corio`: a minimal single-threaded cooperative I/O runtime.
//!
//! A computation is an ordinary `async fn`/`async {}` block. Awaiting one of this crate's
//! suspension points ([`sleep`], [`read`], [`write`], [`Future::get`]) yields control back to
//! [`run`], which blocks on a [`condition::Condition`] describing exactly what would make the
//! computation runnable again, then resumes it once that condition holds. [`TaskGroup`] and its
//! [`gather`]/[`timeout`] combinators give structured concurrency: every child a scope attaches
//! is guaranteed to be cancelled before the scope itself returns or propagates a failure.
//!
//! Everything here is confined to the thread that calls [`run`]; there is no work stealing, no
//! cross-thread handoff, and no fairness guarantee beyond FIFO dispatch order among a group's
//! children.

mod builder;
mod channel;
mod condition;
mod error;
mod finally;
mod future;
mod group;
mod primitives;
mod runtime;
mod task;
mod timeout;

pub mod testing;

pub use builder::{Runtime, RuntimeBuilder};
pub use condition::{Condition, Interest, Observation, READ, WRITE};
pub use error::{Error, Result};
pub use finally::finally;
pub use future::Future;
pub use group::{gather, TaskGroup};
pub use primitives::{read, sleep, write};
pub use runtime::run;
pub use task::Task;
pub use timeout::timeout;

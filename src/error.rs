// SPDX-License-Identifier: MIT

use std::rc::Rc;

use thiserror::Error;

/// A specialized `Result` type for corio operations that return a corio [`Error`][enum@Error]
/// on failure.
pub type Result<T> = std::result::Result<T, Error>;

/// An error surfaced by the runtime, a suspension primitive, or user code running under it.
///
/// This is an umbrella type covering both internal scheduling sentinels (cancellation, scope
/// timeout) and errors re-packaged from the environment (I/O failures) or from user code.
/// Future versions may add additional variants.
///
/// `Error` is cheaply `Clone` (the I/O and user-failure variants hold an `Rc`, not an owned
/// value) because a single failure injected at one suspension point may need to be delivered to
/// several sibling tasks at once — see `TaskGroup`'s broadcast of an injected failure to every
/// child in `spec.md` §4.5's run loop. `Rc` (not `Arc`) because this runtime, and everything it
/// touches, is confined to a single thread.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// Cooperative cancellation signal, injected into a task's frame at its next suspension
    /// point after [`Task::cancel`][crate::Task::cancel] is called.
    ///
    /// User cleanup code may observe this variant (for example, via `?` inside a `finally`-style
    /// guard) but it must never escape [`run`][crate::run] — a task that lets it propagate out of
    /// its frame is terminated silently by the driver, per the runtime's cancellation contract.
    #[error("task was cancelled")]
    Cancelled,

    /// A [`timeout`][crate::timeout] scope elapsed with the body still running.
    #[error("operation timed out")]
    Timeout,

    /// We are re-packaging an error from the readiness selector or a read/write syscall without
    /// adding further detail at this layer.
    #[error("I/O error: {0}")]
    Io(Rc<std::io::Error>),

    /// We are re-packaging an error raised by user code running under the runtime, without
    /// adding further detail at this layer.
    #[error("{0}")]
    Failed(Rc<dyn std::error::Error>),
}

impl Error {
    /// Wraps an arbitrary user error as [`Error::Failed`].
    #[must_use]
    pub fn failed(source: impl std::error::Error + 'static) -> Self {
        Self::Failed(Rc::new(source))
    }

    /// Returns `true` if this is the internal cancellation sentinel.
    ///
    /// Exposed so `finally`-style cleanup combinators (see [`crate::finally`]) can decide whether
    /// a failure they observed was a cancellation (which they must let continue propagating) or
    /// an ordinary failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io(Rc::new(source))
    }
}

// SPDX-License-Identifier: MIT

//! [`finally`]: a cleanup combinator, since Rust's `?` has no `try`/`finally` block to fall back
//! on inside an `async fn`.
//!
//! `spec.md` §8's S4/S5/S9 scenarios all rely on a child task's cleanup code running to
//! completion regardless of how its main body ended, including after cancellation (which this
//! crate delivers as an ordinary [`crate::Error::Cancelled`] propagated through `?`, not a Rust
//! panic or unwind). `finally` gives user code a direct way to express that shape without hand
//! rolling a `match` on every suspension point.

use std::future::Future;

use crate::error::Result;

/// Runs `body`, then always runs `cleanup`, returning `body`'s result.
///
/// If `body` fails and `cleanup` also fails, `cleanup`'s failure is dropped and `body`'s own
/// failure is returned (`spec.md` §4.5 G5 / §7: "only secondary failures during cancellation
/// unwinding are dropped"). If `body` succeeds, `cleanup`'s own failure (if any) is returned.
pub async fn finally<Fut, CleanupFut, R>(body: Fut, cleanup: CleanupFut) -> Result<R>
where
    Fut: Future<Output = Result<R>>,
    CleanupFut: Future<Output = Result<()>>,
{
    let body_result = body.await;
    let cleanup_result = cleanup.await;

    match body_result {
        Ok(value) => cleanup_result.map(|()| value),
        Err(body_error) => Err(body_error),
    }
}

// SPDX-License-Identifier: MIT

//! [`timeout`]: a scoped deadline atop [`crate::group::TaskGroup`], per `spec.md` §4.7.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::group::TaskGroup;
use crate::primitives::sleep;

/// Runs `body` with a deadline: if `duration` elapses before `body` completes, `body` (and any
/// children it may have attached) is cancelled and `Error::Timeout` is returned. If `body`
/// completes first, the timer is cancelled and `body`'s own result (or failure) is returned.
pub async fn timeout<F, R>(duration: Duration, body: F) -> Result<R>
where
    F: Future<Output = Result<R>> + 'static,
    R: 'static,
{
    TaskGroup::scope(move |group| async move {
        let timer = group.add_task(async move {
            sleep(duration).await?;
            Err::<R, Error>(Error::Timeout)
        });

        let result = body.await;
        timer.cancel();
        result
    })
    .await
}

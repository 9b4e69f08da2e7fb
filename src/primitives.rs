// SPDX-License-Identifier: MIT

//! The built-in suspensions: `sleep`, `read`, `write`, per `spec.md` §4.1.
//!
//! Each is expressed as a single call to [`crate::channel::suspend_once`]: register a
//! [`Condition`] on first poll, then compute a result (or propagate an injected failure) on the
//! next. None of them loop internally — per `spec.md` §9's open question, a read or write is
//! attempted exactly once after its fd becomes ready, and a short transfer is returned as-is.

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use crate::channel::{fail_on_failure, suspend_once};
use crate::condition::{Condition, READ, WRITE};
use crate::error::{Error, Result};

/// Suspends the current task until `duration` has elapsed.
pub async fn sleep(duration: Duration) -> Result<()> {
    let condition = Condition::at_deadline(Instant::now() + duration);
    suspend_once(condition, |resume| fail_on_failure(&resume)).await
}

/// Suspends until `fd` is readable, then performs one non-blocking read of up to `max_len`
/// bytes. A short read (including EOF, returned as an empty `Vec`) is returned as-is.
pub async fn read(fd: impl AsRawFd, max_len: usize) -> Result<Vec<u8>> {
    let raw = fd.as_raw_fd();
    let condition = Condition::on_fd(raw, READ);
    suspend_once(condition, move |resume| {
        fail_on_failure(&resume)?;
        read_once(raw, max_len)
    })
    .await
}

/// Suspends until `fd` is writable, then performs one non-blocking write of `data`, returning
/// the number of bytes actually written (which may be less than `data.len()`).
pub async fn write(fd: impl AsRawFd, data: &[u8]) -> Result<usize> {
    let raw = fd.as_raw_fd();
    let condition = Condition::on_fd(raw, WRITE);
    suspend_once(condition, move |resume| {
        fail_on_failure(&resume)?;
        write_once(raw, data)
    })
    .await
}

fn read_once(fd: RawFd, max_len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; max_len];
    loop {
        // SAFETY: `fd` is owned by the caller of `read()` and stays valid for the duration of
        // this syscall; `buf` is a uniquely-owned, appropriately-sized buffer.
        let n = unsafe { libc_read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n >= 0 {
            buf.truncate(n as usize);
            return Ok(buf);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return Err(Error::from(err));
    }
}

fn write_once(fd: RawFd, data: &[u8]) -> Result<usize> {
    loop {
        // SAFETY: `fd` is owned by the caller of `write()`; `data` is a valid, immutably-borrowed
        // slice for the duration of this syscall.
        let n = unsafe { libc_write(fd, data.as_ptr().cast(), data.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return Err(Error::from(err));
    }
}

unsafe fn libc_read(fd: RawFd, buf: *mut core::ffi::c_void, count: usize) -> isize {
    unsafe { libc::read(fd, buf, count) }
}

unsafe fn libc_write(fd: RawFd, buf: *const core::ffi::c_void, count: usize) -> isize {
    unsafe { libc::write(fd, buf, count) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::run;
    use std::time::Instant;

    #[test]
    fn sleep_waits_roughly_the_requested_duration() {
        let start = Instant::now();
        run(async {
            sleep(Duration::from_millis(50)).await?;
            Ok::<_, Error>(())
        })
        .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn pipe_read_and_write_roundtrip() {
        let mut fds = [0i32; 2];
        // SAFETY: `fds` is a valid, appropriately-sized output array for `pipe(2)`.
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        let (r, w) = (fds[0], fds[1]);

        let result = run(async move {
            write(w, b"Hello World").await?;
            let bytes = read(r, 32).await?;
            Ok::<_, Error>(bytes)
        })
        .unwrap();

        assert_eq!(result, b"Hello World");
        // SAFETY: both descriptors were returned by the `pipe(2)` call above and are not used
        // again after this point.
        unsafe {
            libc::close(r);
            libc::close(w);
        }
    }
}

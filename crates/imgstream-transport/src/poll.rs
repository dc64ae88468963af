//! Bounded, interruptible readiness polling.
//!
//! Every blocking point of a session is a loop of "check, then sleep one
//! poll interval" bounded by the session wait timeout. The sleep happens on a
//! condition variable owned by a [`CloseHandle`], so closing the session from
//! another thread wakes the loop immediately instead of after the interval.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{Result, TransportError};

/// Cloneable handle that closes a session from any thread.
#[derive(Debug, Clone, Default)]
pub struct CloseHandle {
    inner: Arc<CloseState>,
}

#[derive(Debug, Default)]
struct CloseState {
    closed: Mutex<bool>,
    wakeup: Condvar,
}

impl CloseHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request close and wake every poll loop waiting on this handle.
    pub fn close(&self) {
        let mut closed = self
            .inner
            .closed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *closed = true;
        self.inner.wakeup.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        *self
            .inner
            .closed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `interval` unless closed first. Returns `true` if closed.
    fn sleep(&self, interval: Duration) -> bool {
        let closed = self
            .inner
            .closed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (closed, _) = self
            .inner
            .wakeup
            .wait_timeout_while(closed, interval, |closed| !*closed)
            .unwrap_or_else(PoisonError::into_inner);
        *closed
    }
}

/// Polls a readiness check at a fixed interval up to a fixed bound.
#[derive(Debug, Clone)]
pub struct Poller {
    interval: Duration,
    timeout: Duration,
    close: CloseHandle,
}

impl Poller {
    pub fn new(interval: Duration, timeout: Duration, close: CloseHandle) -> Self {
        Self {
            interval,
            timeout,
            close,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `attempt` until it yields a value, the bound expires, or the
    /// session is closed.
    ///
    /// Returns `Ok(None)` when the bound expires. A close request is
    /// reported as [`TransportError::Closed`].
    pub fn poll<T>(&self, mut attempt: impl FnMut() -> Result<Option<T>>) -> Result<Option<T>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if self.close.is_closed() {
                return Err(TransportError::Closed);
            }
            if let Some(value) = attempt()? {
                return Ok(Some(value));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            if self.close.sleep(self.interval.min(deadline - now)) {
                return Err(TransportError::Closed);
            }
        }
    }
}

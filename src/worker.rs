//! Dedicated background threads with cooperative cancellation.
//!
//! A [`Worker`] owns one OS thread and its own [`CancelToken`]. Shutdown sets
//! the token, then waits a bounded grace period for the thread to report that
//! it exited. Rust cannot safely kill a thread, so a worker that overruns the
//! grace period is detached instead: its token stays set and it exits at its
//! next check, but the caller is told the stop was not clean.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::error::Result;

/// Cancellation flag shared between a controller and one worker.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relaxed load; cheap enough for the hot loop.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Relaxed)
    }

    /// Sets the flag and wakes any [`wait_timeout`](Self::wait_timeout) caller.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Relaxed);
        drop(self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner));
        self.inner.wake.notify_all();
    }

    /// Sleeps for `timeout` unless cancelled first. Returns `true` if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = self
                .inner
                .wake
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// How a worker ended when asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Exited within the grace period.
    Clean,
    /// Exited within the grace period, but by panicking.
    Panicked,
    /// Still running after the grace period and left detached.
    TimedOut,
}

// Signals the owner on drop, so a panicking body still reports.
struct ExitSignal(Sender<()>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

pub struct Worker {
    name: String,
    token: CancelToken,
    exited: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let token = CancelToken::new();
        let (exit_tx, exited) = mpsc::channel();

        let body_token = token.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _signal = ExitSignal(exit_tx);
                body(body_token);
            })?;
        debug!(worker = name, "spawned");

        Ok(Self {
            name: name.to_string(),
            token,
            exited,
            handle: Some(handle),
        })
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Cancels, then waits up to `grace` for the thread to exit.
    pub fn shutdown(mut self, grace: Duration) -> WorkerExit {
        self.token.cancel();
        let handle = self.handle.take();

        match self.exited.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let joined = handle.map_or(Ok(()), JoinHandle::join);
                if joined.is_err() {
                    error!(worker = %self.name, "worker panicked");
                    WorkerExit::Panicked
                } else {
                    debug!(worker = %self.name, "worker exited");
                    WorkerExit::Clean
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    worker = %self.name,
                    grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                    "worker did not exit within grace period; detaching it"
                );
                WorkerExit::TimedOut
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Dropped without shutdown(): never block, just make sure it winds down.
        if self.handle.is_some() {
            self.token.cancel();
        }
    }
}

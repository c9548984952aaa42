//! Synchronization boundary between the scheduling strategies and the
//! [`InjectionPort`].
//!
//! Two paths reach the port:
//!
//! - [`DirectPath`] calls straight through with no locking. Scheduling
//!   strategies own a dedicated thread each and never issue two clicks at
//!   once, so they need no further serialization.
//! - [`ClickDispatcher::dispatch_explicit`] queues one request for a long-lived
//!   worker thread under a mutex and waits on a condition variable for the
//!   result. It suits rare, latency-tolerant calls such as test clicks.
//!
//! Neither path buffers or drops: every accepted request produces exactly one
//! port call or one reported failure.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace};

use crate::error::{ClickerError, InjectionError, Result};
use crate::injection::InjectionPort;
use crate::types::{ClickKind, Point};

/// Resolved location for the next click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTarget {
    /// Wherever the pointer is at dispatch time.
    Pointer,
    At(Point),
}

/// One click to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickRequest {
    pub kind: ClickKind,
    pub target: ClickTarget,
}

/// Click kind and target written by the controller, read by click threads.
///
/// Readers may see a slightly stale value but never a half-written one.
#[derive(Debug)]
pub struct ClickSettings {
    kind: AtomicU8,
    follow_pointer: AtomicBool,
    point: AtomicU64,
}

impl ClickSettings {
    pub fn new(kind: ClickKind, target: ClickTarget) -> Self {
        let settings = Self {
            kind: AtomicU8::new(kind.to_u8()),
            follow_pointer: AtomicBool::new(true),
            point: AtomicU64::new(Point::default().pack()),
        };
        settings.set_target(target);
        settings
    }

    pub fn kind(&self) -> ClickKind {
        ClickKind::from_u8(self.kind.load(Ordering::Relaxed))
    }

    pub fn set_kind(&self, kind: ClickKind) {
        self.kind.store(kind.to_u8(), Ordering::Relaxed);
    }

    pub fn target(&self) -> ClickTarget {
        if self.follow_pointer.load(Ordering::Acquire) {
            ClickTarget::Pointer
        } else {
            ClickTarget::At(Point::unpack(self.point.load(Ordering::Relaxed)))
        }
    }

    pub fn set_target(&self, target: ClickTarget) {
        match target {
            ClickTarget::Pointer => self.follow_pointer.store(true, Ordering::Release),
            ClickTarget::At(point) => {
                // Point first, so a reader that sees the flag cleared sees it.
                self.point.store(point.pack(), Ordering::Relaxed);
                self.follow_pointer.store(false, Ordering::Release);
            }
        }
    }

    pub fn request(&self) -> ClickRequest {
        ClickRequest {
            kind: self.kind(),
            target: self.target(),
        }
    }
}

impl Default for ClickSettings {
    fn default() -> Self {
        Self::new(ClickKind::Left, ClickTarget::Pointer)
    }
}

/// Lock-free hot path used by the scheduling strategies.
#[derive(Clone)]
pub struct DirectPath {
    port: Arc<dyn InjectionPort>,
    settings: Arc<ClickSettings>,
}

impl DirectPath {
    /// Clicks using whatever kind and target are configured right now.
    pub fn fire(&self) -> std::result::Result<Point, InjectionError> {
        self.execute(self.settings.request())
    }

    pub fn execute(&self, request: ClickRequest) -> std::result::Result<Point, InjectionError> {
        match request.target {
            ClickTarget::Pointer => self.port.click_at_pointer(request.kind),
            ClickTarget::At(point) => self
                .port
                .perform_click(request.kind, point)
                .map(|()| point),
        }
    }
}

#[derive(Default)]
struct ExplicitSlot {
    request: Option<ClickRequest>,
    result: Option<std::result::Result<Point, InjectionError>>,
    shutdown: bool,
}

struct Shared {
    direct: DirectPath,
    slot: Mutex<ExplicitSlot>,
    request_ready: Condvar,
    result_ready: Condvar,
    // Serializes explicit callers so each waits for its own result.
    callers: Mutex<()>,
}

/// Owns the explicit-dispatch worker and hands out [`DirectPath`]s.
pub struct ClickDispatcher {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl ClickDispatcher {
    pub fn new(port: Arc<dyn InjectionPort>, settings: Arc<ClickSettings>) -> Result<Self> {
        let shared = Arc::new(Shared {
            direct: DirectPath { port, settings },
            slot: Mutex::new(ExplicitSlot::default()),
            request_ready: Condvar::new(),
            result_ready: Condvar::new(),
            callers: Mutex::new(()),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("click-explicit".to_string())
            .spawn(move || explicit_worker(worker_shared))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    pub fn direct(&self) -> DirectPath {
        self.shared.direct.clone()
    }

    pub fn settings(&self) -> &Arc<ClickSettings> {
        &self.shared.direct.settings
    }

    /// Queues `request` for the worker thread and blocks until it completes.
    pub fn dispatch_explicit(&self, request: ClickRequest) -> Result<Point> {
        let _turn = lock(&self.shared.callers);
        let mut slot = lock(&self.shared.slot);
        if slot.shutdown {
            return Err(ClickerError::DispatcherClosed);
        }

        slot.request = Some(request);
        slot.result = None;
        self.shared.request_ready.notify_one();

        loop {
            if let Some(result) = slot.result.take() {
                return result.map_err(ClickerError::from);
            }
            if slot.shutdown {
                return Err(ClickerError::DispatcherClosed);
            }
            slot = self
                .shared
                .result_ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Drop for ClickDispatcher {
    fn drop(&mut self) {
        lock(&self.shared.slot).shutdown = true;
        self.shared.request_ready.notify_all();
        self.shared.result_ready.notify_all();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                debug!("explicit click worker panicked");
            }
        }
    }
}

fn explicit_worker(shared: Arc<Shared>) {
    let mut slot = lock(&shared.slot);
    loop {
        while slot.request.is_none() && !slot.shutdown {
            slot = shared
                .request_ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if slot.shutdown {
            break;
        }
        let Some(request) = slot.request.take() else {
            continue;
        };
        drop(slot);

        trace!(?request, "explicit click");
        let result = shared.direct.execute(request);

        slot = lock(&shared.slot);
        slot.result = Some(result);
        shared.result_ready.notify_all();
    }
    debug!("explicit click worker exiting");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injection::NoopPort;

    fn dispatcher(port: Arc<NoopPort>) -> ClickDispatcher {
        ClickDispatcher::new(port, Arc::new(ClickSettings::default())).unwrap()
    }

    #[test]
    fn test_settings_target_switches() {
        let settings = ClickSettings::default();
        assert_eq!(settings.target(), ClickTarget::Pointer);

        settings.set_target(ClickTarget::At(Point::new(-4, 7)));
        assert_eq!(settings.target(), ClickTarget::At(Point::new(-4, 7)));

        settings.set_kind(ClickKind::Middle);
        assert_eq!(settings.request().kind, ClickKind::Middle);

        settings.set_target(ClickTarget::Pointer);
        assert_eq!(settings.target(), ClickTarget::Pointer);
    }

    #[test]
    fn test_direct_path_resolves_pointer_per_call() {
        let port = Arc::new(NoopPort::new(Point::new(1, 1)));
        let dispatcher = dispatcher(Arc::clone(&port));
        let direct = dispatcher.direct();

        assert_eq!(direct.fire().unwrap(), Point::new(1, 1));
        port.set_pointer(Point::new(2, 2));
        assert_eq!(direct.fire().unwrap(), Point::new(2, 2));
        assert_eq!(port.clicks(), 2);
    }

    #[test]
    fn test_explicit_path_performs_exactly_one_click_each() {
        let port = Arc::new(NoopPort::new(Point::new(3, 4)));
        let dispatcher = dispatcher(Arc::clone(&port));

        let request = ClickRequest {
            kind: ClickKind::Right,
            target: ClickTarget::At(Point::new(10, 20)),
        };
        assert_eq!(dispatcher.dispatch_explicit(request).unwrap(), Point::new(10, 20));
        assert_eq!(port.clicks(), 1);

        let request = ClickRequest {
            kind: ClickKind::Left,
            target: ClickTarget::Pointer,
        };
        assert_eq!(dispatcher.dispatch_explicit(request).unwrap(), Point::new(3, 4));
        assert_eq!(port.clicks(), 2);
    }

    #[test]
    fn test_explicit_path_from_many_threads() {
        let port = Arc::new(NoopPort::default());
        let dispatcher = Arc::new(dispatcher(Arc::clone(&port)));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                thread::spawn(move || {
                    for _ in 0..25 {
                        let request = dispatcher.settings().request();
                        dispatcher.dispatch_explicit(request).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(port.clicks(), 100);
    }
}

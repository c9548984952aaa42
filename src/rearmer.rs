//! Interval Rearmer: fire now, then re-arm a single-shot wait after every fire.
//!
//! Each wait reads the current delay when it is armed, so changing the delay
//! mid-run affects the next wait without touching the one in flight. Waits
//! are genuine timed sleeps on the cancellation token and end early on stop.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::dispatcher::DirectPath;
use crate::error::Result;
use crate::status::{StatusEvent, StatusSink};
use crate::types::clamp_delay_millis;
use crate::worker::{CancelToken, Worker, WorkerExit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RearmerState {
    /// Armed, first click not yet issued.
    ImmediatePending,
    /// Sleeping until the next re-arm.
    Waiting,
    Disarmed,
}

impl RearmerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RearmerState::ImmediatePending,
            1 => RearmerState::Waiting,
            _ => RearmerState::Disarmed,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            RearmerState::ImmediatePending => 0,
            RearmerState::Waiting => 1,
            RearmerState::Disarmed => 2,
        }
    }
}

/// An armed Interval-mode chain.
pub struct IntervalRearmer {
    worker: Worker,
    state: Arc<AtomicU8>,
}

impl IntervalRearmer {
    /// `delay_ms` is read at every re-arm; the controller may change it live.
    pub fn arm(
        delay_ms: Arc<AtomicU64>,
        direct: DirectPath,
        counter: Arc<AtomicU64>,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self> {
        let state = Arc::new(AtomicU8::new(RearmerState::ImmediatePending.to_u8()));
        let chain_state = Arc::clone(&state);
        debug!(
            delay_ms = delay_ms.load(Ordering::Relaxed),
            "arming interval rearmer"
        );

        let worker = Worker::spawn("click-interval", move |token| {
            run_rearm_chain(
                &delay_ms,
                &direct,
                &counter,
                sink.as_ref(),
                &token,
                &chain_state,
            );
        })?;
        Ok(Self { worker, state })
    }

    pub fn state(&self) -> RearmerState {
        RearmerState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn disarm(self, grace: Duration) -> WorkerExit {
        self.worker.shutdown(grace)
    }
}

fn run_rearm_chain(
    delay_ms: &AtomicU64,
    direct: &DirectPath,
    counter: &AtomicU64,
    sink: &dyn StatusSink,
    token: &CancelToken,
    state: &AtomicU8,
) {
    let set_state = |s: RearmerState| state.store(s.to_u8(), Ordering::Relaxed);

    while !token.is_cancelled() {
        let result = direct.fire();
        if token.is_cancelled() {
            break;
        }
        match result {
            Ok(point) => {
                let count = counter.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(%point, count, "interval click");
                sink.emit(StatusEvent::ClickCountChanged(count));
            }
            Err(e) => {
                warn!(error = %e, "interval click failed");
                sink.emit(StatusEvent::InjectionFailed(e));
            }
        }

        set_state(RearmerState::Waiting);
        let delay = clamp_delay_millis(delay_ms.load(Ordering::Relaxed));
        if token.wait_timeout(Duration::from_millis(delay)) {
            break;
        }
    }

    set_state(RearmerState::Disarmed);
    debug!("interval rearmer disarmed");
}

//! Precision Scheduler: drift-corrected fixed-rate pacing for Rapid mode.
//!
//! The loop owns a dedicated thread and keeps asking "is it time to fire?".
//! After each fire the next deadline is measured from the moment the fire was
//! decided, not from the previous deadline, so a stall produces one late click
//! rather than a catch-up burst.
//!
//! Idle policy depends on the rate. At or above
//! [`HIGH_SPEED_THRESHOLD_CPS`](crate::types::HIGH_SPEED_THRESHOLD_CPS) the
//! loop busy-polls because OS timer granularity is coarser than the spacing
//! it needs. Below it, the loop yields once per idle iteration. Neither mode
//! offers hard real-time guarantees.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::dispatcher::DirectPath;
use crate::error::Result;
use crate::status::{StatusEvent, StatusSink};
use crate::types::RateConfig;
use crate::worker::{CancelToken, Worker, WorkerExit};

/// Loop iterations between cancellation checks in high-speed mode.
pub const HIGH_SPEED_CHECK_EVERY: u32 = 10_000;
/// Loop iterations between cancellation checks below the threshold.
pub const LOW_SPEED_CHECK_EVERY: u32 = 500;
/// Upper bound on wall time between cancellation checks.
pub const MAX_CHECK_GAP: Duration = Duration::from_millis(5);
/// Minimum spacing of `ClickCountChanged` events.
pub const COUNT_REPORT_INTERVAL: Duration = Duration::from_millis(100);

/// An armed Rapid-mode loop.
pub struct PrecisionScheduler {
    worker: Worker,
    rate: RateConfig,
}

impl PrecisionScheduler {
    /// Starts pacing at `rate`. The rate is fixed for the life of this loop;
    /// a new rate requires disarming and arming a fresh scheduler.
    pub fn arm(
        rate: RateConfig,
        direct: DirectPath,
        counter: Arc<AtomicU64>,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self> {
        debug!(
            cps = rate.clicks_per_second(),
            interval_us = rate.interval_micros(),
            high_speed = rate.is_high_speed(),
            "arming precision scheduler"
        );
        let worker = Worker::spawn("click-rapid", move |token| {
            run_pacing_loop(rate, &direct, &counter, sink.as_ref(), &token);
        })?;
        Ok(Self { worker, rate })
    }

    pub fn rate(&self) -> RateConfig {
        self.rate
    }

    pub fn token(&self) -> &CancelToken {
        self.worker.token()
    }

    pub fn disarm(self, grace: Duration) -> WorkerExit {
        self.worker.shutdown(grace)
    }
}

/// The pacing loop itself. Returns when `token` is observed cancelled.
///
/// Once cancelled the loop neither counts nor reports; the final count is
/// announced by whoever stopped it.
pub fn run_pacing_loop(
    rate: RateConfig,
    direct: &DirectPath,
    counter: &AtomicU64,
    sink: &dyn StatusSink,
    token: &CancelToken,
) {
    let interval = rate.interval();
    let high_speed = rate.is_high_speed();
    let check_every = if high_speed {
        HIGH_SPEED_CHECK_EVERY
    } else {
        LOW_SPEED_CHECK_EVERY
    };

    let mut iterations_since_check: u32 = 0;
    let mut last_fire = Instant::now();
    let mut last_check = last_fire;
    let mut last_report = last_fire;
    let mut reported = counter.load(Ordering::Relaxed);

    loop {
        let now = Instant::now();

        if now.duration_since(last_fire) >= interval {
            let result = direct.fire();
            // A stop may have given up on this click while it was in flight.
            if token.is_cancelled() {
                break;
            }
            match result {
                Ok(point) => {
                    counter.fetch_add(1, Ordering::Relaxed);
                    trace!(%point, "rapid click");
                }
                Err(e) => {
                    warn!(error = %e, "rapid click failed");
                    sink.emit(StatusEvent::InjectionFailed(e));
                }
            }
            last_fire = now;
        } else if high_speed {
            std::hint::spin_loop();
        } else {
            thread::yield_now();
        }
        iterations_since_check += 1;

        if iterations_since_check >= check_every
            || now.duration_since(last_check) >= MAX_CHECK_GAP
        {
            if token.is_cancelled() {
                break;
            }
            iterations_since_check = 0;
            last_check = now;

            if now.duration_since(last_report) >= COUNT_REPORT_INTERVAL {
                last_report = now;
                let count = counter.load(Ordering::Relaxed);
                if count != reported {
                    reported = count;
                    sink.emit(StatusEvent::ClickCountChanged(count));
                }
            }
        }
    }

    debug!(
        clicks = counter.load(Ordering::Relaxed),
        "precision scheduler loop exited"
    );
}

//! Run Controller: configuration, the Idle/Running state machine and the
//! public contract used by front ends.
//!
//! All mutation goes through `&mut self`, so the controlling context is single
//! writer by construction. Background strategies only see the shared click
//! settings, their own cancellation token and the run's click counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::ClickerSettings;
use crate::dispatcher::{ClickDispatcher, ClickRequest, ClickSettings, ClickTarget};
use crate::error::{ClickerError, InjectionError, Result};
use crate::injection::InjectionPort;
use crate::rearmer::IntervalRearmer;
use crate::scheduler::PrecisionScheduler;
use crate::status::{StatusEvent, StatusSink};
use crate::types::{ClickKind, IntervalConfig, Mode, Point, PositionPolicy, RateConfig};
use crate::worker::WorkerExit;

/// How long `stop()` waits for the active strategy before detaching it.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

/// Result of [`RunController::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running.
    AlreadyIdle,
    /// The active strategy exited within the grace period.
    Stopped,
    /// The active strategy overran the grace period and was detached. It will
    /// exit at its next cancellation check; a click it still has in flight is
    /// neither counted nor reported.
    TimedOut,
}

enum ActiveStrategy {
    Rapid(PrecisionScheduler),
    Interval(IntervalRearmer),
}

impl ActiveStrategy {
    fn disarm(self, grace: Duration) -> WorkerExit {
        match self {
            ActiveStrategy::Rapid(scheduler) => scheduler.disarm(grace),
            ActiveStrategy::Interval(rearmer) => rearmer.disarm(grace),
        }
    }
}

pub struct RunController {
    rate: RateConfig,
    interval: IntervalConfig,
    live_delay_ms: Arc<AtomicU64>,
    kind: ClickKind,
    policy: PositionPolicy,
    mode: Mode,

    port: Arc<dyn InjectionPort>,
    dispatcher: ClickDispatcher,
    sink: Arc<dyn StatusSink>,

    state: RunState,
    active: Option<ActiveStrategy>,
    click_count: Arc<AtomicU64>,
    test_click_count: AtomicU64,
    run_started: Option<Instant>,
    grace: Duration,
}

impl RunController {
    pub fn new(port: Arc<dyn InjectionPort>, sink: Arc<dyn StatusSink>) -> Result<Self> {
        Self::with_settings(&ClickerSettings::default(), port, sink)
    }

    pub fn with_settings(
        settings: &ClickerSettings,
        port: Arc<dyn InjectionPort>,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self> {
        let click_settings = Arc::new(ClickSettings::new(
            settings.click_kind,
            ClickTarget::Pointer,
        ));
        let dispatcher = ClickDispatcher::new(Arc::clone(&port), click_settings)?;
        let interval = IntervalConfig::from_duration(settings.interval_delay);

        let mut controller = Self {
            rate: RateConfig::new(settings.clicks_per_second),
            interval,
            live_delay_ms: Arc::new(AtomicU64::new(interval.delay_millis())),
            kind: settings.click_kind,
            policy: settings.position_policy,
            mode: settings.mode,
            port,
            dispatcher,
            sink,
            state: RunState::Idle,
            active: None,
            click_count: Arc::new(AtomicU64::new(0)),
            test_click_count: AtomicU64::new(0),
            run_started: None,
            grace: SHUTDOWN_GRACE,
        };
        controller.set_position_policy(settings.position_policy);
        Ok(controller)
    }

    /// Overrides the stop grace period.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    // ----- configuration -----

    /// Clamps to [1, 10000]. A running Rapid loop is restarted with the new
    /// interval; the run's click count carries over. If the old loop does not
    /// exit within the grace period the run ends instead.
    pub fn set_rate(&mut self, clicks_per_second: u32) {
        self.rate.set(clicks_per_second);
        debug!(
            cps = self.rate.clicks_per_second(),
            interval_us = self.rate.interval_micros(),
            "rate set"
        );

        if !matches!(self.active, Some(ActiveStrategy::Rapid(_))) {
            return;
        }
        if let Some(old) = self.active.take() {
            if old.disarm(self.grace) == WorkerExit::TimedOut {
                // The old loop may still be inside a click.
                warn!("rapid loop overran its grace period during rate change; stopping run");
                self.detach_click_count();
                self.finish_run();
                return;
            }
        }
        match self.arm_rapid() {
            Ok(strategy) => self.active = Some(strategy),
            Err(e) => {
                error!(error = %e, "failed to restart rapid loop; stopping run");
                self.finish_run();
            }
        }
    }

    /// Clamped to [1ms, 1000s]; a running Interval chain uses it from the next re-arm.
    pub fn set_interval_delay(&mut self, delay_millis: u64) {
        self.interval.set(delay_millis);
        self.live_delay_ms
            .store(self.interval.delay_millis(), Ordering::Relaxed);
        debug!(delay_ms = self.interval.delay_millis(), "interval delay set");
    }

    pub fn set_click_kind(&mut self, kind: ClickKind) {
        self.kind = kind;
        self.dispatcher.settings().set_kind(kind);
    }

    /// Takes effect on the next dispatched click. While running,
    /// `LockOnStart` samples the pointer at the moment of the change.
    pub fn set_position_policy(&mut self, policy: PositionPolicy) {
        self.policy = policy;
        let target = if self.is_running() {
            self.resolve_run_target().unwrap_or_else(|e| {
                warn!(error = %e, "could not sample pointer; following it instead");
                self.sink.emit(StatusEvent::InjectionFailed(e));
                ClickTarget::Pointer
            })
        } else {
            self.idle_target()
        };
        self.dispatcher.settings().set_target(target);
    }

    /// Stored for the next run. The active strategy is never switched live.
    pub fn set_mode(&mut self, mode: Mode) {
        if self.is_running() && mode != self.mode {
            warn!(%mode, "mode change while running applies to the next run");
        }
        self.mode = mode;
    }

    // ----- lifecycle -----

    /// Idle -> Running. No-op if already running.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let target = self.resolve_run_target().inspect_err(|e| {
            self.sink.emit(StatusEvent::InjectionFailed(e.clone()));
        })?;
        let settings = self.dispatcher.settings();
        settings.set_kind(self.kind);
        settings.set_target(target);

        // Fresh counter per run, so a detached worker can never touch it.
        self.click_count = Arc::new(AtomicU64::new(0));

        // Announced before arming so no click event can precede it.
        self.sink.emit(StatusEvent::Started);
        let strategy = match self.mode {
            Mode::Rapid => self.arm_rapid(),
            Mode::Interval => self.arm_interval(),
        };
        let strategy = match strategy {
            Ok(strategy) => strategy,
            Err(e) => {
                error!(error = %e, "failed to arm click strategy");
                self.dispatcher.settings().set_target(self.idle_target());
                self.sink.emit(StatusEvent::Stopped);
                return Err(e);
            }
        };

        self.active = Some(strategy);
        self.state = RunState::Running;
        self.run_started = Some(Instant::now());
        info!(
            mode = %self.mode,
            kind = %self.kind,
            target = ?target,
            "clicking started"
        );
        Ok(())
    }

    /// Running -> Idle. No-op if already idle; safe to call repeatedly and
    /// from shutdown paths.
    pub fn stop(&mut self) -> StopOutcome {
        if !self.is_running() {
            return StopOutcome::AlreadyIdle;
        }

        let exit = self
            .active
            .take()
            .map_or(WorkerExit::Clean, |strategy| strategy.disarm(self.grace));
        if exit == WorkerExit::TimedOut {
            self.detach_click_count();
        }
        self.finish_run();

        match exit {
            WorkerExit::TimedOut => {
                warn!("click strategy overran its shutdown grace period");
                StopOutcome::TimedOut
            }
            WorkerExit::Panicked => {
                error!("click strategy panicked before stop");
                StopOutcome::Stopped
            }
            WorkerExit::Clean => StopOutcome::Stopped,
        }
    }

    /// Hotkey reaction. Returns whether the controller is now running.
    pub fn toggle(&mut self) -> Result<bool> {
        if self.is_running() {
            self.stop();
            Ok(false)
        } else {
            self.start()?;
            Ok(true)
        }
    }

    // ----- queries -----

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn click_count(&self) -> u64 {
        self.click_count.load(Ordering::Relaxed)
    }

    /// While running, a concurrent click may land right after the reset.
    pub fn reset_click_count(&self) {
        self.click_count.store(0, Ordering::Relaxed);
        self.sink.emit(StatusEvent::ClickCountChanged(0));
    }

    /// Clicks issued through [`perform_test_click`](Self::perform_test_click).
    /// Never included in [`click_count`](Self::click_count).
    pub fn test_click_count(&self) -> u64 {
        self.test_click_count.load(Ordering::Relaxed)
    }

    pub fn rate(&self) -> RateConfig {
        self.rate
    }

    pub fn interval(&self) -> IntervalConfig {
        self.interval
    }

    pub fn click_kind(&self) -> ClickKind {
        self.kind
    }

    pub fn position_policy(&self) -> PositionPolicy {
        self.policy
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    // ----- test click -----

    /// One click through the explicit dispatch path, regardless of run state.
    pub fn perform_test_click(&self) -> Result<Point> {
        let target = match self.policy {
            PositionPolicy::FollowPointer => ClickTarget::Pointer,
            PositionPolicy::Fixed(point) => ClickTarget::At(point),
            PositionPolicy::LockOnStart if self.is_running() => self.dispatcher.settings().target(),
            PositionPolicy::LockOnStart => ClickTarget::Pointer,
        };
        let request = ClickRequest {
            kind: self.kind,
            target,
        };

        match self.dispatcher.dispatch_explicit(request) {
            Ok(point) => {
                self.test_click_count.fetch_add(1, Ordering::Relaxed);
                debug!(%point, "test click");
                Ok(point)
            }
            Err(ClickerError::Injection(e)) => {
                warn!(error = %e, "test click failed");
                self.sink.emit(StatusEvent::InjectionFailed(e.clone()));
                Err(ClickerError::Injection(e))
            }
            Err(e) => Err(e),
        }
    }

    // ----- settings surface -----

    pub fn apply_settings(&mut self, settings: &ClickerSettings) {
        self.set_mode(settings.mode);
        self.set_click_kind(settings.click_kind);
        self.set_position_policy(settings.position_policy);
        let delay_ms = u64::try_from(settings.interval_delay.as_millis()).unwrap_or(u64::MAX);
        self.set_interval_delay(delay_ms);
        self.set_rate(settings.clicks_per_second);
    }

    /// Writes the current engine values into `settings`, leaving the rest alone.
    pub fn export_settings(&self, settings: &mut ClickerSettings) {
        settings.clicks_per_second = self.rate.clicks_per_second();
        settings.interval_delay = self.interval.delay();
        settings.click_kind = self.kind;
        settings.position_policy = self.policy;
        settings.mode = self.mode;
    }

    // ----- internals -----

    fn arm_rapid(&self) -> Result<ActiveStrategy> {
        PrecisionScheduler::arm(
            self.rate,
            self.dispatcher.direct(),
            Arc::clone(&self.click_count),
            Arc::clone(&self.sink),
        )
        .map(ActiveStrategy::Rapid)
    }

    fn arm_interval(&self) -> Result<ActiveStrategy> {
        IntervalRearmer::arm(
            Arc::clone(&self.live_delay_ms),
            self.dispatcher.direct(),
            Arc::clone(&self.click_count),
            Arc::clone(&self.sink),
        )
        .map(ActiveStrategy::Interval)
    }

    fn resolve_run_target(&self) -> std::result::Result<ClickTarget, InjectionError> {
        match self.policy {
            PositionPolicy::FollowPointer => Ok(ClickTarget::Pointer),
            PositionPolicy::Fixed(point) => Ok(ClickTarget::At(point)),
            PositionPolicy::LockOnStart => self.port.pointer_position().map(ClickTarget::At),
        }
    }

    fn idle_target(&self) -> ClickTarget {
        match self.policy {
            PositionPolicy::Fixed(point) => ClickTarget::At(point),
            PositionPolicy::FollowPointer | PositionPolicy::LockOnStart => ClickTarget::Pointer,
        }
    }

    /// Moves the count to a counter no detached strategy holds.
    fn detach_click_count(&mut self) {
        let count = self.click_count();
        self.click_count = Arc::new(AtomicU64::new(count));
    }

    fn finish_run(&mut self) {
        self.state = RunState::Idle;
        // Drop any position captured for the run.
        self.dispatcher.settings().set_target(self.idle_target());

        let count = self.click_count();
        if let Some(started) = self.run_started.take() {
            let secs = started.elapsed().as_secs_f64();
            let observed = if secs > 0.0 { count as f64 / secs } else { 0.0 };
            info!(
                clicks = count,
                seconds = format_args!("{secs:.3}"),
                observed_cps = format_args!("{observed:.1}"),
                "clicking stopped"
            );
        }
        self.sink.emit(StatusEvent::ClickCountChanged(count));
        self.sink.emit(StatusEvent::Stopped);
    }
}

impl Drop for RunController {
    fn drop(&mut self) {
        self.stop();
    }
}

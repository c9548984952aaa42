use anyhow::Result;
use precision_clicker::config::ClickerSettings;
use precision_clicker::{
    ClickKind, InjectionError, InjectionPort, Mode, Point, PositionPolicy, RunController,
    RunState, StatusEvent, StatusSink, StopOutcome,
};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy)]
struct Recorded {
    kind: ClickKind,
    point: Point,
    at: Instant,
}

/// Injection port that records every click and lets tests move the pointer.
#[derive(Default)]
struct RecordingPort {
    pointer: Mutex<Point>,
    clicks: Mutex<Vec<Recorded>>,
    fail_clicks: AtomicBool,
    fail_pointer: AtomicBool,
    stall_on_click: AtomicU64,
    in_flight: AtomicU64,
    max_in_flight: AtomicU64,
}

impl RecordingPort {
    fn at(pointer: Point) -> Arc<Self> {
        let port = Self::default();
        *port.pointer.lock().unwrap() = pointer;
        Arc::new(port)
    }

    fn move_pointer(&self, pointer: Point) {
        *self.pointer.lock().unwrap() = pointer;
    }

    fn clicks(&self) -> Vec<Recorded> {
        self.clicks.lock().unwrap().clone()
    }

    fn record(&self, kind: ClickKind, point: Point) -> Result<(), InjectionError> {
        if self.fail_clicks.load(Ordering::Relaxed) {
            return Err(InjectionError::DisplayUnavailable);
        }
        let mut clicks = self.clicks.lock().unwrap();
        clicks.push(Recorded {
            kind,
            point,
            at: Instant::now(),
        });
        let stall_at = self.stall_on_click.load(Ordering::Relaxed);
        if stall_at != 0 && clicks.len() as u64 == stall_at {
            drop(clicks);
            thread::sleep(Duration::from_millis(200));
        }
        Ok(())
    }
}

impl InjectionPort for RecordingPort {
    fn pointer_position(&self) -> Result<Point, InjectionError> {
        if self.fail_pointer.load(Ordering::Relaxed) {
            return Err(InjectionError::PermissionDenied);
        }
        Ok(*self.pointer.lock().unwrap())
    }

    fn perform_click(&self, kind: ClickKind, point: Point) -> Result<(), InjectionError> {
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        let result = self.record(kind, point);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<StatusEvent>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl StatusSink for RecordingSink {
    fn emit(&self, event: StatusEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn controller_with(port: &Arc<RecordingPort>) -> (RunController, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let controller = RunController::new(port.clone(), sink.clone()).unwrap();
    (controller, sink)
}

/// Short grace period so a stalled click overruns it.
fn impatient_controller_with(port: &Arc<RecordingPort>) -> (RunController, Arc<RecordingSink>) {
    let (controller, sink) = controller_with(port);
    (controller.with_shutdown_grace(Duration::from_millis(20)), sink)
}

#[test]
fn test_rapid_500_cps_for_one_second() {
    let port = RecordingPort::at(Point::new(100, 100));
    let (mut controller, _sink) = controller_with(&port);

    controller.set_rate(500);
    controller.set_mode(Mode::Rapid);
    controller.start().unwrap();
    thread::sleep(Duration::from_millis(1000));
    assert_eq!(controller.stop(), StopOutcome::Stopped);

    let count = controller.click_count();
    assert!((450..=550).contains(&count), "click count {count}");
    assert_eq!(port.clicks().len() as u64, count);
}

#[test]
fn test_interval_first_click_immediate_then_after_delay() {
    let port = RecordingPort::at(Point::new(1, 1));
    let (mut controller, _sink) = controller_with(&port);

    controller.set_mode(Mode::Interval);
    controller.set_interval_delay(1000);
    controller.start().unwrap();
    let started = Instant::now();

    thread::sleep(Duration::from_millis(1300));
    controller.stop();

    let clicks = port.clicks();
    assert_eq!(clicks.len(), 2, "clicks: {clicks:?}");
    assert!(clicks[0].at.saturating_duration_since(started) < Duration::from_millis(50));

    let gap = clicks[1].at - clicks[0].at;
    assert!(
        gap >= Duration::from_millis(950) && gap <= Duration::from_millis(1050),
        "gap {gap:?}"
    );
    assert_eq!(controller.click_count(), 2);
}

#[test]
fn test_stop_halts_clicking_and_is_idempotent() {
    let port = RecordingPort::at(Point::default());
    let (mut controller, sink) = controller_with(&port);

    controller.set_rate(200);
    controller.start().unwrap();
    thread::sleep(Duration::from_millis(100));

    assert_eq!(controller.stop(), StopOutcome::Stopped);
    let after_stop = controller.click_count();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(controller.click_count(), after_stop);
    assert_eq!(port.clicks().len() as u64, after_stop);

    assert_eq!(controller.stop(), StopOutcome::AlreadyIdle);
    assert_eq!(controller.state(), RunState::Idle);

    let events = sink.events();
    assert_eq!(events.first(), Some(&StatusEvent::Started));
    assert_eq!(events.last(), Some(&StatusEvent::Stopped));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, StatusEvent::Stopped))
            .count(),
        1
    );
}

#[test]
fn test_new_run_resets_click_count() {
    let port = RecordingPort::at(Point::default());
    let (mut controller, _sink) = controller_with(&port);

    controller.set_mode(Mode::Interval);
    controller.set_interval_delay(60_000);
    controller.start().unwrap();
    thread::sleep(Duration::from_millis(30));
    controller.stop();
    assert_eq!(controller.click_count(), 1);

    controller.reset_click_count();
    assert_eq!(controller.click_count(), 0);

    controller.start().unwrap();
    thread::sleep(Duration::from_millis(30));
    controller.stop();
    assert_eq!(controller.click_count(), 1);
}

#[test]
fn test_lock_on_start_holds_position_for_the_run() {
    let port = RecordingPort::at(Point::new(300, 400));
    let (mut controller, _sink) = controller_with(&port);

    controller.set_position_policy(PositionPolicy::LockOnStart);
    controller.set_rate(100);
    controller.start().unwrap();

    thread::sleep(Duration::from_millis(50));
    port.move_pointer(Point::new(5, 5));
    thread::sleep(Duration::from_millis(50));
    controller.stop();

    let clicks = port.clicks();
    assert!(clicks.len() >= 5);
    assert!(clicks.iter().all(|c| c.point == Point::new(300, 400)));
}

#[test]
fn test_follow_pointer_samples_at_dispatch_time() {
    let port = RecordingPort::at(Point::new(10, 10));
    let (mut controller, _sink) = controller_with(&port);

    controller.set_position_policy(PositionPolicy::FollowPointer);
    controller.set_rate(100);
    controller.start().unwrap();

    thread::sleep(Duration::from_millis(60));
    port.move_pointer(Point::new(20, 20));
    thread::sleep(Duration::from_millis(60));
    controller.stop();

    let clicks = port.clicks();
    assert_eq!(clicks.first().map(|c| c.point), Some(Point::new(10, 10)));
    assert_eq!(clicks.last().map(|c| c.point), Some(Point::new(20, 20)));
}

#[test]
fn test_fixed_point_and_kind_changes_mid_run() {
    let port = RecordingPort::at(Point::new(0, 0));
    let (mut controller, _sink) = controller_with(&port);

    controller.set_position_policy(PositionPolicy::Fixed(Point::new(-50, 75)));
    controller.set_rate(100);
    controller.start().unwrap();
    thread::sleep(Duration::from_millis(60));
    controller.set_click_kind(ClickKind::Right);
    thread::sleep(Duration::from_millis(60));
    controller.stop();

    let clicks = port.clicks();
    assert!(clicks.iter().all(|c| c.point == Point::new(-50, 75)));
    assert_eq!(clicks.first().map(|c| c.kind), Some(ClickKind::Left));
    assert_eq!(clicks.last().map(|c| c.kind), Some(ClickKind::Right));
}

#[test]
fn test_test_click_while_idle() {
    let port = RecordingPort::at(Point::new(7, 8));
    let (mut controller, sink) = controller_with(&port);
    controller.set_click_kind(ClickKind::Double);

    let point = controller.perform_test_click().unwrap();

    assert_eq!(point, Point::new(7, 8));
    let clicks = port.clicks();
    assert_eq!(clicks.len(), 1);
    assert_eq!(clicks[0].kind, ClickKind::Double);
    assert_eq!(controller.state(), RunState::Idle);
    assert_eq!(controller.click_count(), 0);
    assert_eq!(controller.test_click_count(), 1);
    assert!(sink.events().is_empty());
}

#[test]
fn test_injection_failures_are_reported_without_stopping() {
    let port = RecordingPort::at(Point::default());
    port.fail_clicks.store(true, Ordering::Relaxed);
    let (mut controller, sink) = controller_with(&port);

    controller.set_rate(100);
    controller.start().unwrap();
    thread::sleep(Duration::from_millis(60));
    assert!(controller.is_running());

    port.fail_clicks.store(false, Ordering::Relaxed);
    thread::sleep(Duration::from_millis(60));
    controller.stop();

    assert!(sink
        .events()
        .contains(&StatusEvent::InjectionFailed(InjectionError::DisplayUnavailable)));
    assert!(controller.click_count() > 0);
}

#[test]
fn test_start_fails_cleanly_when_pointer_cannot_be_sampled() {
    let port = RecordingPort::at(Point::default());
    port.fail_pointer.store(true, Ordering::Relaxed);
    let (mut controller, sink) = controller_with(&port);
    controller.set_position_policy(PositionPolicy::LockOnStart);

    assert!(controller.start().is_err());
    assert!(!controller.is_running());
    assert_eq!(
        sink.events(),
        vec![StatusEvent::InjectionFailed(InjectionError::PermissionDenied)]
    );
}

#[test]
fn test_stall_causes_one_late_click_not_a_burst() {
    let port = RecordingPort::at(Point::default());
    port.stall_on_click.store(3, Ordering::Relaxed);
    let (mut controller, _sink) = controller_with(&port);

    controller.set_rate(100);
    controller.start().unwrap();
    thread::sleep(Duration::from_millis(500));
    controller.stop();

    // 500ms at 10ms spacing, minus a 200ms stall: about 30 clicks.
    let count = controller.click_count();
    assert!(count <= 40, "burst after stall: {count}");

    let clicks = port.clicks();
    let after_stall: Vec<_> = clicks.windows(2).skip(3).take(5).collect();
    assert!(after_stall
        .iter()
        .all(|pair| pair[1].at - pair[0].at >= Duration::from_millis(5)));
}

#[test]
fn test_stop_timeout_freezes_count_and_ends_with_stopped() {
    let port = RecordingPort::at(Point::default());
    port.stall_on_click.store(1, Ordering::Relaxed);
    let (mut controller, sink) = impatient_controller_with(&port);

    controller.set_mode(Mode::Interval);
    controller.start().unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(controller.stop(), StopOutcome::TimedOut);
    assert!(!controller.is_running());

    let at_stop = controller.click_count();
    assert_eq!(at_stop, 0);
    // Let the stalled click finish on the detached thread.
    thread::sleep(Duration::from_millis(300));
    assert_eq!(controller.click_count(), at_stop);
    assert_eq!(port.clicks().len(), 1);
    assert_eq!(
        sink.events(),
        vec![
            StatusEvent::Started,
            StatusEvent::ClickCountChanged(0),
            StatusEvent::Stopped,
        ]
    );

    // The next run starts from a clean count.
    controller.set_interval_delay(60_000);
    controller.start().unwrap();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(controller.stop(), StopOutcome::Stopped);
    assert_eq!(controller.click_count(), 1);
}

#[test]
fn test_rate_change_during_stalled_click_never_overlaps_dispatches() {
    let port = RecordingPort::at(Point::default());
    port.stall_on_click.store(1, Ordering::Relaxed);
    let (mut controller, sink) = impatient_controller_with(&port);

    controller.set_rate(100);
    controller.start().unwrap();
    thread::sleep(Duration::from_millis(50));

    controller.set_rate(200);
    assert!(!controller.is_running());
    assert_eq!(controller.rate().clicks_per_second(), 200);

    thread::sleep(Duration::from_millis(300));
    assert_eq!(port.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(port.clicks().len(), 1);
    assert_eq!(controller.click_count(), 0);
    assert_eq!(sink.events().last(), Some(&StatusEvent::Stopped));
    assert_eq!(controller.stop(), StopOutcome::AlreadyIdle);
}

#[test]
fn test_toggle_starts_and_stops() {
    let port = RecordingPort::at(Point::default());
    let (mut controller, _sink) = controller_with(&port);

    assert!(controller.toggle().unwrap());
    assert!(controller.is_running());
    assert!(!controller.toggle().unwrap());
    assert!(!controller.is_running());
}

#[test]
fn test_settings_file_round_trip() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("clicker.json");

    let original = ClickerSettings {
        clicks_per_second: 1234,
        interval_delay: Duration::from_millis(2500),
        click_kind: ClickKind::Middle,
        position_policy: PositionPolicy::Fixed(Point::new(12, 34)),
        mode: Mode::Interval,
        toggle_hotkey: "ctrl+shift+f8".to_string(),
    };
    original.save_to_file(&path)?;

    let loaded = ClickerSettings::from_file(&path)?;
    assert_eq!(loaded, original);
    Ok(())
}

#[test]
fn test_settings_file_clamps_and_configures_controller() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    file.write_all(
        br#"{
            "clicks_per_second": 50000,
            "interval_delay": "0ms",
            "mode": "interval",
            "position_policy": "lock_on_start"
        }"#,
    )?;

    let settings = ClickerSettings::from_file(file.path())?;
    assert_eq!(settings.clicks_per_second, 10_000);
    assert_eq!(settings.interval_delay, Duration::from_millis(1));

    let port = RecordingPort::at(Point::default());
    let controller =
        RunController::with_settings(&settings, port, Arc::new(RecordingSink::default()))?;
    assert_eq!(controller.rate().interval_micros(), 100);
    assert_eq!(controller.mode(), Mode::Interval);
    assert_eq!(controller.position_policy(), PositionPolicy::LockOnStart);
    Ok(())
}

#[test]
fn test_bad_settings_file_is_a_load_error() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(br#"{ "interval_delay": "soon" }"#).unwrap();

    let err = ClickerSettings::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("failed to load config"));
}

//! # Precision Clicker
//!
//! A click scheduling and dispatch engine: it turns a rate or delay
//! configuration and a start/stop lifecycle into a stream of synthetic mouse
//! clicks with low timing jitter, and stays promptly cancellable.
//!
//! ## Features
//!
//! - Rapid mode: drift-corrected pacing from 1 to 10,000 clicks per second
//! - Interval mode: click immediately, then re-arm after a fixed delay
//! - Left, right, middle and double clicks
//! - Follow the pointer, lock it at start, or click a fixed coordinate
//! - Global toggle hotkey
//! - JSON settings file support
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use precision_clicker::{NoopPort, NullSink, RunController};
//!
//! let mut controller = RunController::new(Arc::new(NoopPort::default()), Arc::new(NullSink))?;
//! controller.set_rate(50);
//! controller.start()?;
//! std::thread::sleep(std::time::Duration::from_secs(1));
//! controller.stop();
//! println!("clicked {} times", controller.click_count());
//! # Ok::<(), precision_clicker::ClickerError>(())
//! ```
//!
//! ## Configuration
//!
//! ```json
//! {
//!   "clicks_per_second": 25,
//!   "interval_delay": "2s",
//!   "click_kind": "left",
//!   "position_policy": "lock_on_start",
//!   "mode": "rapid",
//!   "toggle_hotkey": "f6"
//! }
//! ```

pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod global_hotkey;
pub mod injection;
pub mod rearmer;
pub mod scheduler;
pub mod status;
pub mod types;
pub mod worker;

pub use config::{parse_duration, ClickerSettings};
pub use controller::{RunController, RunState, StopOutcome};
pub use dispatcher::{ClickDispatcher, ClickRequest, ClickTarget};
pub use error::{ClickerError, InjectionError, Result};
pub use crate::global_hotkey::{HotkeyEvent, HotkeyListener, HotkeyManager};
#[cfg(feature = "native-input")]
pub use injection::EnigoPort;
pub use injection::{InjectionPort, NoopPort};
pub use status::{NullSink, StatusEvent, StatusSink};
pub use types::{ClickKind, IntervalConfig, Mode, Point, PositionPolicy, RateConfig};

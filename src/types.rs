//! Value types shared by the scheduling engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ClickerError;

/// Lowest accepted rapid-mode rate.
pub const MIN_CLICKS_PER_SECOND: u32 = 1;
/// Highest accepted rapid-mode rate.
pub const MAX_CLICKS_PER_SECOND: u32 = 10_000;

/// Rates at or above this pace with a tight busy-poll instead of yielding.
///
/// OS sleep and wake-up granularity (1-15ms on most desktops) is coarser than
/// the sub-millisecond spacing needed here.
pub const HIGH_SPEED_THRESHOLD_CPS: u32 = 1_000;

/// Shortest interval-mode delay.
pub const MIN_INTERVAL_DELAY_MS: u64 = 1;
/// Longest interval-mode delay offered to users (1000 seconds).
pub const MAX_INTERVAL_DELAY_MS: u64 = 1_000_000;

/// Mouse button action performed per dispatched click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickKind {
    #[default]
    Left,
    Right,
    Middle,
    /// Two left clicks back to back.
    Double,
}

impl ClickKind {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            ClickKind::Left => 0,
            ClickKind::Right => 1,
            ClickKind::Middle => 2,
            ClickKind::Double => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => ClickKind::Right,
            2 => ClickKind::Middle,
            3 => ClickKind::Double,
            _ => ClickKind::Left,
        }
    }
}

impl fmt::Display for ClickKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClickKind::Left => "left",
            ClickKind::Right => "right",
            ClickKind::Middle => "middle",
            ClickKind::Double => "double",
        };
        f.write_str(name)
    }
}

impl FromStr for ClickKind {
    type Err = ClickerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "left" | "l" => Ok(ClickKind::Left),
            "right" | "r" => Ok(ClickKind::Right),
            "middle" | "m" => Ok(ClickKind::Middle),
            "double" | "d" => Ok(ClickKind::Double),
            other => Err(ClickerError::invalid_click_kind(other)),
        }
    }
}

/// Screen coordinate in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Packs both coordinates into one word so they can be swapped atomically.
    pub(crate) fn pack(self) -> u64 {
        ((self.x as u32 as u64) << 32) | (self.y as u32 as u64)
    }

    pub(crate) fn unpack(word: u64) -> Self {
        Self {
            x: (word >> 32) as u32 as i32,
            y: word as u32 as i32,
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl FromStr for Point {
    type Err = ClickerError;

    /// Parses `"x,y"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| ClickerError::invalid_position(s, "expected 'x,y'"))?;
        let x = x
            .trim()
            .parse::<i32>()
            .map_err(|e| ClickerError::invalid_position(s, e.to_string()))?;
        let y = y
            .trim()
            .parse::<i32>()
            .map_err(|e| ClickerError::invalid_position(s, e.to_string()))?;
        Ok(Point::new(x, y))
    }
}

/// Where clicks land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionPolicy {
    /// Sample the pointer at every dispatch.
    #[default]
    FollowPointer,
    /// Sample the pointer once when a run starts and hold it for the run.
    LockOnStart,
    /// Always click this coordinate.
    Fixed(Point),
}

/// Which temporal strategy a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Drift-corrected fixed-rate pacing.
    #[default]
    Rapid,
    /// Fire immediately, then re-arm after a fixed delay.
    Interval,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Rapid => f.write_str("rapid"),
            Mode::Interval => f.write_str("interval"),
        }
    }
}

/// Rapid-mode rate with its derived firing interval.
///
/// The two fields only change together through [`RateConfig::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateConfig {
    clicks_per_second: u32,
    interval_micros: u64,
}

impl RateConfig {
    pub fn new(clicks_per_second: u32) -> Self {
        let mut config = Self {
            clicks_per_second: MIN_CLICKS_PER_SECOND,
            interval_micros: 1_000_000,
        };
        config.set(clicks_per_second);
        config
    }

    /// Clamps to the supported range and recomputes the interval.
    pub fn set(&mut self, clicks_per_second: u32) {
        self.clicks_per_second =
            clicks_per_second.clamp(MIN_CLICKS_PER_SECOND, MAX_CLICKS_PER_SECOND);
        self.interval_micros = 1_000_000 / u64::from(self.clicks_per_second);
    }

    pub fn clicks_per_second(&self) -> u32 {
        self.clicks_per_second
    }

    pub fn interval_micros(&self) -> u64 {
        self.interval_micros
    }

    pub fn interval(&self) -> Duration {
        Duration::from_micros(self.interval_micros)
    }

    pub fn is_high_speed(&self) -> bool {
        self.clicks_per_second >= HIGH_SPEED_THRESHOLD_CPS
    }
}

impl Default for RateConfig {
    fn default() -> Self {
        Self::new(10)
    }
}

/// Interval-mode delay between re-arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalConfig {
    delay_millis: u64,
}

impl IntervalConfig {
    pub fn new(delay_millis: u64) -> Self {
        Self {
            delay_millis: clamp_delay_millis(delay_millis),
        }
    }

    pub fn from_duration(delay: Duration) -> Self {
        Self::new(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn set(&mut self, delay_millis: u64) {
        self.delay_millis = clamp_delay_millis(delay_millis);
    }

    pub fn delay_millis(&self) -> u64 {
        self.delay_millis
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_millis)
    }
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self::new(1_000)
    }
}

pub(crate) fn clamp_delay_millis(delay_millis: u64) -> u64 {
    delay_millis.clamp(MIN_INTERVAL_DELAY_MS, MAX_INTERVAL_DELAY_MS)
}

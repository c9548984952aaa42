//! Persisted settings and duration parsing.
//!
//! Settings are stored as JSON. Every field has a default, so a partial file
//! is valid. Out-of-range numbers are clamped by [`ClickerSettings::normalized`]
//! rather than rejected.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{ClickerError, Result};
use crate::types::{
    clamp_delay_millis, ClickKind, Mode, PositionPolicy, MAX_CLICKS_PER_SECOND,
    MIN_CLICKS_PER_SECOND,
};

pub const DEFAULT_TOGGLE_HOTKEY: &str = "f6";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickerSettings {
    #[serde(default = "default_clicks_per_second")]
    pub clicks_per_second: u32,

    #[serde(default = "default_interval_delay", with = "duration_format")]
    pub interval_delay: Duration,

    #[serde(default)]
    pub click_kind: ClickKind,

    #[serde(default)]
    pub position_policy: PositionPolicy,

    #[serde(default)]
    pub mode: Mode,

    #[serde(default = "default_toggle_hotkey")]
    pub toggle_hotkey: String,
}

fn default_clicks_per_second() -> u32 {
    10
}

fn default_interval_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_toggle_hotkey() -> String {
    DEFAULT_TOGGLE_HOTKEY.to_string()
}

impl Default for ClickerSettings {
    fn default() -> Self {
        Self {
            clicks_per_second: default_clicks_per_second(),
            interval_delay: default_interval_delay(),
            click_kind: ClickKind::default(),
            position_policy: PositionPolicy::default(),
            mode: Mode::default(),
            toggle_hotkey: default_toggle_hotkey(),
        }
    }
}

impl ClickerSettings {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ClickerError::config_load(path.display().to_string(), e.to_string()))?;
        let settings: Self = serde_json::from_str(&content)
            .map_err(|e| ClickerError::config_load(path.display().to_string(), e.to_string()))?;
        Ok(settings.normalized())
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .map_err(|e| ClickerError::config_save(path.display().to_string(), e.to_string()))
    }

    /// Clamps numeric fields into their supported ranges.
    pub fn normalized(mut self) -> Self {
        self.clicks_per_second = self
            .clicks_per_second
            .clamp(MIN_CLICKS_PER_SECOND, MAX_CLICKS_PER_SECOND);
        let delay_ms = u64::try_from(self.interval_delay.as_millis()).unwrap_or(u64::MAX);
        self.interval_delay = Duration::from_millis(clamp_delay_millis(delay_ms));
        self
    }

    /// Rejects settings that cannot be clamped into shape.
    pub fn validate(&self) -> Result<()> {
        if self.toggle_hotkey.trim().is_empty() {
            return Err(ClickerError::config_validation(
                "toggle_hotkey cannot be empty",
            ));
        }
        Ok(())
    }
}

/// Parses `"250ms"`, `"2s"`, `"1m"` or a bare millisecond count.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let value = input.trim().to_lowercase();
    if value.is_empty() {
        return Err(ClickerError::invalid_duration(input, "empty value"));
    }

    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    if digits.is_empty() {
        return Err(ClickerError::invalid_duration(
            input,
            "expected a non-negative number",
        ));
    }
    let amount: u64 = digits.parse().map_err(|e: std::num::ParseIntError| {
        ClickerError::invalid_duration(input, e.to_string())
    })?;

    match unit.trim() {
        "" | "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => amount
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| ClickerError::invalid_duration(input, "value too large")),
        other => Err(ClickerError::invalid_duration(
            input,
            format!("unknown unit '{other}' (use ms, s or m)"),
        )),
    }
}

mod duration_format {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

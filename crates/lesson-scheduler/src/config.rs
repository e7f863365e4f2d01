//! Scheduler configuration, loaded from TOML.
//!
//! ```toml
//! timezone = "Europe/Berlin"
//! lesson_minutes = 60
//! sessions_per_week = 2
//! dst_policy = "wall_clock"
//!
//! [business_hours]
//! first_hour = 9
//! last_hour = 17
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::dst::DstPolicy;
use crate::error::{Result, SchedulerError};
use crate::time::{self, DayBoundary};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SchedulerConfig {
    /// IANA timezone used for every calendar-day comparison.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_lesson_minutes")]
    pub lesson_minutes: u32,
    /// How many dates a student may pick in the booking flow.
    #[serde(default = "default_sessions_per_week")]
    pub sessions_per_week: usize,
    #[serde(default)]
    pub dst_policy: DstPolicy,
    #[serde(default)]
    pub business_hours: BusinessHours,
}

/// Whole-hour lesson starts offered in hour-granularity mode, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BusinessHours {
    #[serde(default = "default_first_hour")]
    pub first_hour: u32,
    #[serde(default = "default_last_hour")]
    pub last_hour: u32,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            first_hour: default_first_hour(),
            last_hour: default_last_hour(),
        }
    }
}

impl BusinessHours {
    pub fn hours(&self) -> impl Iterator<Item = u32> {
        self.first_hour..=self.last_hour
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_lesson_minutes() -> u32 {
    60
}

fn default_sessions_per_week() -> usize {
    2
}

fn default_first_hour() -> u32 {
    9
}

fn default_last_hour() -> u32 {
    17
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            lesson_minutes: default_lesson_minutes(),
            sessions_per_week: default_sessions_per_week(),
            dst_policy: DstPolicy::default(),
            business_hours: BusinessHours::default(),
        }
    }
}

impl SchedulerConfig {
    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No scheduler config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        info!("Loading scheduler config from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            SchedulerError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: SchedulerConfig =
            toml::from_str(content).map_err(|e| SchedulerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        time::parse_timezone(&self.timezone)?;
        if self.lesson_minutes == 0 || self.lesson_minutes > 24 * 60 {
            return Err(SchedulerError::Config(format!(
                "lesson_minutes must be between 1 and 1440, got {}",
                self.lesson_minutes
            )));
        }
        let BusinessHours {
            first_hour,
            last_hour,
        } = self.business_hours;
        if first_hour > last_hour || last_hour > 23 {
            return Err(SchedulerError::Config(format!(
                "business hours {}..={} are not a valid range within the day",
                first_hour, last_hour
            )));
        }
        Ok(())
    }

    /// The day-bucketing policy derived from `timezone` and `dst_policy`.
    pub fn day_boundary(&self) -> Result<DayBoundary> {
        Ok(DayBoundary::new(
            time::parse_timezone(&self.timezone)?,
            self.dst_policy,
        ))
    }
}

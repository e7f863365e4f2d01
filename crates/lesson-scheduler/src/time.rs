//! Calendar-day and wall-clock primitives shared by the resolver and checker.
//!
//! Lesson times are stored as zero-padded `HH:MM` strings and days as
//! `YYYY-MM-DD`. Internally a wall-clock time is minutes since midnight, so
//! comparisons never depend on string formatting. Every day-equality test in
//! the crate goes through a single [`DayBoundary`], which fixes the timezone
//! used to bucket absolute instants into calendar days.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::dst::{self, DstPolicy};
use crate::error::{Result, SchedulerError};
use crate::model::TimeSlot;

const MINUTES_PER_DAY: u16 = 24 * 60;

/// A wall-clock time of day, `00:00` through `24:00` inclusive.
///
/// `24:00` exists only so a lesson may end exactly at midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WallTime(u16);

impl WallTime {
    pub const MIDNIGHT: WallTime = WallTime(0);
    pub const END_OF_DAY: WallTime = WallTime(MINUTES_PER_DAY);

    pub fn from_hm(hour: u32, minute: u32) -> Result<Self> {
        let valid = (hour < 24 && minute < 60) || (hour == 24 && minute == 0);
        if !valid {
            return Err(SchedulerError::InvalidInput(format!(
                "time out of range: {:02}:{:02}",
                hour, minute
            )));
        }
        Ok(WallTime((hour * 60 + minute) as u16))
    }

    /// Whole hour on the clock, e.g. `9` for `09:00` through `09:59`.
    pub fn from_hour(hour: u32) -> Result<Self> {
        Self::from_hm(hour, 0)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u32 {
        u32::from(self.0 / 60)
    }

    pub fn minute(self) -> u32 {
        u32::from(self.0 % 60)
    }

    /// `None` when the result would pass the end of the day.
    pub fn checked_add_minutes(self, minutes: u32) -> Option<Self> {
        let total = u32::from(self.0) + minutes;
        (total <= u32::from(MINUTES_PER_DAY)).then(|| WallTime(total as u16))
    }
}

impl FromStr for WallTime {
    type Err = SchedulerError;

    /// Strict `HH:MM`: exactly five characters, zero-padded.
    fn from_str(s: &str) -> Result<Self> {
        let bad = || SchedulerError::InvalidInput(format!("expected HH:MM time, got '{}'", s));
        let bytes = s.as_bytes();
        if bytes.len() != 5 || bytes[2] != b':' {
            return Err(bad());
        }
        let digits = [bytes[0], bytes[1], bytes[3], bytes[4]];
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(bad());
        }
        let hour = u32::from(digits[0] - b'0') * 10 + u32::from(digits[1] - b'0');
        let minute = u32::from(digits[2] - b'0') * 10 + u32::from(digits[3] - b'0');
        WallTime::from_hm(hour, minute).map_err(|_| bad())
    }
}

impl TryFrom<String> for WallTime {
    type Error = SchedulerError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<WallTime> for String {
    fn from(t: WallTime) -> String {
        t.to_string()
    }
}

impl fmt::Display for WallTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// A half-open wall-clock interval `[start, end)` within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LessonWindow {
    pub start: WallTime,
    pub end: WallTime,
}

impl LessonWindow {
    /// Rejects empty and inverted windows.
    pub fn new(start: WallTime, end: WallTime) -> Result<Self> {
        if start >= end {
            return Err(SchedulerError::InvalidInput(format!(
                "end time {} must be after start time {}",
                end, start
            )));
        }
        if start == WallTime::END_OF_DAY {
            return Err(SchedulerError::InvalidInput(
                "a lesson cannot start at 24:00".to_string(),
            ));
        }
        Ok(LessonWindow { start, end })
    }

    /// Window of `minutes` starting at `start`.
    pub fn starting_at(start: WallTime, minutes: u32) -> Result<Self> {
        let end = start.checked_add_minutes(minutes).ok_or_else(|| {
            SchedulerError::InvalidInput(format!(
                "a {}-minute lesson starting at {} runs past midnight",
                minutes, start
            ))
        })?;
        LessonWindow::new(start, end)
    }

    pub fn duration_minutes(&self) -> i64 {
        i64::from(self.end.minutes()) - i64::from(self.start.minutes())
    }
}

impl fmt::Display for LessonWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Parse a calendar day in strict `YYYY-MM-DD` form.
pub fn parse_day(s: &str) -> Result<NaiveDate> {
    let bad = || SchedulerError::InvalidInput(format!("expected YYYY-MM-DD date, got '{}'", s));
    if s.len() != 10 {
        return Err(bad());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| bad())
}

/// Parse an IANA timezone name (e.g. `"Europe/Berlin"`).
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse()
        .map_err(|_| SchedulerError::InvalidTimezone(name.to_string()))
}

/// Lowercase English weekday name used as the template document key.
pub fn weekday_key(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Inverse of [`weekday_key`], case-insensitive. Also accepts three-letter forms.
pub fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// The single timezone policy used for every day comparison.
///
/// Slot days, booking days and template expansion all bucket through the same
/// `DayBoundary`, so a slot and a booking can never disagree about which
/// calendar day they belong to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayBoundary {
    tz: Tz,
    dst: DstPolicy,
}

impl Default for DayBoundary {
    fn default() -> Self {
        DayBoundary {
            tz: Tz::UTC,
            dst: DstPolicy::default(),
        }
    }
}

impl DayBoundary {
    pub fn new(tz: Tz, dst: DstPolicy) -> Self {
        DayBoundary { tz, dst }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Calendar day that `instant` falls on in the scheduling timezone.
    pub fn day_of(&self, instant: &DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    pub fn same_day(&self, instant: &DateTime<Utc>, day: NaiveDate) -> bool {
        self.day_of(instant) == day
    }

    /// Absolute instant of a wall-clock reading on `day`. `24:00` maps to the
    /// following midnight. `None` when the DST policy skips the time.
    pub fn instant(&self, day: NaiveDate, time: WallTime) -> Option<DateTime<Utc>> {
        let (day, time) = if time == WallTime::END_OF_DAY {
            (day.checked_add_signed(Duration::days(1))?, WallTime::MIDNIGHT)
        } else {
            (day, time)
        };
        let local = day.and_hms_opt(time.hour(), time.minute(), 0)?;
        dst::resolve_local(self.tz, local, self.dst)
    }

    /// Absolute slot for a wall-clock window on `day`.
    pub fn slot(&self, day: NaiveDate, window: &LessonWindow) -> Option<TimeSlot> {
        let start = self.instant(day, window.start)?;
        let end = self.instant(day, window.end)?;
        (start < end).then_some(TimeSlot { start, end })
    }

    /// Weekday of `day`, used to pick the template entry.
    pub fn weekday(&self, day: NaiveDate) -> Weekday {
        day.weekday()
    }
}

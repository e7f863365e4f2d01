//! Typed schemas for the documents the scheduling core reads and writes.
//!
//! The backing store is schema-on-read, so every document kind gets an explicit
//! serde type and is validated when it is parsed rather than trusted by shape.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};
use crate::time::{self, LessonWindow, WallTime};

/// Opaque booking identifier assigned by the store on creation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(String);

impl BookingId {
    pub fn new(id: impl Into<String>) -> Self {
        BookingId(id.into())
    }

    /// A fresh random identifier.
    pub fn generate() -> Self {
        BookingId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Scheduled,
    /// A new date/time has been proposed; the original slot stays reserved.
    Rescheduling,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Statuses that hold their slot against other bookings.
    pub const RESERVING: [BookingStatus; 2] = [BookingStatus::Scheduled, BookingStatus::Rescheduling];

    pub fn is_reserving(self) -> bool {
        Self::RESERVING.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Scheduled, Rescheduling)
                | (Rescheduling, Scheduled)
                | (Scheduled, Cancelled)
                | (Rescheduling, Cancelled)
                | (Scheduled, Completed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Scheduled => "scheduled",
            BookingStatus::Rescheduling => "rescheduling",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonType {
    #[default]
    Individual,
    Group,
    Instant,
}

/// Which side of a booking proposed a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Teacher,
    Student,
}

/// A scheduled lesson instance, as stored in the `bookings` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: BookingId,
    pub teacher_id: String,
    pub student_id: String,
    pub date: NaiveDate,
    pub start_time: WallTime,
    pub end_time: WallTime,
    pub status: BookingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub lesson_type: LessonType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_start_time: Option<WallTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_end_time: Option<WallTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<Party>,
}

impl Booking {
    pub fn window(&self) -> LessonWindow {
        LessonWindow {
            start: self.start_time,
            end: self.end_time,
        }
    }

    /// The pending reschedule proposal, if one is complete.
    pub fn proposal(&self) -> Option<RescheduleProposal> {
        Some(RescheduleProposal {
            date: self.requested_date?,
            window: LessonWindow {
                start: self.requested_start_time?,
                end: self.requested_end_time?,
            },
            requested_by: self.requested_by?,
        })
    }

    pub fn set_proposal(&mut self, proposal: &RescheduleProposal) {
        self.requested_date = Some(proposal.date);
        self.requested_start_time = Some(proposal.window.start);
        self.requested_end_time = Some(proposal.window.end);
        self.requested_by = Some(proposal.requested_by);
    }

    pub fn clear_proposal(&mut self) {
        self.requested_date = None;
        self.requested_start_time = None;
        self.requested_end_time = None;
        self.requested_by = None;
    }

    /// Checks the invariants a document must satisfy to be usable.
    pub fn validate(&self) -> Result<()> {
        let malformed = |message: String| SchedulerError::Document {
            document: format!("bookings/{}", self.id),
            message,
        };
        if self.teacher_id.trim().is_empty() {
            return Err(malformed("empty teacherId".to_string()));
        }
        LessonWindow::new(self.start_time, self.end_time).map_err(|e| malformed(e.to_string()))?;
        if self.status == BookingStatus::Rescheduling && self.proposal().is_none() {
            return Err(malformed("rescheduling without a complete proposal".to_string()));
        }
        Ok(())
    }
}

/// Proposed new date/time for a booking in `rescheduling` status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RescheduleProposal {
    pub date: NaiveDate,
    pub window: LessonWindow,
    pub requested_by: Party,
}

/// A booking before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingDraft {
    pub teacher_id: String,
    pub student_id: String,
    pub date: NaiveDate,
    pub window: LessonWindow,
    pub title: Option<String>,
    pub lesson_type: LessonType,
}

impl BookingDraft {
    /// New bookings always start out `scheduled`.
    pub fn into_booking(self, id: BookingId) -> Booking {
        Booking {
            id,
            teacher_id: self.teacher_id,
            student_id: self.student_id,
            date: self.date,
            start_time: self.window.start,
            end_time: self.window.end,
            status: BookingStatus::Scheduled,
            title: self.title,
            lesson_type: self.lesson_type,
            requested_date: None,
            requested_start_time: None,
            requested_end_time: None,
            requested_by: None,
        }
    }

    pub fn candidate(&self) -> CandidateBooking {
        CandidateBooking {
            teacher_id: self.teacher_id.clone(),
            date: self.date,
            window: self.window,
        }
    }
}

/// Raw booking request as submitted by a caller. Validated into a
/// [`BookingDraft`] before any store access.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub teacher_id: String,
    pub student_id: String,
    pub date: String,
    pub start_time: String,
    /// Defaults to `start_time` plus the configured lesson length.
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub lesson_type: LessonType,
}

impl BookingRequest {
    pub fn validate(&self, lesson_minutes: u32) -> Result<BookingDraft> {
        require_id("teacherId", &self.teacher_id)?;
        require_id("studentId", &self.student_id)?;
        let date = time::parse_day(&self.date)?;
        let start: WallTime = self.start_time.parse()?;
        let window = match &self.end_time {
            Some(end) => LessonWindow::new(start, end.parse()?)?,
            None => LessonWindow::starting_at(start, lesson_minutes)?,
        };
        Ok(BookingDraft {
            teacher_id: self.teacher_id.trim().to_string(),
            student_id: self.student_id.trim().to_string(),
            date,
            window,
            title: self.title.clone().filter(|t| !t.trim().is_empty()),
            lesson_type: self.lesson_type,
        })
    }
}

pub(crate) fn require_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SchedulerError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// The `(teacher, day, window)` triple the conflict checker decides on.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateBooking {
    pub teacher_id: String,
    pub date: NaiveDate,
    pub window: LessonWindow,
}

impl CandidateBooking {
    /// Parse and validate caller-supplied strings.
    pub fn parse(teacher_id: &str, date: &str, start_time: &str, end_time: &str) -> Result<Self> {
        require_id("teacherId", teacher_id)?;
        Ok(CandidateBooking {
            teacher_id: teacher_id.trim().to_string(),
            date: time::parse_day(date)?,
            window: LessonWindow::new(start_time.parse()?, end_time.parse()?)?,
        })
    }
}

/// An absolute bookable interval. Equality is exact `(start, end)` match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawTimeSlot")]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(SchedulerError::InvalidInput(format!(
                "slot end {} must be after start {}",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }
        Ok(TimeSlot { start, end })
    }

    /// Half-open overlap: touching slots do not overlap.
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

#[derive(Deserialize)]
struct RawTimeSlot {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawTimeSlot> for TimeSlot {
    type Error = SchedulerError;

    fn try_from(raw: RawTimeSlot) -> Result<Self> {
        TimeSlot::new(raw.start, raw.end)
    }
}

/// `availableSlots/{teacherId}`: explicit, date-specific bookable intervals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvailableSlotSet {
    #[serde(default)]
    pub slots: Vec<TimeSlot>,
}

/// One weekday of a template: an open range, or explicit lesson start times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DayAvailability {
    Range { start: WallTime, end: WallTime },
    Times(Vec<WallTime>),
}

impl DayAvailability {
    pub fn is_open(&self) -> bool {
        match self {
            DayAvailability::Range { start, end } => start < end,
            DayAvailability::Times(times) => !times.is_empty(),
        }
    }
}

/// `teacherAvailability/{teacherId}`: recurring weekly open hours.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, DayAvailability>", into = "BTreeMap<String, DayAvailability>")]
pub struct AvailabilityTemplate {
    days: [Option<DayAvailability>; 7],
}

impl AvailabilityTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_day(mut self, day: Weekday, availability: DayAvailability) -> Self {
        self.set_day(day, availability);
        self
    }

    pub fn set_day(&mut self, day: Weekday, availability: DayAvailability) {
        self.days[day.num_days_from_monday() as usize] = Some(availability);
    }

    pub fn day(&self, day: Weekday) -> Option<&DayAvailability> {
        self.days[day.num_days_from_monday() as usize].as_ref()
    }

    /// Weekdays with any bookable time, Monday first.
    pub fn open_weekdays(&self) -> Vec<Weekday> {
        WEEK.iter()
            .copied()
            .filter(|d| self.day(*d).is_some_and(DayAvailability::is_open))
            .collect()
    }
}

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

impl TryFrom<BTreeMap<String, DayAvailability>> for AvailabilityTemplate {
    type Error = SchedulerError;

    fn try_from(map: BTreeMap<String, DayAvailability>) -> Result<Self> {
        let mut template = AvailabilityTemplate::default();
        for (key, availability) in map {
            let day = time::parse_weekday(&key).ok_or_else(|| SchedulerError::Document {
                document: "teacherAvailability".to_string(),
                message: format!("unknown weekday '{}'", key),
            })?;
            template.set_day(day, availability);
        }
        Ok(template)
    }
}

impl From<AvailabilityTemplate> for BTreeMap<String, DayAvailability> {
    fn from(template: AvailabilityTemplate) -> Self {
        WEEK.iter()
            .zip(template.days)
            .filter_map(|(day, availability)| {
                availability.map(|a| (time::weekday_key(*day).to_string(), a))
            })
            .collect()
    }
}

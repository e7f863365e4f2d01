//! Detect overlaps between a candidate lesson and a teacher's existing bookings.
//!
//! Intervals are half-open `[start, end)`. Adjacent lessons (one ends exactly
//! when the next starts) are NOT conflicts.

use std::sync::Arc;

use crate::error::Result;
use crate::model::{Booking, BookingId, CandidateBooking};
use crate::store::{BookingQuery, ScheduleStore};
use crate::time::LessonWindow;

/// An existing booking that overlaps a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub booking: Booking,
    pub overlap_minutes: i64,
}

/// Whether `candidate` overlaps `existing`.
///
/// A conflict is any of:
/// 1. the candidate starts inside the existing lesson,
/// 2. the candidate ends inside the existing lesson,
/// 3. the candidate fully contains the existing lesson.
///
/// For non-empty windows this is exactly `candidate.start < existing.end &&
/// existing.start < candidate.end`, and is symmetric in its arguments.
pub fn overlaps(existing: &LessonWindow, candidate: &LessonWindow) -> bool {
    let starts_inside = existing.start <= candidate.start && candidate.start < existing.end;
    let ends_inside = existing.start < candidate.end && candidate.end <= existing.end;
    let contains = candidate.start <= existing.start && candidate.end >= existing.end;
    starts_inside || ends_inside || contains
}

/// Minutes shared by two windows; zero when they do not overlap.
pub fn overlap_minutes(a: &LessonWindow, b: &LessonWindow) -> i64 {
    let start = a.start.max(b.start);
    let end = a.end.min(b.end);
    (i64::from(end.minutes()) - i64::from(start.minutes())).max(0)
}

/// Find every reserving booking for the candidate's teacher and day that
/// overlaps the candidate window.
///
/// Bookings for other teachers, other days, or in a non-reserving status are
/// ignored, so callers may pass an unfiltered list.
pub fn find_conflicts(candidate: &CandidateBooking, existing: &[Booking]) -> Vec<Conflict> {
    existing
        .iter()
        .filter(|b| b.teacher_id == candidate.teacher_id && b.date == candidate.date)
        .filter(|b| b.status.is_reserving())
        .filter(|b| overlaps(&b.window(), &candidate.window))
        .map(|b| Conflict {
            booking: b.clone(),
            overlap_minutes: overlap_minutes(&b.window(), &candidate.window),
        })
        .collect()
}

/// Store-backed conflict check. Read-only: it never writes.
///
/// Store failures are returned as errors; an unreadable schedule is never
/// reported as "no conflict".
#[derive(Clone)]
pub struct ConflictChecker {
    store: Arc<dyn ScheduleStore>,
}

impl ConflictChecker {
    pub fn new(store: Arc<dyn ScheduleStore>) -> Self {
        ConflictChecker { store }
    }

    /// `true` if the candidate overlaps any reserving booking.
    pub async fn has_conflict(&self, candidate: &CandidateBooking) -> Result<bool> {
        Ok(!self.conflicts(candidate).await?.is_empty())
    }

    /// Like [`has_conflict`](Self::has_conflict), ignoring booking `skip`.
    /// Used when moving a booking so it does not collide with itself.
    pub async fn has_conflict_excluding(
        &self,
        candidate: &CandidateBooking,
        skip: &BookingId,
    ) -> Result<bool> {
        Ok(self
            .conflicts(candidate)
            .await?
            .iter()
            .any(|c| &c.booking.id != skip))
    }

    /// All overlapping reserving bookings, in store order (by start time).
    pub async fn conflicts(&self, candidate: &CandidateBooking) -> Result<Vec<Conflict>> {
        let query = BookingQuery::reserving()
            .teacher(&candidate.teacher_id)
            .on(candidate.date);
        let existing = self.store.find_bookings(&query).await?;
        Ok(find_conflicts(candidate, &existing))
    }
}

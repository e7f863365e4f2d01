//! Booking lifecycle: create, reschedule, cancel and complete lessons.
//!
//! This is the caller-facing boundary of the core. It validates input before
//! touching the store and does all of the crate's operational logging, inside
//! a span the caller supplies via [`BookingService::with_span`].
//!
//! Two kinds of lock serialize writes within one service:
//! - a `(teacher, day)` lock covers a conflict check and the write it guards,
//!   so two overlapping requests cannot both pass the check;
//! - a per-booking lock covers every read-modify-write of an existing
//!   booking, so a status change is never lost to a concurrent one.
//!
//! When both are needed the booking lock is taken first.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::config::SchedulerConfig;
use crate::conflict::{Conflict, ConflictChecker};
use crate::error::{Result, SchedulerError};
use crate::locks::KeyedLocks;
use crate::model::{
    require_id, Booking, BookingId, BookingRequest, BookingStatus, CandidateBooking, Party,
    RescheduleProposal,
};
use crate::store::{BookingQuery, ScheduleStore};
use crate::time::{self, LessonWindow, WallTime};

type DayKey = (String, NaiveDate);

pub struct BookingService {
    store: Arc<dyn ScheduleStore>,
    checker: ConflictChecker,
    lesson_minutes: u32,
    day_locks: KeyedLocks<DayKey>,
    booking_locks: KeyedLocks<BookingId>,
    span: Span,
}

impl BookingService {
    pub fn new(store: Arc<dyn ScheduleStore>, config: &SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(BookingService {
            checker: ConflictChecker::new(Arc::clone(&store)),
            store,
            lesson_minutes: config.lesson_minutes,
            day_locks: KeyedLocks::new(),
            booking_locks: KeyedLocks::new(),
            span: info_span!("booking_service"),
        })
    }

    /// Parent span for every event this service logs.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn checker(&self) -> &ConflictChecker {
        &self.checker
    }

    /// Day and booking locks currently held or awaited. Zero when idle.
    pub fn held_locks(&self) -> usize {
        self.day_locks.entry_count() + self.booking_locks.entry_count()
    }

    /// Validate, conflict-check and insert a new `scheduled` booking.
    ///
    /// # Errors
    /// `InvalidInput` for malformed requests (no store access happens),
    /// `Conflict` if the window overlaps a reserving booking, `Store` if the
    /// schedule could not be read or written.
    pub async fn book(&self, request: &BookingRequest) -> Result<Booking> {
        let span = info_span!(
            parent: &self.span,
            "book",
            teacher_id = %request.teacher_id,
            date = %request.date,
            start = %request.start_time
        );
        async {
            let result = self.book_inner(request).await;
            log_outcome("book", &result);
            result
        }
        .instrument(span)
        .await
    }

    async fn book_inner(&self, request: &BookingRequest) -> Result<Booking> {
        let draft = request.validate(self.lesson_minutes)?;
        let candidate = draft.candidate();

        let _day = self
            .day_locks
            .lock((candidate.teacher_id.clone(), candidate.date))
            .await;

        let conflicts = self.checker.conflicts(&candidate).await?;
        if let Some(conflict) = conflicts.first() {
            return Err(conflict_error(&candidate, conflict));
        }

        let booking = self.store.insert_booking(draft).await?;
        info!(booking_id = %booking.id, window = %booking.window(), "Lesson booked");
        Ok(booking)
    }

    /// Read-only conflict check for a candidate given as raw strings.
    pub async fn check(
        &self,
        teacher_id: &str,
        date: &str,
        start_time: &str,
        end_time: &str,
    ) -> Result<bool> {
        let span = info_span!(parent: &self.span, "check", teacher_id = %teacher_id, date = %date);
        async {
            let result = match CandidateBooking::parse(teacher_id, date, start_time, end_time) {
                Ok(candidate) => self.checker.has_conflict(&candidate).await,
                Err(e) => Err(e),
            };
            log_outcome("check", &result);
            result
        }
        .instrument(span)
        .await
    }

    /// Propose a new date/time. The booking moves to `rescheduling` and keeps
    /// its current slot until the proposal is approved or rejected.
    ///
    /// When `end_time` is omitted the lesson keeps its current length.
    pub async fn request_reschedule(
        &self,
        id: &BookingId,
        date: &str,
        start_time: &str,
        end_time: Option<&str>,
        requested_by: Party,
    ) -> Result<Booking> {
        let span = info_span!(parent: &self.span, "request_reschedule", booking_id = %id);
        async {
            let result = self
                .request_reschedule_inner(id, date, start_time, end_time, requested_by)
                .await;
            log_outcome("request_reschedule", &result);
            result
        }
        .instrument(span)
        .await
    }

    async fn request_reschedule_inner(
        &self,
        id: &BookingId,
        date: &str,
        start_time: &str,
        end_time: Option<&str>,
        requested_by: Party,
    ) -> Result<Booking> {
        let date = time::parse_day(date)?;
        let start: WallTime = start_time.parse()?;

        let _booking_lock = self.booking_locks.lock(id.clone()).await;
        let mut booking = self.load(id).await?;
        let window = match end_time {
            Some(end) => LessonWindow::new(start, end.parse()?)?,
            None => LessonWindow::starting_at(start, booking.window().duration_minutes() as u32)?,
        };
        transition(&mut booking, BookingStatus::Rescheduling)?;

        let candidate = CandidateBooking {
            teacher_id: booking.teacher_id.clone(),
            date,
            window,
        };
        if self.checker.has_conflict_excluding(&candidate, id).await? {
            return Err(SchedulerError::Conflict(format!(
                "proposed {} {} is already taken",
                date, window
            )));
        }

        booking.set_proposal(&RescheduleProposal {
            date,
            window,
            requested_by,
        });
        self.store.update_booking(&booking).await?;
        info!(proposed_date = %date, proposed_window = %window, "Reschedule requested");
        Ok(booking)
    }

    /// Apply the pending proposal: the booking takes the proposed date/time and
    /// returns to `scheduled`. Fails with `Conflict`, leaving the proposal
    /// pending, if the proposed slot has been taken in the meantime.
    pub async fn approve_reschedule(&self, id: &BookingId) -> Result<Booking> {
        let span = info_span!(parent: &self.span, "approve_reschedule", booking_id = %id);
        async {
            let result = self.approve_reschedule_inner(id).await;
            log_outcome("approve_reschedule", &result);
            result
        }
        .instrument(span)
        .await
    }

    async fn approve_reschedule_inner(&self, id: &BookingId) -> Result<Booking> {
        let _booking_lock = self.booking_locks.lock(id.clone()).await;
        let mut booking = self.load(id).await?;
        if booking.status != BookingStatus::Rescheduling {
            return Err(invalid_transition(booking.status, BookingStatus::Scheduled));
        }
        let proposal = booking.proposal().ok_or_else(|| SchedulerError::Document {
            document: format!("bookings/{}", id),
            message: "rescheduling without a complete proposal".to_string(),
        })?;

        let _day = self
            .day_locks
            .lock((booking.teacher_id.clone(), proposal.date))
            .await;

        let candidate = CandidateBooking {
            teacher_id: booking.teacher_id.clone(),
            date: proposal.date,
            window: proposal.window,
        };
        if self.checker.has_conflict_excluding(&candidate, id).await? {
            return Err(SchedulerError::Conflict(format!(
                "proposed {} {} is no longer free",
                proposal.date, proposal.window
            )));
        }

        transition(&mut booking, BookingStatus::Scheduled)?;
        booking.date = proposal.date;
        booking.start_time = proposal.window.start;
        booking.end_time = proposal.window.end;
        booking.clear_proposal();
        self.store.update_booking(&booking).await?;
        info!(date = %booking.date, window = %booking.window(), "Reschedule approved");
        Ok(booking)
    }

    /// Drop the pending proposal and keep the original date/time.
    pub async fn reject_reschedule(&self, id: &BookingId) -> Result<Booking> {
        let span = info_span!(parent: &self.span, "reject_reschedule", booking_id = %id);
        async {
            let result = self.reject_reschedule_inner(id).await;
            log_outcome("reject_reschedule", &result);
            result
        }
        .instrument(span)
        .await
    }

    async fn reject_reschedule_inner(&self, id: &BookingId) -> Result<Booking> {
        let _booking_lock = self.booking_locks.lock(id.clone()).await;
        let mut booking = self.load(id).await?;
        if booking.status != BookingStatus::Rescheduling {
            return Err(invalid_transition(booking.status, BookingStatus::Scheduled));
        }
        transition(&mut booking, BookingStatus::Scheduled)?;
        booking.clear_proposal();
        self.store.update_booking(&booking).await?;
        info!("Reschedule rejected");
        Ok(booking)
    }

    /// Cancel by status write. The record is kept; its slot is released.
    pub async fn cancel(&self, id: &BookingId) -> Result<Booking> {
        self.finish(id, BookingStatus::Cancelled, "cancel").await
    }

    /// Mark a held lesson as taught.
    pub async fn complete(&self, id: &BookingId) -> Result<Booking> {
        self.finish(id, BookingStatus::Completed, "complete").await
    }

    async fn finish(
        &self,
        id: &BookingId,
        status: BookingStatus,
        operation: &'static str,
    ) -> Result<Booking> {
        let span = info_span!(parent: &self.span, "finish", operation, booking_id = %id);
        async {
            let result = self.finish_inner(id, status).await;
            log_outcome(operation, &result);
            result
        }
        .instrument(span)
        .await
    }

    async fn finish_inner(&self, id: &BookingId, status: BookingStatus) -> Result<Booking> {
        let _booking_lock = self.booking_locks.lock(id.clone()).await;
        let mut booking = self.load(id).await?;
        transition(&mut booking, status)?;
        booking.clear_proposal();
        self.store.update_booking(&booking).await?;
        info!(status = %status, "Booking closed");
        Ok(booking)
    }

    /// Administrative removal: deletes the record outright.
    pub async fn remove(&self, id: &BookingId) -> Result<()> {
        let span = info_span!(parent: &self.span, "remove", booking_id = %id);
        async {
            let _booking_lock = self.booking_locks.lock(id.clone()).await;
            let result = match self.store.delete_booking(id).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(SchedulerError::NotFound(id.to_string())),
                Err(e) => Err(e),
            };
            if result.is_ok() {
                warn!("Booking deleted");
            }
            log_outcome("remove", &result);
            result
        }
        .instrument(span)
        .await
    }

    /// Every booking of a teacher, ordered by date then start time.
    pub async fn bookings_for_teacher(&self, teacher_id: &str) -> Result<Vec<Booking>> {
        require_id("teacherId", teacher_id)?;
        self.store
            .find_bookings(&BookingQuery::new().teacher(teacher_id))
            .await
    }

    /// Every booking of a student, ordered by date then start time.
    pub async fn bookings_for_student(&self, student_id: &str) -> Result<Vec<Booking>> {
        require_id("studentId", student_id)?;
        self.store
            .find_bookings(&BookingQuery::new().student(student_id))
            .await
    }

    async fn load(&self, id: &BookingId) -> Result<Booking> {
        require_id("bookingId", id.as_str())?;
        self.store
            .get_booking(id)
            .await?
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))
    }
}

fn transition(booking: &mut Booking, next: BookingStatus) -> Result<()> {
    if !booking.status.can_transition_to(next) {
        return Err(invalid_transition(booking.status, next));
    }
    booking.status = next;
    Ok(())
}

fn invalid_transition(from: BookingStatus, to: BookingStatus) -> SchedulerError {
    SchedulerError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

fn conflict_error(candidate: &CandidateBooking, conflict: &Conflict) -> SchedulerError {
    SchedulerError::Conflict(format!(
        "{} {} overlaps booking {} ({}) by {} min",
        candidate.date,
        candidate.window,
        conflict.booking.id,
        conflict.booking.window(),
        conflict.overlap_minutes
    ))
}

fn log_outcome<T>(operation: &str, result: &Result<T>) {
    match result {
        Ok(_) => debug!(operation, "ok"),
        Err(e @ SchedulerError::Conflict(_)) => info!(operation, error = %e, "Rejected"),
        Err(e) if e.is_transient() => error!(operation, error = %e, "Store failure"),
        Err(e) => warn!(operation, error = %e, "Request refused"),
    }
}

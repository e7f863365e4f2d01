//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use lesson_scheduler::error::{Result, SchedulerError};
use lesson_scheduler::model::{BookingDraft, Party, RescheduleProposal};
use lesson_scheduler::{
    AvailabilityTemplate, AvailableSlotSet, Booking, BookingId, BookingQuery, BookingRequest,
    BookingStatus, LessonType, LessonWindow, MemoryStore, ScheduleStore,
};

pub fn day(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

pub fn window(start: &str, end: &str) -> LessonWindow {
    LessonWindow::new(start.parse().unwrap(), end.parse().unwrap()).unwrap()
}

pub fn request(teacher: &str, date: &str, start: &str, end: &str) -> BookingRequest {
    BookingRequest {
        teacher_id: teacher.to_string(),
        student_id: "student-1".to_string(),
        date: date.to_string(),
        start_time: start.to_string(),
        end_time: Some(end.to_string()),
        title: None,
        lesson_type: LessonType::Individual,
    }
}

/// A stored booking with the given status.
pub fn booking(id: &str, teacher: &str, date: &str, start: &str, end: &str, status: BookingStatus) -> Booking {
    let mut b = BookingDraft {
        teacher_id: teacher.to_string(),
        student_id: "student-1".to_string(),
        date: day(date),
        window: window(start, end),
        title: None,
        lesson_type: LessonType::Individual,
    }
    .into_booking(BookingId::new(id));
    b.status = status;
    b
}

pub fn scheduled(id: &str, teacher: &str, date: &str, start: &str, end: &str) -> Booking {
    booking(id, teacher, date, start, end, BookingStatus::Scheduled)
}

/// A booking in `rescheduling` with a pending proposal for
/// `(to_date, to_start, to_end)`.
pub fn rescheduling(
    id: &str,
    teacher: &str,
    date: &str,
    (start, end): (&str, &str),
    to_date: &str,
    (to_start, to_end): (&str, &str),
) -> Booking {
    let mut b = booking(id, teacher, date, start, end, BookingStatus::Rescheduling);
    b.set_proposal(&RescheduleProposal {
        date: day(to_date),
        window: window(to_start, to_end),
        requested_by: Party::Student,
    });
    b
}

/// Memory store seeded with the given bookings.
pub fn store_with(bookings: Vec<Booking>) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::from_snapshot(lesson_scheduler::StoreSnapshot {
        bookings,
        ..Default::default()
    }))
}

/// A store whose every call fails, as if the database were unreachable.
pub struct FailingStore;

fn unreachable_store<T>() -> Result<T> {
    Err(SchedulerError::Store("connection refused".to_string()))
}

#[async_trait]
impl ScheduleStore for FailingStore {
    async fn find_bookings(&self, _query: &BookingQuery) -> Result<Vec<Booking>> {
        unreachable_store()
    }

    async fn get_booking(&self, _id: &BookingId) -> Result<Option<Booking>> {
        unreachable_store()
    }

    async fn insert_booking(&self, _draft: BookingDraft) -> Result<Booking> {
        unreachable_store()
    }

    async fn update_booking(&self, _booking: &Booking) -> Result<()> {
        unreachable_store()
    }

    async fn delete_booking(&self, _id: &BookingId) -> Result<bool> {
        unreachable_store()
    }

    async fn availability_template(&self, _teacher_id: &str) -> Result<Option<AvailabilityTemplate>> {
        unreachable_store()
    }

    async fn set_availability_template(
        &self,
        _teacher_id: &str,
        _template: AvailabilityTemplate,
    ) -> Result<()> {
        unreachable_store()
    }

    async fn available_slots(&self, _teacher_id: &str) -> Result<Option<AvailableSlotSet>> {
        unreachable_store()
    }

    async fn set_available_slots(&self, _teacher_id: &str, _slots: AvailableSlotSet) -> Result<()> {
        unreachable_store()
    }
}

/// Delegates to a [`MemoryStore`], but the first `get_booking` call sleeps
/// before reading. Lets a test start a second writer while the first one is
/// between its read and its write.
pub struct SlowFirstRead {
    inner: Arc<MemoryStore>,
    delay: Duration,
    delayed: AtomicBool,
}

impl SlowFirstRead {
    pub fn new(inner: Arc<MemoryStore>, delay: Duration) -> Self {
        SlowFirstRead {
            inner,
            delay,
            delayed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ScheduleStore for SlowFirstRead {
    async fn find_bookings(&self, query: &BookingQuery) -> Result<Vec<Booking>> {
        self.inner.find_bookings(query).await
    }

    async fn get_booking(&self, id: &BookingId) -> Result<Option<Booking>> {
        if !self.delayed.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.get_booking(id).await
    }

    async fn insert_booking(&self, draft: BookingDraft) -> Result<Booking> {
        self.inner.insert_booking(draft).await
    }

    async fn update_booking(&self, booking: &Booking) -> Result<()> {
        self.inner.update_booking(booking).await
    }

    async fn delete_booking(&self, id: &BookingId) -> Result<bool> {
        self.inner.delete_booking(id).await
    }

    async fn availability_template(&self, teacher_id: &str) -> Result<Option<AvailabilityTemplate>> {
        self.inner.availability_template(teacher_id).await
    }

    async fn set_availability_template(
        &self,
        teacher_id: &str,
        template: AvailabilityTemplate,
    ) -> Result<()> {
        self.inner.set_availability_template(teacher_id, template).await
    }

    async fn available_slots(&self, teacher_id: &str) -> Result<Option<AvailableSlotSet>> {
        self.inner.available_slots(teacher_id).await
    }

    async fn set_available_slots(&self, teacher_id: &str, slots: AvailableSlotSet) -> Result<()> {
        self.inner.set_available_slots(teacher_id, slots).await
    }
}

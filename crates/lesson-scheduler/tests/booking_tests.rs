//! Tests for the booking lifecycle service.

mod common;

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{day, request, rescheduling, scheduled, store_with, FailingStore, SlowFirstRead};
use lesson_scheduler::error::{CONFLICT_MESSAGE, GENERIC_BOOKING_FAILURE};
use lesson_scheduler::{
    BookingId, BookingRequest, BookingService, BookingStatus, MemoryStore, Party, ScheduleStore,
    SchedulerConfig, SchedulerError, WallTime,
};

fn service(store: Arc<MemoryStore>) -> BookingService {
    BookingService::new(store, &SchedulerConfig::default()).unwrap()
}

fn t(s: &str) -> WallTime {
    s.parse().unwrap()
}

// ── Booking ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn booking_free_slot_is_persisted_as_scheduled() {
    let store = store_with(vec![]);
    let svc = service(store.clone());

    let booking = svc
        .book(&request("t1", "2026-03-16", "10:00", "11:00"))
        .await
        .unwrap();

    assert_eq!(booking.status, BookingStatus::Scheduled);
    assert_eq!(booking.date, day("2026-03-16"));
    let stored = store.get_booking(&booking.id).await.unwrap();
    assert_eq!(stored, Some(booking));
}

#[tokio::test]
async fn end_time_defaults_to_one_lesson_length() {
    let svc = service(store_with(vec![]));
    let mut req = request("t1", "2026-03-16", "10:00", "unused");
    req.end_time = None;

    let booking = svc.book(&req).await.unwrap();
    assert_eq!(booking.end_time, t("11:00"));
}

#[tokio::test]
async fn overlapping_request_is_rejected_and_not_written() {
    let store = store_with(vec![scheduled("b1", "t1", "2026-03-16", "09:00", "10:00")]);
    let svc = service(store.clone());

    let err = svc
        .book(&request("t1", "2026-03-16", "09:30", "10:30"))
        .await
        .unwrap_err();

    assert!(matches!(err, SchedulerError::Conflict(_)));
    assert_eq!(err.user_message(), CONFLICT_MESSAGE);
    assert_eq!(store.snapshot().await.bookings.len(), 1);
}

#[tokio::test]
async fn adjacent_request_is_accepted() {
    let store = store_with(vec![scheduled("b1", "t1", "2026-03-16", "09:00", "10:00")]);
    let svc = service(store);
    assert!(svc
        .book(&request("t1", "2026-03-16", "10:00", "11:00"))
        .await
        .is_ok());
}

#[tokio::test]
async fn invalid_requests_fail_without_touching_the_store() {
    // A failing store proves validation happens first: the error is
    // InvalidInput, not Store.
    let svc = BookingService::new(Arc::new(FailingStore), &SchedulerConfig::default()).unwrap();

    let cases = [
        request("", "2026-03-16", "10:00", "11:00"),
        request("t1", "2026-13-01", "10:00", "11:00"),
        request("t1", "2026-03-16", "10:00", "10:00"),
        request("t1", "2026-03-16", "7:00", "08:00"),
        BookingRequest {
            student_id: " ".to_string(),
            ..request("t1", "2026-03-16", "10:00", "11:00")
        },
    ];
    for req in &cases {
        let err = svc.book(req).await.unwrap_err();
        assert!(
            matches!(err, SchedulerError::InvalidInput(_)),
            "{:?} should be invalid input, got {:?}",
            req,
            err
        );
    }
}

#[tokio::test]
async fn store_failure_blocks_booking() {
    let svc = BookingService::new(Arc::new(FailingStore), &SchedulerConfig::default()).unwrap();
    let err = svc
        .book(&request("t1", "2026-03-16", "10:00", "11:00"))
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.user_message(), GENERIC_BOOKING_FAILURE);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overlapping_requests_book_exactly_once() {
    let store = store_with(vec![]);
    let svc = Arc::new(service(store.clone()));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let svc = Arc::clone(&svc);
            // Alternate between two overlapping windows.
            let (start, end) = if i % 2 == 0 { ("10:00", "11:00") } else { ("10:30", "11:30") };
            tokio::spawn(async move { svc.book(&request("t1", "2026-03-16", start, end)).await })
        })
        .collect();

    let mut booked = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => booked += 1,
            Err(SchedulerError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(booked, 1);
    assert_eq!(conflicts, 15);
    assert_eq!(store.snapshot().await.bookings.len(), 1);
    assert_eq!(svc.held_locks(), 0);
}

#[tokio::test]
async fn check_reports_without_writing() {
    let store = store_with(vec![scheduled("b1", "t1", "2026-03-16", "09:00", "12:00")]);
    let svc = service(store.clone());

    assert!(svc.check("t1", "2026-03-16", "10:00", "11:00").await.unwrap());
    assert!(!svc.check("t1", "2026-03-17", "10:00", "11:00").await.unwrap());
    assert!(svc.check("t1", "2026-03-16", "11:00", "10:00").await.is_err());
    assert_eq!(store.snapshot().await.bookings.len(), 1);
}

// ── Rescheduling ────────────────────────────────────────────────────────────

#[tokio::test]
async fn reschedule_keeps_original_slot_until_approved() {
    let store = store_with(vec![scheduled("b1", "t1", "2026-03-16", "10:00", "11:00")]);
    let svc = service(store.clone());
    let id = BookingId::new("b1");

    let pending = svc
        .request_reschedule(&id, "2026-03-18", "14:00", None, Party::Student)
        .await
        .unwrap();
    assert_eq!(pending.status, BookingStatus::Rescheduling);
    assert_eq!(pending.requested_date, Some(day("2026-03-18")));
    assert_eq!(pending.requested_end_time, Some(t("15:00")));

    // Original slot still held.
    assert!(svc.check("t1", "2026-03-16", "10:00", "11:00").await.unwrap());

    let approved = svc.approve_reschedule(&id).await.unwrap();
    assert_eq!(approved.status, BookingStatus::Scheduled);
    assert_eq!(approved.date, day("2026-03-18"));
    assert_eq!(approved.start_time, t("14:00"));
    assert_eq!(approved.end_time, t("15:00"));
    assert!(approved.proposal().is_none());

    // Old slot released, new one held.
    assert!(!svc.check("t1", "2026-03-16", "10:00", "11:00").await.unwrap());
    assert!(svc.check("t1", "2026-03-18", "14:00", "15:00").await.unwrap());
}

#[tokio::test]
async fn rejected_reschedule_restores_original() {
    let store = store_with(vec![scheduled("b1", "t1", "2026-03-16", "10:00", "11:00")]);
    let svc = service(store.clone());
    let id = BookingId::new("b1");

    svc.request_reschedule(&id, "2026-03-18", "14:00", Some("15:30"), Party::Teacher)
        .await
        .unwrap();
    let rejected = svc.reject_reschedule(&id).await.unwrap();

    assert_eq!(rejected.status, BookingStatus::Scheduled);
    assert_eq!(rejected.date, day("2026-03-16"));
    assert_eq!(rejected.start_time, t("10:00"));
    assert!(rejected.requested_date.is_none());
    assert!(rejected.requested_by.is_none());
    assert_eq!(store.get_booking(&id).await.unwrap(), Some(rejected));
}

#[tokio::test]
async fn reschedule_may_overlap_its_own_slot() {
    let store = store_with(vec![scheduled("b1", "t1", "2026-03-16", "10:00", "11:00")]);
    let svc = service(store);
    let id = BookingId::new("b1");

    svc.request_reschedule(&id, "2026-03-16", "10:30", None, Party::Teacher)
        .await
        .unwrap();
    let moved = svc.approve_reschedule(&id).await.unwrap();
    assert_eq!(moved.start_time, t("10:30"));
    assert_eq!(moved.end_time, t("11:30"));
}

#[tokio::test]
async fn reschedule_onto_taken_slot_is_rejected() {
    let store = store_with(vec![
        scheduled("b1", "t1", "2026-03-16", "10:00", "11:00"),
        scheduled("b2", "t1", "2026-03-18", "14:00", "15:00"),
    ]);
    let svc = service(store);

    let err = svc
        .request_reschedule(&BookingId::new("b1"), "2026-03-18", "14:30", None, Party::Student)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Conflict(_)));
}

#[tokio::test]
async fn approval_rechecks_a_slot_taken_after_the_request() {
    let store = store_with(vec![scheduled("b1", "t1", "2026-03-16", "10:00", "11:00")]);
    let svc = service(store.clone());
    let id = BookingId::new("b1");

    svc.request_reschedule(&id, "2026-03-18", "14:00", None, Party::Student)
        .await
        .unwrap();
    svc.book(&request("t1", "2026-03-18", "14:00", "15:00"))
        .await
        .unwrap();

    let err = svc.approve_reschedule(&id).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Conflict(_)));
    let still_pending = store.get_booking(&id).await.unwrap().unwrap();
    assert_eq!(still_pending.status, BookingStatus::Rescheduling);
}

#[tokio::test]
async fn approving_without_a_pending_request_is_invalid() {
    let store = store_with(vec![scheduled("b1", "t1", "2026-03-16", "10:00", "11:00")]);
    let svc = service(store);
    let err = svc.approve_reschedule(&BookingId::new("b1")).await.unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidTransition { .. }));
}

// ── Cancel / complete / remove ──────────────────────────────────────────────

#[tokio::test]
async fn cancel_releases_slot_and_keeps_record() {
    let store = store_with(vec![scheduled("b1", "t1", "2026-03-16", "10:00", "11:00")]);
    let svc = service(store.clone());
    let id = BookingId::new("b1");

    let cancelled = svc.cancel(&id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert!(store.get_booking(&id).await.unwrap().is_some());
    assert!(svc
        .book(&request("t1", "2026-03-16", "10:00", "11:00"))
        .await
        .is_ok());
}

#[tokio::test]
async fn terminal_statuses_cannot_change() {
    let store = store_with(vec![scheduled("b1", "t1", "2026-03-16", "10:00", "11:00")]);
    let svc = service(store);
    let id = BookingId::new("b1");

    svc.complete(&id).await.unwrap();
    assert!(matches!(
        svc.cancel(&id).await,
        Err(SchedulerError::InvalidTransition { .. })
    ));
    assert!(matches!(
        svc.request_reschedule(&id, "2026-03-18", "10:00", None, Party::Student)
            .await,
        Err(SchedulerError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn pending_reschedule_can_be_cancelled() {
    let store = store_with(vec![scheduled("b1", "t1", "2026-03-16", "10:00", "11:00")]);
    let svc = service(store);
    let id = BookingId::new("b1");

    svc.request_reschedule(&id, "2026-03-18", "10:00", None, Party::Student)
        .await
        .unwrap();
    let cancelled = svc.cancel(&id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert!(cancelled.proposal().is_none());
}

#[tokio::test]
async fn remove_deletes_and_reports_missing() {
    let store = store_with(vec![scheduled("b1", "t1", "2026-03-16", "10:00", "11:00")]);
    let svc = service(store.clone());
    let id = BookingId::new("b1");

    svc.remove(&id).await.unwrap();
    assert!(store.get_booking(&id).await.unwrap().is_none());
    assert!(matches!(svc.remove(&id).await, Err(SchedulerError::NotFound(_))));
}

#[tokio::test]
async fn listings_are_ordered_by_date_then_start() {
    let store = store_with(vec![
        scheduled("b3", "t1", "2026-03-17", "09:00", "10:00"),
        scheduled("b1", "t1", "2026-03-16", "14:00", "15:00"),
        scheduled("b2", "t1", "2026-03-16", "09:00", "10:00"),
        scheduled("b4", "t2", "2026-03-16", "09:00", "10:00"),
    ]);
    let svc = service(store);

    let ids: Vec<String> = svc
        .bookings_for_teacher("t1")
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.id.to_string())
        .collect();
    assert_eq!(ids, vec!["b2", "b1", "b3"]);

    assert_eq!(svc.bookings_for_student("student-1").await.unwrap().len(), 4);
    assert!(svc.bookings_for_student("").await.is_err());
}

// ── Concurrent lifecycle writes ─────────────────────────────────────────────

/// `b1` on the 16th at 10:00 with a pending move to the 18th at 14:00.
fn pending_move() -> Arc<MemoryStore> {
    store_with(vec![rescheduling(
        "b1",
        "t1",
        "2026-03-16",
        ("10:00", "11:00"),
        "2026-03-18",
        ("14:00", "15:00"),
    )])
}

fn slow_service(store: Arc<MemoryStore>) -> Arc<BookingService> {
    let slow = SlowFirstRead::new(store, Duration::from_millis(100));
    Arc::new(BookingService::new(Arc::new(slow), &SchedulerConfig::default()).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_during_approval_is_not_overwritten() {
    let store = pending_move();
    let svc = slow_service(store.clone());
    let id = BookingId::new("b1");

    // Approval reads first (slowly); cancel arrives while it is mid-flight.
    let approving = {
        let svc = Arc::clone(&svc);
        let id = id.clone();
        tokio::spawn(async move { svc.approve_reschedule(&id).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let cancelled = svc.cancel(&id).await;

    assert!(approving.await.unwrap().is_ok());
    assert_eq!(cancelled.unwrap().status, BookingStatus::Cancelled);

    let stored = store.get_booking(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Cancelled);
    assert!(!svc.check("t1", "2026-03-18", "14:00", "15:00").await.unwrap());
    assert!(!svc.check("t1", "2026-03-16", "10:00", "11:00").await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn approval_during_cancel_sees_the_cancellation() {
    let store = pending_move();
    let svc = slow_service(store.clone());
    let id = BookingId::new("b1");

    let cancelling = {
        let svc = Arc::clone(&svc);
        let id = id.clone();
        tokio::spawn(async move { svc.cancel(&id).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let approved = svc.approve_reschedule(&id).await;

    assert!(cancelling.await.unwrap().is_ok());
    assert!(matches!(
        approved,
        Err(SchedulerError::InvalidTransition { .. })
    ));
    let stored = store.get_booking(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Cancelled);
    assert_eq!(stored.date, day("2026-03-16"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_apply_once() {
    let store = pending_move();
    let svc = Arc::new(service(store.clone()));
    let id = BookingId::new("b1");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let svc = Arc::clone(&svc);
            let id = id.clone();
            tokio::spawn(async move { svc.approve_reschedule(&id).await })
        })
        .collect();

    let mut approved = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => approved += 1,
            Err(SchedulerError::InvalidTransition { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(approved, 1);
    let stored = store.get_booking(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Scheduled);
    assert_eq!(stored.date, day("2026-03-18"));
    assert_eq!(svc.held_locks(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn approval_and_new_booking_cannot_both_take_the_target_slot() {
    let store = pending_move();
    let svc = Arc::new(service(store.clone()));

    let approving = {
        let svc = Arc::clone(&svc);
        tokio::spawn(async move { svc.approve_reschedule(&BookingId::new("b1")).await })
    };
    let booking = {
        let svc = Arc::clone(&svc);
        tokio::spawn(async move {
            svc.book(&request("t1", "2026-03-18", "14:30", "15:30"))
                .await
        })
    };
    let approved = approving.await.unwrap();
    let booked = booking.await.unwrap();

    match (&approved, &booked) {
        (Ok(_), Err(SchedulerError::Conflict(_))) | (Err(SchedulerError::Conflict(_)), Ok(_)) => {}
        other => panic!("exactly one writer should win: {:?}", other),
    }

    let on_target = store
        .find_bookings(&lesson_scheduler::BookingQuery::reserving().teacher("t1").on(day("2026-03-18")))
        .await
        .unwrap();
    assert_eq!(on_target.len(), 1);
}

#[tokio::test]
async fn locks_are_released_after_each_operation() {
    let svc = service(store_with(vec![]));

    for i in 1..=28 {
        let date = format!("2026-02-{:02}", i);
        let booking = svc
            .book(&request("t1", &date, "10:00", "11:00"))
            .await
            .unwrap();
        svc.cancel(&booking.id).await.unwrap();
    }
    let _ = svc.cancel(&BookingId::new("missing")).await;

    assert_eq!(svc.held_locks(), 0);
}

// ── Logging ─────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn events_are_logged_inside_the_injected_span() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let svc = service(store_with(vec![])).with_span(tracing::info_span!("tenant", name = "acme"));
    svc.book(&request("t1", "2026-03-16", "10:00", "11:00"))
        .await
        .unwrap();
    let _ = svc.book(&request("t1", "2026-03-16", "10:30", "11:30")).await;

    let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("Lesson booked"), "output: {}", output);
    assert!(output.contains("Rejected"), "output: {}", output);
    assert!(output.contains("tenant{name=\"acme\"}"), "output: {}", output);
}

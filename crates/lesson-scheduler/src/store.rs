//! Storage port for the scheduling core, plus an in-memory implementation.
//!
//! The trait mirrors the three document collections the core touches:
//! `bookings`, `teacherAvailability/{teacherId}` and `availableSlots/{teacherId}`.
//! A missing availability document is `Ok(None)`, never an error.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::conflict;
use crate::error::{Result, SchedulerError};
use crate::model::{
    AvailabilityTemplate, AvailableSlotSet, Booking, BookingDraft, BookingId, BookingStatus,
};

/// Equality filters over the `bookings` collection. Empty filters match all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingQuery {
    pub teacher_id: Option<String>,
    pub student_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub statuses: Vec<BookingStatus>,
}

impl BookingQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bookings that currently hold their slot.
    pub fn reserving() -> Self {
        BookingQuery {
            statuses: BookingStatus::RESERVING.to_vec(),
            ..Self::default()
        }
    }

    pub fn teacher(mut self, teacher_id: &str) -> Self {
        self.teacher_id = Some(teacher_id.to_string());
        self
    }

    pub fn student(mut self, student_id: &str) -> Self {
        self.student_id = Some(student_id.to_string());
        self
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        self.teacher_id.as_ref().is_none_or(|t| &booking.teacher_id == t)
            && self.student_id.as_ref().is_none_or(|s| &booking.student_id == s)
            && self.date.is_none_or(|d| booking.date == d)
            && (self.statuses.is_empty() || self.statuses.contains(&booking.status))
    }
}

/// Async access to the external document store.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Bookings matching `query`, ordered by `date` then `startTime`.
    async fn find_bookings(&self, query: &BookingQuery) -> Result<Vec<Booking>>;

    async fn get_booking(&self, id: &BookingId) -> Result<Option<Booking>>;

    /// Insert a new booking; the store assigns its id.
    async fn insert_booking(&self, draft: BookingDraft) -> Result<Booking>;

    /// Overwrite an existing booking. `NotFound` if it does not exist.
    async fn update_booking(&self, booking: &Booking) -> Result<()>;

    /// Delete a booking. Returns whether it existed.
    async fn delete_booking(&self, id: &BookingId) -> Result<bool>;

    async fn availability_template(&self, teacher_id: &str) -> Result<Option<AvailabilityTemplate>>;

    async fn set_availability_template(
        &self,
        teacher_id: &str,
        template: AvailabilityTemplate,
    ) -> Result<()>;

    async fn available_slots(&self, teacher_id: &str) -> Result<Option<AvailableSlotSet>>;

    /// Replace the teacher's slot set wholesale.
    async fn set_available_slots(&self, teacher_id: &str, slots: AvailableSlotSet) -> Result<()>;
}

/// Serializable image of a whole store, used for fixtures and the CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    #[serde(default)]
    pub bookings: Vec<Booking>,
    #[serde(default)]
    pub teacher_availability: BTreeMap<String, AvailabilityTemplate>,
    #[serde(default)]
    pub available_slots: BTreeMap<String, AvailableSlotSet>,
}

impl StoreSnapshot {
    /// Parse and validate a JSON snapshot.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: StoreSnapshot =
            serde_json::from_str(json).map_err(|e| SchedulerError::Document {
                document: "snapshot".to_string(),
                message: e.to_string(),
            })?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Per-document checks, plus the collection-wide ones: booking ids are
    /// unique, and no two reserving bookings of a teacher overlap.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for booking in &self.bookings {
            booking.validate()?;
            if !seen.insert(&booking.id) {
                return Err(SchedulerError::Document {
                    document: format!("bookings/{}", booking.id),
                    message: "duplicate booking id".to_string(),
                });
            }
        }

        let mut reserving: Vec<&Booking> =
            self.bookings.iter().filter(|b| b.status.is_reserving()).collect();
        reserving.sort_by(|a, b| {
            (&a.teacher_id, a.date, a.start_time).cmp(&(&b.teacher_id, b.date, b.start_time))
        });
        for pair in reserving.windows(2) {
            let (earlier, later) = (pair[0], pair[1]);
            if earlier.teacher_id == later.teacher_id
                && earlier.date == later.date
                && conflict::overlaps(&earlier.window(), &later.window())
            {
                return Err(SchedulerError::Document {
                    document: format!("bookings/{}", later.id),
                    message: format!("overlaps booking {}", earlier.id),
                });
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| SchedulerError::Document {
            document: "snapshot".to_string(),
            message: e.to_string(),
        })
    }
}

#[derive(Default)]
struct MemoryState {
    bookings: HashMap<BookingId, Booking>,
    templates: HashMap<String, AvailabilityTemplate>,
    slot_sets: HashMap<String, AvailableSlotSet>,
}

/// In-process [`ScheduleStore`] backed by a `tokio` read-write lock.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let state = MemoryState {
            bookings: snapshot
                .bookings
                .into_iter()
                .map(|b| (b.id.clone(), b))
                .collect(),
            templates: snapshot.teacher_availability.into_iter().collect(),
            slot_sets: snapshot.available_slots.into_iter().collect(),
        };
        MemoryStore {
            state: RwLock::new(state),
        }
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read().await;
        let mut bookings: Vec<Booking> = state.bookings.values().cloned().collect();
        sort_bookings(&mut bookings);
        StoreSnapshot {
            bookings,
            teacher_availability: state
                .templates
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            available_slots: state
                .slot_sets
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

fn sort_bookings(bookings: &mut [Booking]) {
    bookings.sort_by(|a, b| {
        (a.date, a.start_time, &a.id).cmp(&(b.date, b.start_time, &b.id))
    });
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn find_bookings(&self, query: &BookingQuery) -> Result<Vec<Booking>> {
        let state = self.state.read().await;
        let mut found: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| query.matches(b))
            .cloned()
            .collect();
        sort_bookings(&mut found);
        Ok(found)
    }

    async fn get_booking(&self, id: &BookingId) -> Result<Option<Booking>> {
        Ok(self.state.read().await.bookings.get(id).cloned())
    }

    async fn insert_booking(&self, draft: BookingDraft) -> Result<Booking> {
        let booking = draft.into_booking(BookingId::generate());
        self.state
            .write()
            .await
            .bookings
            .insert(booking.id.clone(), booking.clone());
        Ok(booking)
    }

    async fn update_booking(&self, booking: &Booking) -> Result<()> {
        let mut state = self.state.write().await;
        match state.bookings.get_mut(&booking.id) {
            Some(slot) => {
                *slot = booking.clone();
                Ok(())
            }
            None => Err(SchedulerError::NotFound(booking.id.to_string())),
        }
    }

    async fn delete_booking(&self, id: &BookingId) -> Result<bool> {
        Ok(self.state.write().await.bookings.remove(id).is_some())
    }

    async fn availability_template(&self, teacher_id: &str) -> Result<Option<AvailabilityTemplate>> {
        Ok(self.state.read().await.templates.get(teacher_id).cloned())
    }

    async fn set_availability_template(
        &self,
        teacher_id: &str,
        template: AvailabilityTemplate,
    ) -> Result<()> {
        self.state
            .write()
            .await
            .templates
            .insert(teacher_id.to_string(), template);
        Ok(())
    }

    async fn available_slots(&self, teacher_id: &str) -> Result<Option<AvailableSlotSet>> {
        Ok(self.state.read().await.slot_sets.get(teacher_id).cloned())
    }

    async fn set_available_slots(&self, teacher_id: &str, slots: AvailableSlotSet) -> Result<()> {
        self.state
            .write()
            .await
            .slot_sets
            .insert(teacher_id.to_string(), slots);
        Ok(())
    }
}

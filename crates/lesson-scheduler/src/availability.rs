//! Availability resolution: which lesson slots a teacher can be booked for.
//!
//! Combines the two availability sources a teacher can declare (an explicit
//! slot set of absolute intervals, and a recurring weekly template) with the
//! bookings already holding time. All day comparisons go through one
//! [`DayBoundary`], so slot days and booking days are bucketed identically.
//!
//! Missing availability documents are empty availability, not errors. Store
//! failures propagate unchanged; nothing here retries.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{Duration, NaiveDate};

use crate::config::{BusinessHours, SchedulerConfig};
use crate::conflict;
use crate::error::Result;
use crate::expander;
use crate::freebusy;
use crate::model::{Booking, DayAvailability, TimeSlot};
use crate::store::{BookingQuery, ScheduleStore};
use crate::time::{DayBoundary, LessonWindow};

pub struct AvailabilityResolver {
    store: Arc<dyn ScheduleStore>,
    days: DayBoundary,
    business_hours: BusinessHours,
    lesson_minutes: u32,
}

impl AvailabilityResolver {
    pub fn new(store: Arc<dyn ScheduleStore>, config: &SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(AvailabilityResolver {
            store,
            days: config.day_boundary()?,
            business_hours: config.business_hours,
            lesson_minutes: config.lesson_minutes,
        })
    }

    pub fn day_boundary(&self) -> DayBoundary {
        self.days
    }

    /// Distinct days that hold at least one slot of the teacher's slot set.
    pub async fn available_dates(&self, teacher_id: &str) -> Result<BTreeSet<NaiveDate>> {
        let Some(set) = self.store.available_slots(teacher_id).await? else {
            return Ok(BTreeSet::new());
        };
        Ok(set.slots.iter().map(|s| self.days.day_of(&s.start)).collect())
    }

    /// Slots from the teacher's slot set falling on any of `dates`, sorted by
    /// start. Booked time is not subtracted; see [`open_slots`](Self::open_slots).
    pub async fn available_slots(
        &self,
        teacher_id: &str,
        dates: &[NaiveDate],
    ) -> Result<Vec<TimeSlot>> {
        let Some(set) = self.store.available_slots(teacher_id).await? else {
            return Ok(Vec::new());
        };
        let wanted: HashSet<NaiveDate> = dates.iter().copied().collect();
        let mut slots: Vec<TimeSlot> = set
            .slots
            .into_iter()
            .filter(|s| wanted.contains(&self.days.day_of(&s.start)))
            .collect();
        slots.sort();
        slots.dedup();
        Ok(slots)
    }

    /// [`available_slots`](Self::available_slots) minus any slot that
    /// overlaps a reserving booking of the same teacher.
    pub async fn open_slots(&self, teacher_id: &str, dates: &[NaiveDate]) -> Result<Vec<TimeSlot>> {
        let slots = self.available_slots(teacher_id, dates).await?;
        if slots.is_empty() {
            return Ok(slots);
        }
        let booked = self.booked_slots(teacher_id, &self.days_touched(&slots)).await?;
        Ok(slots
            .into_iter()
            .filter(|slot| !booked.iter().any(|b| b.overlaps(slot)))
            .collect())
    }

    /// Lesson slots on `date` generated from the weekly template, excluding
    /// time held by reserving bookings.
    ///
    /// A range day is cut into back-to-back lessons within each free gap; a
    /// list day offers one lesson per listed start time that does not collide.
    pub async fn template_slots(&self, teacher_id: &str, date: NaiveDate) -> Result<Vec<TimeSlot>> {
        let Some(template) = self.store.availability_template(teacher_id).await? else {
            return Ok(Vec::new());
        };
        let Some(day) = template.day(self.days.weekday(date)) else {
            return Ok(Vec::new());
        };

        let booked: Vec<LessonWindow> = self
            .reserving_bookings(Some(teacher_id), date)
            .await?
            .iter()
            .map(Booking::window)
            .collect();

        let lessons = match day {
            DayAvailability::Range { start, end } => match LessonWindow::new(*start, *end) {
                Ok(range) => freebusy::fill_lessons(
                    &freebusy::free_windows(&booked, &range),
                    self.lesson_minutes,
                ),
                Err(_) => Vec::new(),
            },
            DayAvailability::Times(times) => times
                .iter()
                .filter_map(|t| LessonWindow::starting_at(*t, self.lesson_minutes).ok())
                .filter(|w| !booked.iter().any(|b| conflict::overlaps(b, w)))
                .collect(),
        };

        let mut slots: Vec<TimeSlot> = lessons
            .iter()
            .filter_map(|w| self.days.slot(date, w))
            .collect();
        slots.sort();
        slots.dedup();
        Ok(slots)
    }

    /// Days in `[from, until]` on which the weekly template is open.
    pub async fn template_dates(
        &self,
        teacher_id: &str,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<NaiveDate>> {
        match self.store.availability_template(teacher_id).await? {
            Some(template) => expander::expand_open_days(&template, from, until),
            None => Ok(Vec::new()),
        }
    }

    /// Open template days in the Monday-based week containing `day`.
    pub async fn template_week(&self, teacher_id: &str, day: NaiveDate) -> Result<Vec<NaiveDate>> {
        let (monday, sunday) = expander::week_of(day);
        self.template_dates(teacher_id, monday, sunday).await
    }

    /// Hour-granularity mode for a single-teacher deployment: business hours
    /// on `date` not taken by any reserving booking's start hour.
    pub async fn available_hours(&self, date: NaiveDate) -> Result<Vec<u32>> {
        let bookings = self.reserving_bookings(None, date).await?;
        Ok(self.free_hours(&bookings))
    }

    /// [`available_hours`](Self::available_hours) scoped to one teacher.
    pub async fn available_hours_for(&self, teacher_id: &str, date: NaiveDate) -> Result<Vec<u32>> {
        let bookings = self.reserving_bookings(Some(teacher_id), date).await?;
        Ok(self.free_hours(&bookings))
    }

    fn free_hours(&self, bookings: &[Booking]) -> Vec<u32> {
        let taken: HashSet<u32> = bookings.iter().map(|b| b.start_time.hour()).collect();
        self.business_hours
            .hours()
            .filter(|h| !taken.contains(h))
            .collect()
    }

    async fn reserving_bookings(
        &self,
        teacher_id: Option<&str>,
        date: NaiveDate,
    ) -> Result<Vec<Booking>> {
        let mut query = BookingQuery::reserving().on(date);
        if let Some(teacher_id) = teacher_id {
            query = query.teacher(teacher_id);
        }
        self.store.find_bookings(&query).await
    }

    /// Every day a slot covers, so a slot running past midnight is checked
    /// against the next day's bookings too.
    fn days_touched(&self, slots: &[TimeSlot]) -> BTreeSet<NaiveDate> {
        let mut days = BTreeSet::new();
        for slot in slots {
            let mut day = self.days.day_of(&slot.start);
            // The end instant is exclusive.
            let last = self.days.day_of(&(slot.end - Duration::nanoseconds(1)));
            while day <= last {
                days.insert(day);
                match day.succ_opt() {
                    Some(next) => day = next,
                    None => break,
                }
            }
        }
        days
    }

    async fn booked_slots(
        &self,
        teacher_id: &str,
        days: &BTreeSet<NaiveDate>,
    ) -> Result<Vec<TimeSlot>> {
        let mut booked = Vec::new();
        for &date in days {
            for booking in self.reserving_bookings(Some(teacher_id), date).await? {
                if let Some(slot) = self.days.slot(booking.date, &booking.window()) {
                    booked.push(slot);
                }
            }
        }
        Ok(booked)
    }
}

/// Result of toggling a date in a [`DateSelection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionChange {
    Added,
    Removed,
    /// The selection was already full; nothing changed.
    Ignored,
}

/// A student's pick of lesson dates, capped at the plan's sessions per week.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateSelection {
    limit: usize,
    selected: BTreeSet<NaiveDate>,
}

impl DateSelection {
    pub fn new(sessions_per_week: usize) -> Self {
        DateSelection {
            limit: sessions_per_week,
            selected: BTreeSet::new(),
        }
    }

    /// Select `date`, or deselect it if already selected. Selecting past the
    /// limit is silently ignored.
    pub fn toggle(&mut self, date: NaiveDate) -> SelectionChange {
        if self.selected.remove(&date) {
            SelectionChange::Removed
        } else if self.selected.len() >= self.limit {
            SelectionChange::Ignored
        } else {
            self.selected.insert(date);
            SelectionChange::Added
        }
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.selected.iter().copied().collect()
    }

    pub fn is_full(&self) -> bool {
        self.selected.len() >= self.limit
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

//! # lesson-scheduler
//!
//! Lesson scheduling core for a tutoring platform: slot availability and
//! conflict detection over a teacher's bookings.
//!
//! Storage is external. The core reads and writes through the async
//! [`ScheduleStore`] trait and keeps no state of its own between calls.
//!
//! ## Modules
//!
//! - [`availability`]: Bookable dates and slots from slot sets and weekly templates
//! - [`conflict`]: Half-open overlap detection against existing bookings
//! - [`booking`]: Booking lifecycle service (book, reschedule, cancel) with per-day and per-booking locking
//! - [`freebusy`]: Free wall-clock windows inside an open range
//! - [`expander`]: Weekly template → concrete open days (RFC 5545 rules)
//! - [`time`]: `HH:MM` / `YYYY-MM-DD` parsing and the day-bucketing timezone policy
//! - [`dst`]: DST transition policies (skip, shift, etc.)
//! - [`model`]: Typed document schemas (bookings, templates, slot sets)
//! - [`store`]: Storage trait and in-memory implementation
//! - [`config`]: TOML configuration
//! - [`locks`]: Keyed async mutexes that clean up after themselves
//! - [`error`]: Error types

pub mod availability;
pub mod booking;
pub mod config;
pub mod conflict;
pub mod dst;
pub mod error;
pub mod expander;
pub mod freebusy;
pub mod locks;
pub mod model;
pub mod store;
pub mod time;

pub use availability::{AvailabilityResolver, DateSelection, SelectionChange};
pub use booking::BookingService;
pub use config::SchedulerConfig;
pub use conflict::{find_conflicts, overlaps, Conflict, ConflictChecker};
pub use error::SchedulerError;
pub use model::{
    AvailabilityTemplate, AvailableSlotSet, Booking, BookingId, BookingRequest, BookingStatus,
    CandidateBooking, DayAvailability, LessonType, Party, TimeSlot,
};
pub use store::{BookingQuery, MemoryStore, ScheduleStore, StoreSnapshot};
pub use time::{DayBoundary, LessonWindow, WallTime};

//! Error types for lesson-scheduler operations.

use thiserror::Error;

/// Shown to users for any failure other than a scheduling conflict.
pub const GENERIC_BOOKING_FAILURE: &str = "could not complete booking, please try again";

/// Shown to users when the requested time overlaps an existing lesson.
pub const CONFLICT_MESSAGE: &str = "scheduling conflict";

#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Caller supplied a malformed identifier, date, time or interval.
    /// Raised before the store is queried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A stored document did not match its schema.
    #[error("Malformed document {document}: {message}")]
    Document { document: String, message: String },

    /// The store could not be reached or the query failed.
    #[error("Store error: {0}")]
    Store(String),

    /// The candidate booking overlaps an existing reserving booking.
    #[error("Scheduling conflict: {0}")]
    Conflict(String),

    #[error("Booking not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SchedulerError {
    /// The message a booking UI should display for this error.
    pub fn user_message(&self) -> &'static str {
        match self {
            SchedulerError::Conflict(_) => CONFLICT_MESSAGE,
            _ => GENERIC_BOOKING_FAILURE,
        }
    }

    /// True for failures of the backing store, as opposed to caller mistakes.
    pub fn is_transient(&self) -> bool {
        matches!(self, SchedulerError::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

//! Weekly template expansion: turns a teacher's open weekdays into the
//! concrete calendar days they are bookable on.
//!
//! Builds an RFC 5545 `FREQ=WEEKLY;BYDAY=...` rule from the template and lets
//! the `rrule` crate enumerate it, so week boundaries and leap days follow the
//! standard rather than ad-hoc date arithmetic.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rrule::RRuleSet;

use crate::error::{Result, SchedulerError};
use crate::model::AvailabilityTemplate;

/// Upper bound on expanded days, matching the `rrule` crate's `u16` limit.
const MAX_EXPANSION: u16 = 1000;

fn byday(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

/// The weekly recurrence rule for a template, e.g. `"FREQ=WEEKLY;BYDAY=MO,WE"`.
///
/// `None` when no weekday is open.
pub fn weekly_rule(template: &AvailabilityTemplate) -> Option<String> {
    let days: Vec<&str> = template.open_weekdays().into_iter().map(byday).collect();
    if days.is_empty() {
        return None;
    }
    Some(format!("FREQ=WEEKLY;BYDAY={}", days.join(",")))
}

/// Every day in `[from, until]` whose weekday is open in `template`.
///
/// Days are calendar days; the expansion runs in UTC at noon so no timezone
/// transition can move an instance onto a neighbouring day.
///
/// # Errors
/// Returns `SchedulerError::InvalidInput` if the range spans more days than
/// can be expanded in one call.
pub fn expand_open_days(
    template: &AvailabilityTemplate,
    from: NaiveDate,
    until: NaiveDate,
) -> Result<Vec<NaiveDate>> {
    if from > until {
        return Ok(Vec::new());
    }
    let Some(rule) = weekly_rule(template) else {
        return Ok(Vec::new());
    };

    let span = (until - from).num_days() + 1;
    if span > i64::from(MAX_EXPANSION) {
        return Err(SchedulerError::InvalidInput(format!(
            "date range of {} days exceeds the {}-day limit",
            span, MAX_EXPANSION
        )));
    }

    let rrule_text = format!(
        "DTSTART;TZID=UTC:{}T120000\nRRULE:{};UNTIL={}T235959Z",
        from.format("%Y%m%d"),
        rule,
        until.format("%Y%m%d")
    );

    let rrule_set: RRuleSet = rrule_text
        .parse()
        .map_err(|e| SchedulerError::InvalidInput(format!("{}", e)))?;

    let instances = rrule_set.all(MAX_EXPANSION);

    // DTSTART itself may not fall on an open weekday; keep only rule matches.
    let open = template.open_weekdays();
    Ok(instances
        .dates
        .into_iter()
        .map(|dt| dt.date_naive())
        .filter(|d| *d >= from && *d <= until && open.contains(&d.weekday()))
        .collect())
}

/// The Monday-based week containing `day`, as `(monday, sunday)`.
pub fn week_of(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = day - Duration::days(i64::from(day.weekday().num_days_from_monday()));
    (monday, monday + Duration::days(6))
}

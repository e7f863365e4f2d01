//! DST transition policies for turning wall-clock lesson times into instants.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Policy for lesson times that fall during DST transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstPolicy {
    /// Skip lessons that start in the DST gap (e.g., 2:30 AM during spring forward)
    Skip,
    /// Shift to the first valid time after the gap
    ShiftForward,
    /// Keep the wall clock reading and apply the offset in force before the gap
    #[default]
    WallClock,
}

/// Longest DST gap observed in the IANA database is 2 hours; probe a little past it.
const GAP_PROBE_LIMIT_MINUTES: i64 = 180;

/// Resolve a local wall-clock datetime in `tz` to a UTC instant.
///
/// Ambiguous times (fall back) always resolve to the earlier instant. Times that
/// do not exist (spring forward) are handled according to `policy`; `Skip`
/// yields `None`.
pub fn resolve_local(tz: Tz, local: NaiveDateTime, policy: DstPolicy) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => match policy {
            DstPolicy::Skip => None,
            DstPolicy::ShiftForward => (1..=GAP_PROBE_LIMIT_MINUTES).find_map(|m| {
                tz.from_local_datetime(&(local + Duration::minutes(m)))
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
            }),
            DstPolicy::WallClock => {
                let before = tz
                    .from_local_datetime(&(local - Duration::minutes(GAP_PROBE_LIMIT_MINUTES)))
                    .earliest()?;
                let offset = before.offset().fix().local_minus_utc();
                Some(Utc.from_utc_datetime(&(local - Duration::seconds(i64::from(offset)))))
            }
        },
    }
}

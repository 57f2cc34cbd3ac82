//! Reference-timezone clock for seeding discovery scans.
//!
//! Frame names encode the minute of day in the printer site's local time,
//! so scans must seed from that timezone no matter where the viewer runs.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;

/// Wall clock pinned to a fixed reference timezone.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceClock {
    tz: Tz,
}

impl ReferenceClock {
    /// Create a clock for the given IANA timezone.
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Minutes elapsed since local midnight in the reference timezone.
    ///
    /// Calendar-aware: daylight-saving shifts come from the zone database,
    /// not a fixed UTC offset. Re-read at every scan so the seed is never
    /// stale.
    pub fn minute_of_day(&self) -> u32 {
        minute_at(Utc::now().with_timezone(&self.tz))
    }
}

fn minute_at(local: DateTime<Tz>) -> u32 {
    local.hour() * 60 + local.minute()
}

//! Query window bounds.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};

use crate::intent::QueryWindow;

/// `[from, until)` for a window as of `now`; `until = None` is open-ended.
///
/// Day-part windows cover today's calendar day in `now`'s offset,
/// including hours already past. Ranged windows start at `now`.
#[must_use]
pub fn bounds(window: QueryWindow, now: DateTime<FixedOffset>) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
    let at_hour = |hour: i64| -> DateTime<Utc> {
        let midnight = now
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_local_timezone(*now.offset())
            .single()
            .unwrap_or(now);
        (midnight + Duration::hours(hour)).with_timezone(&Utc)
    };
    let now_utc = now.with_timezone(&Utc);

    match window {
        QueryWindow::Today => (at_hour(0), Some(at_hour(24))),
        QueryWindow::Morning => (at_hour(0), Some(at_hour(12))),
        QueryWindow::Afternoon => (at_hour(12), Some(at_hour(18))),
        QueryWindow::Evening => (at_hour(18), Some(at_hour(24))),
        QueryWindow::Week => (now_utc, Some(now_utc + Duration::days(7))),
        QueryWindow::Upcoming => (now_utc, Some(now_utc + Duration::days(30))),
        QueryWindow::All => (now_utc, None),
    }
}

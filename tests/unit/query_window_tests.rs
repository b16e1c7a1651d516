use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};

use kabanda::intent::QueryWindow;
use kabanda::router::window::bounds;

fn kampala() -> FixedOffset {
    FixedOffset::east_opt(3 * 3600).expect("offset")
}

/// 2026-03-14 10:30 at +03:00.
fn now() -> DateTime<FixedOffset> {
    kampala()
        .with_ymd_and_hms(2026, 3, 14, 10, 30, 0)
        .single()
        .expect("valid local time")
}

fn local(hour: u32) -> DateTime<Utc> {
    kampala()
        .with_ymd_and_hms(2026, 3, 14, hour, 0, 0)
        .single()
        .expect("valid local time")
        .with_timezone(&Utc)
}

#[test]
fn day_parts_cover_the_whole_local_day() {
    let midnight = local(0);
    assert_eq!(
        bounds(QueryWindow::Today, now()),
        (midnight, Some(midnight + Duration::days(1)))
    );
    assert_eq!(bounds(QueryWindow::Morning, now()), (midnight, Some(local(12))));
    assert_eq!(bounds(QueryWindow::Afternoon, now()), (local(12), Some(local(18))));
    assert_eq!(
        bounds(QueryWindow::Evening, now()),
        (local(18), Some(midnight + Duration::days(1)))
    );
}

#[test]
fn ranged_windows_start_now() {
    let start = now().with_timezone(&Utc);
    assert_eq!(
        bounds(QueryWindow::Week, now()),
        (start, Some(start + Duration::days(7)))
    );
    assert_eq!(
        bounds(QueryWindow::Upcoming, now()),
        (start, Some(start + Duration::days(30)))
    );
    assert_eq!(bounds(QueryWindow::All, now()), (start, None));
}

#[test]
fn local_midnight_is_previous_utc_evening() {
    let (from, _) = bounds(QueryWindow::Today, now());
    assert_eq!(from, Utc.with_ymd_and_hms(2026, 3, 13, 21, 0, 0).unwrap());
}

#[test]
fn window_labels_parse_leniently() {
    assert_eq!(QueryWindow::parse_lenient("Tonight"), QueryWindow::Evening);
    assert_eq!(QueryWindow::parse_lenient("this_week"), QueryWindow::Week);
    assert_eq!(QueryWindow::parse_lenient(" all "), QueryWindow::All);
    assert_eq!(QueryWindow::parse_lenient("someday"), QueryWindow::Today);
}

#[test]
fn empty_reply_phrases() {
    assert_eq!(QueryWindow::Today.phrase(), "for today");
    assert_eq!(QueryWindow::Upcoming.phrase(), "coming up");
    assert_eq!(QueryWindow::All.phrase(), "at all");
}

//! Market calendar arithmetic in Eastern wall-clock time.
//!
//! All instants inside the engine are timezone-naive `NaiveDateTime`
//! values expressed in the US equity market's reference zone
//! (America/New_York). [`to_eastern`] is the single ingress point where
//! aware timestamps are stripped to that wall clock; mixing zones past
//! this boundary is forbidden.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, Utc, Weekday};
use chrono_tz::America::New_York;

/// Regular cash-session open, 09:30 ET.
pub const MARKET_OPEN: NaiveTime = match NaiveTime::from_hms_opt(9, 30, 0) {
    Some(t) => t,
    None => panic!("09:30:00 is a valid wall-clock time"),
};

/// Regular cash-session close, 16:00 ET.
pub const MARKET_CLOSE: NaiveTime = match NaiveTime::from_hms_opt(16, 0, 0) {
    Some(t) => t,
    None => panic!("16:00:00 is a valid wall-clock time"),
};

/// Converts an aware UTC instant into Eastern wall-clock time.
pub fn to_eastern(instant: DateTime<Utc>) -> NaiveDateTime {
    instant.with_timezone(&New_York).naive_local()
}

/// The current instant in Eastern wall-clock time.
pub fn now_eastern() -> NaiveDateTime {
    to_eastern(Utc::now())
}

/// Returns the most recent Monday 09:30 on or before `reference`.
///
/// If `reference` falls on a Monday at or after 09:30, that same Monday
/// is returned; a Monday before the open resolves to the previous week.
pub fn weekly_open(reference: NaiveDateTime) -> NaiveDateTime {
    let days_since_monday = reference.weekday().num_days_from_monday() as i64;
    let monday = reference.date() - Duration::days(days_since_monday);
    let open = monday.and_time(MARKET_OPEN);

    if reference < open {
        open - Duration::days(7)
    } else {
        open
    }
}

/// Returns 09:30 of `reference`'s day if `reference` has reached it,
/// otherwise 09:30 of the previous calendar day.
///
/// No weekday skipping happens here: a Sunday reference resolves to
/// Saturday or Sunday 09:30. Whether a bar exists at that instant is a
/// data-availability question, not a calendar one.
pub fn daily_open(reference: NaiveDateTime) -> NaiveDateTime {
    let open = reference.date().and_time(MARKET_OPEN);

    if reference < open {
        open - Duration::days(1)
    } else {
        open
    }
}

/// True iff `reference` lies inside the regular cash session
/// [09:30, 16:00) on a weekday.
pub fn is_market_open(reference: NaiveDateTime) -> bool {
    if matches!(reference.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    let time = reference.time();
    MARKET_OPEN <= time && time < MARKET_CLOSE
}

/// The next cash-session open strictly after `reference`.
pub fn next_market_open(reference: NaiveDateTime) -> NaiveDateTime {
    let today_open = reference.date().and_time(MARKET_OPEN);

    if reference < today_open && !matches!(reference.weekday(), Weekday::Sat | Weekday::Sun) {
        return today_open;
    }

    let mut day = reference.date() + Duration::days(1);
    while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        day = day + Duration::days(1);
    }
    day.and_time(MARKET_OPEN)
}

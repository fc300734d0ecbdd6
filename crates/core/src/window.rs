//! Epoch-aligned time window helpers shared by the rate limiter and the
//! usage tracker's daily/monthly budget accounting.
//!
//! Windows are aligned to `DateTime::UNIX_EPOCH` rather than to the instant a
//! counter was first created, so two gateway instances observing the same
//! wall-clock time always agree on window boundaries without coordination.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Utc};

/// Index of the 60-second window containing `now`, counted from the Unix
/// epoch. Two calls with timestamps in the same 60-second bucket return the
/// same index.
#[must_use]
pub fn minute_window_index(now: DateTime<Utc>) -> i64 {
    now.timestamp().div_euclid(60)
}

/// Start of the 60-second window containing `now`.
#[must_use]
pub fn minute_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let idx = minute_window_index(now);
    DateTime::<Utc>::from_timestamp(idx * 60, 0).unwrap_or(now)
}

/// Calendar day key for `now`, e.g. `"2026-07-27"`, used as the suffix of a
/// daily budget counter key. Daily windows are calendar-day aligned (not a
/// rolling 24h window), matching the tenant's `dailyBudget` semantics.
#[must_use]
pub fn day_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// Calendar month key for `now`, e.g. `"2026-07"`.
#[must_use]
pub fn month_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

/// Start of the next calendar day after `now`, used to report a daily
/// counter's reset time.
#[must_use]
pub fn next_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    let tomorrow = today + ChronoDuration::days(1);
    Utc.from_utc_datetime(&tomorrow.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// Start of the next calendar month after `now`, used to report a monthly
/// counter's reset time.
#[must_use]
pub fn next_month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

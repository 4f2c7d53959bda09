//! Market zone and session arithmetic
//!
//! The engine trades one venue, so the zone is fixed: UTC+5:30, session
//! 09:15-15:30, candle grid aligned to 5-minute boundaries. All restart
//! and square-off scheduling goes through this module; nothing else in
//! the crate touches wall-clock timezones.

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDateTime, NaiveTime, Timelike, Utc};
use std::time::Duration;

/// Seconds east of UTC for the market zone (+05:30)
const MARKET_ZONE_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Candle grid used for restart alignment
pub const RESTART_BOUNDARY_SECS: i64 = 300;

/// Fixed offset for the market zone
pub fn market_zone() -> FixedOffset {
    FixedOffset::east_opt(MARKET_ZONE_OFFSET_SECS).expect("market zone offset is valid")
}

/// Session open, market zone local time
pub fn market_open() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 15, 0).expect("static time")
}

/// Session close, market zone local time
pub fn market_close() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 30, 0).expect("static time")
}

/// Current wall-clock time in the market zone
pub fn now_in_market_zone() -> NaiveDateTime {
    let utc: DateTime<Utc> = Utc::now();
    utc.with_timezone(&market_zone()).naive_local()
}

/// Whether the given local time falls inside the trading session
pub fn is_within_session(time: NaiveTime) -> bool {
    time >= market_open() && time < market_close()
}

/// Parse a config "HH:mm" time-of-day in the market zone
pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

/// Smallest 5-minute boundary that is on or after `at`.
///
/// A timestamp exactly on a boundary maps to itself: a restart triggered
/// at 10:25:00 re-enters at 10:25:00, one triggered at 10:23 waits for
/// 10:25:00.
pub fn next_5min_boundary(at: NaiveDateTime) -> NaiveDateTime {
    let secs_into_bucket = (at.minute() % 5) as i64 * 60 + at.second() as i64;
    if secs_into_bucket == 0 && at.nanosecond() == 0 {
        return at;
    }
    let truncated = at.with_nanosecond(0).expect("zero nanosecond is valid");
    truncated + ChronoDuration::seconds(RESTART_BOUNDARY_SECS - secs_into_bucket)
}

/// Delay from `now` until the next 5-minute boundary; zero when `now`
/// is exactly on one.
pub fn restart_delay(now: NaiveDateTime) -> Duration {
    let boundary = next_5min_boundary(now);
    (boundary - now).to_std().unwrap_or(Duration::ZERO)
}

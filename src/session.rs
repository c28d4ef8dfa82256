//! NSE session clock
//!
//! All gates convert to exchange time (IST) per timestamp, the same way
//! the trading-hours checks do, and compare minutes since midnight.

use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Asia::Kolkata;

/// Regular trading hours: 9:15 AM - 3:30 PM IST
const MARKET_OPEN_MINS: u32 = 9 * 60 + 15;
const MARKET_CLOSE_MINS: u32 = 15 * 60 + 30;

/// New entries only between 9:45 and 2:45 PM IST
const ENTRY_START_MINS: u32 = 9 * 60 + 45;
const ENTRY_END_MINS: u32 = 14 * 60 + 45;

/// End-of-day square-off
const EXIT_MINS: u32 = 15 * 60 + 10;

/// Overnight zones seen before this get their age capped
const EARLY_SESSION_END_MINS: u32 = 11 * 60;

fn ist_minutes(now: DateTime<Utc>) -> u32 {
    let local = now.with_timezone(&Kolkata);
    local.hour() * 60 + local.minute()
}

pub fn is_market_open(now: DateTime<Utc>) -> bool {
    let mins = ist_minutes(now);
    mins >= MARKET_OPEN_MINS && mins <= MARKET_CLOSE_MINS
}

pub fn is_within_entry_window(now: DateTime<Utc>) -> bool {
    let mins = ist_minutes(now);
    mins >= ENTRY_START_MINS && mins <= ENTRY_END_MINS
}

pub fn is_exit_time(now: DateTime<Utc>) -> bool {
    ist_minutes(now) >= EXIT_MINS
}

pub fn is_early_session(now: DateTime<Utc>) -> bool {
    ist_minutes(now) < EARLY_SESSION_END_MINS
}

/// Start of the next 5-minute candle slot, plus a small buffer
pub fn next_five_minute_slot(now: DateTime<Utc>, buffer_secs: i64) -> DateTime<Utc> {
    let local = now.with_timezone(&Kolkata);
    let ahead = 5 - (local.minute() as i64 % 5);
    let slot = (local + Duration::minutes(ahead))
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(local);
    (slot + Duration::seconds(buffer_secs)).with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ist(h: u32, m: u32) -> DateTime<Utc> {
        Kolkata
            .with_ymd_and_hms(2024, 7, 1, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_market_hours() {
        assert!(!is_market_open(ist(9, 0)));
        assert!(is_market_open(ist(9, 15)));
        assert!(is_market_open(ist(15, 30)));
        assert!(!is_market_open(ist(15, 31)));
    }

    #[test]
    fn test_entry_window() {
        assert!(!is_within_entry_window(ist(9, 30)));
        assert!(is_within_entry_window(ist(11, 0)));
        assert!(!is_within_entry_window(ist(14, 50)));
    }

    #[test]
    fn test_next_slot() {
        let slot = next_five_minute_slot(ist(10, 2), 3);
        let local = slot.with_timezone(&Kolkata);
        assert_eq!((local.hour(), local.minute(), local.second()), (10, 5, 3));
    }
}

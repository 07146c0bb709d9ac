//! Pure session-calendar predicates used by `TimeBased`'s "weekend
//! protection" and "day-trading EOD" triggers. Both are pure predicates
//! over the broker's own server time, never the local clock.

use chrono::{DateTime, NaiveTime, Timelike, Utc, Weekday};

/// A window of time, ending at `before_weekday`/`before_time`, inside
/// which a position should be flattened ahead of the weekly market close
/// (e.g. FX closes Friday 22:00 UTC; protect the last two hours).
#[derive(Debug, Clone, Copy)]
pub struct WeeklyCloseWindow {
    pub before_weekday: Weekday,
    pub before_time: NaiveTime,
    pub lead_time: chrono::Duration,
}

/// True when `now` falls inside the protective window immediately before
/// the configured weekly close.
pub fn within_weekend_protection(window: &WeeklyCloseWindow, now: DateTime<Utc>) -> bool {
    let close_today = now
        .date_naive()
        .and_time(window.before_time)
        .and_utc();
    let days_until_close = days_until_weekday(now.weekday(), window.before_weekday);
    let close_instant = close_today + chrono::Duration::days(days_until_close as i64);
    let window_start = close_instant - window.lead_time;
    now >= window_start && now < close_instant
}

fn days_until_weekday(from: Weekday, to: Weekday) -> u32 {
    (7 + to.num_days_from_monday() as i32 - from.num_days_from_monday() as i32) as u32 % 7
}

/// True when `now`'s time-of-day is at or past `eod`, the configured
/// day-trading end-of-day cutoff.
pub fn past_day_trading_eod(eod: NaiveTime, now: DateTime<Utc>) -> bool {
    now.time() >= eod
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn within_weekend_protection_window_just_before_close() {
        let window = WeeklyCloseWindow {
            before_weekday: Weekday::Fri,
            before_time: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            lead_time: chrono::Duration::hours(2),
        };
        // Friday 21:00 UTC: one hour before a 22:00 Friday close.
        let t = Utc.with_ymd_and_hms(2026, 3, 6, 21, 0, 0).unwrap();
        assert_eq!(t.weekday(), Weekday::Fri);
        assert!(within_weekend_protection(&window, t));
    }

    #[test]
    fn outside_weekend_protection_window_midweek() {
        let window = WeeklyCloseWindow {
            before_weekday: Weekday::Fri,
            before_time: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            lead_time: chrono::Duration::hours(2),
        };
        let t = Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap();
        assert!(!within_weekend_protection(&window, t));
    }

    #[test]
    fn past_eod_detects_cutoff() {
        let eod = NaiveTime::from_hms_opt(21, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2026, 3, 4, 20, 59, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 4, 21, 0, 0).unwrap();
        assert!(!past_day_trading_eod(eod, before));
        assert!(past_day_trading_eod(eod, after));
    }
}

use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;

/// Main session start, minutes after local midnight (10:00)
pub const SESSION_OPEN_MINUTE: u32 = 10 * 60;
/// Last minute a cycle may start (18:50)
pub const SESSION_CLOSE_MINUTE: u32 = 18 * 60 + 50;

/// Whether `now` falls on a weekday between 10:00 and 18:50 exchange time, inclusive
pub fn is_within_trading_hours(now: DateTime<Utc>, tz: Tz) -> bool {
    let local = now.with_timezone(&tz);

    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }

    let minute_of_day = local.hour() * 60 + local.minute();
    (SESSION_OPEN_MINUTE..=SESSION_CLOSE_MINUTE).contains(&minute_of_day)
}

/// Start of the exchange-local day containing `now`, in UTC
pub fn local_midnight(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let date = now.with_timezone(&tz).date_naive();
    tz.from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Moscow;

    fn msk(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Moscow
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_weekend_is_closed() {
        // 2024-03-02 is a Saturday
        assert!(!is_within_trading_hours(msk(2024, 3, 2, 12, 0), Moscow));
        assert!(!is_within_trading_hours(msk(2024, 3, 3, 12, 0), Moscow));
    }

    #[test]
    fn test_session_boundaries() {
        // 2024-03-05 is a Tuesday
        assert!(!is_within_trading_hours(msk(2024, 3, 5, 9, 0), Moscow));
        assert!(!is_within_trading_hours(msk(2024, 3, 5, 9, 59), Moscow));
        assert!(is_within_trading_hours(msk(2024, 3, 5, 10, 0), Moscow));
        assert!(is_within_trading_hours(msk(2024, 3, 5, 11, 0), Moscow));
        assert!(is_within_trading_hours(msk(2024, 3, 5, 18, 50), Moscow));
        assert!(!is_within_trading_hours(msk(2024, 3, 5, 18, 51), Moscow));
    }

    #[test]
    fn test_gate_uses_exchange_time_not_utc() {
        // 08:00 UTC is 11:00 in Moscow
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap();
        assert!(is_within_trading_hours(now, Moscow));
        // 16:30 UTC is 19:30 in Moscow
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 16, 30, 0).unwrap();
        assert!(!is_within_trading_hours(now, Moscow));
    }

    #[test]
    fn test_local_midnight() {
        let now = msk(2024, 3, 5, 1, 30);
        assert_eq!(
            local_midnight(now, Moscow),
            Utc.with_ymd_and_hms(2024, 3, 4, 21, 0, 0).unwrap()
        );
    }
}

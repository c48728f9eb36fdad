//! Timestamp and calendar utilities

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Today's date in UTC
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Monday of the ISO week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Whole weeks between two dates, rounded up; zero when `end` is not after `start`
pub fn weeks_between(start: NaiveDate, end: NaiveDate) -> i64 {
    let days = (end - start).num_days();
    if days <= 0 {
        0
    } else {
        (days + 6) / 7
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01 00:00:00 UTC
    }

    #[test]
    fn test_week_start_is_monday() {
        // 2025-03-13 is a Thursday
        assert_eq!(week_start(date("2025-03-13")), date("2025-03-10"));
        assert_eq!(week_start(date("2025-03-10")), date("2025-03-10"));
        // Sunday belongs to the week that began the previous Monday
        assert_eq!(week_start(date("2025-03-16")), date("2025-03-10"));
    }

    #[test]
    fn test_weeks_between() {
        assert_eq!(weeks_between(date("2025-01-01"), date("2025-01-01")), 0);
        assert_eq!(weeks_between(date("2025-01-01"), date("2025-01-08")), 1);
        assert_eq!(weeks_between(date("2025-01-01"), date("2025-01-09")), 2);
        assert_eq!(weeks_between(date("2025-02-01"), date("2025-01-01")), 0);
    }
}

//! Date format guessing for CSV imports

use chrono::{Datelike, NaiveDate};

/// Candidate formats in preference order
///
/// US month-first formats precede their day-first counterparts, so an
/// ambiguous file such as "03/04/2025" resolves to March 4th.
pub const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%m/%d/%y",
];

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2200;

/// Cut an ISO date-time ("2025-06-28T05:00:00Z", "2025-06-28 05:00") to its date part
fn strip_time(value: &str) -> &str {
    let bytes = value.as_bytes();
    let looks_iso = bytes.len() > 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && matches!(bytes[10], b'T' | b't' | b' ')
        && bytes[..4].iter().all(u8::is_ascii_digit);
    if looks_iso {
        &value[..10]
    } else {
        value
    }
}

/// Parse one value with a known format
///
/// Years outside 1900..=2200 are rejected so that a four-digit-year format
/// never accepts a two-digit year.
pub fn parse_date(value: &str, format: &str) -> Option<NaiveDate> {
    let value = strip_time(value.trim());
    if value.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(value, format)
        .ok()
        .filter(|d| (MIN_YEAR..=MAX_YEAR).contains(&d.year()))
}

/// Pick the format that best fits a column of date strings
///
/// Returns the first candidate that parses every non-empty value, otherwise
/// the candidate parsing the most values. `None` when nothing parses.
pub fn detect_date_format<S: AsRef<str>>(values: &[S]) -> Option<&'static str> {
    let values: Vec<&str> = values
        .iter()
        .map(|v| v.as_ref().trim())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return None;
    }

    let mut best: Option<(&'static str, usize)> = None;
    for format in DATE_FORMATS {
        let parsed = values.iter().filter(|v| parse_date(v, format).is_some()).count();
        if parsed == values.len() {
            return Some(*format);
        }
        if parsed > 0 && best.map_or(true, |(_, count)| parsed > count) {
            best = Some((*format, parsed));
        }
    }

    best.map(|(format, _)| format)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_iso_detected() {
        assert_eq!(detect_date_format(&["2025-06-28", "2025-10-04"]), Some("%Y-%m-%d"));
    }

    #[test]
    fn test_iso_datetime_cut_to_date() {
        assert_eq!(detect_date_format(&["2025-06-28T05:00:00Z"]), Some("%Y-%m-%d"));
        assert_eq!(parse_date("2025-06-28 05:00", "%Y-%m-%d"), Some(date(2025, 6, 28)));
    }

    #[test]
    fn test_ambiguous_prefers_us() {
        assert_eq!(detect_date_format(&["03/04/2025", "05/06/2025"]), Some("%m/%d/%Y"));
        assert_eq!(parse_date("03/04/2025", "%m/%d/%Y"), Some(date(2025, 3, 4)));
    }

    #[test]
    fn test_day_first_when_us_fails() {
        assert_eq!(detect_date_format(&["03/04/2025", "25/06/2025"]), Some("%d/%m/%Y"));
    }

    #[test]
    fn test_month_names() {
        assert_eq!(detect_date_format(&["June 28, 2025", "October 4, 2025"]), Some("%B %d, %Y"));
        let format = detect_date_format(&["Jun 28, 2025"]).unwrap();
        assert_eq!(parse_date("Jun 28, 2025", format), Some(date(2025, 6, 28)));
        assert_eq!(detect_date_format(&["28 June 2025"]), Some("%d %B %Y"));
    }

    #[test]
    fn test_two_digit_year_not_taken_as_year_25() {
        assert_eq!(detect_date_format(&["06/28/25"]), Some("%m/%d/%y"));
        assert_eq!(parse_date("06/28/25", "%m/%d/%Y"), None);
    }

    #[test]
    fn test_majority_format_when_some_fail() {
        let values = ["2025-06-28", "2025-07-04", "sometime in fall"];
        assert_eq!(detect_date_format(&values), Some("%Y-%m-%d"));
    }

    #[test]
    fn test_no_dates() {
        let empty: [&str; 2] = ["", " "];
        assert_eq!(detect_date_format(&empty), None);
        assert_eq!(detect_date_format(&["TBD"]), None);
    }
}

//! Local wall-clock conversions
//!
//! The decoder prints event times, and accepts `--start-datetime` /
//! `--stop-datetime`, in the server host's local time zone.

use chrono::{Local, LocalResult, NaiveDateTime, TimeZone};

/// Format a unix timestamp as local `Y-M-D H:M:S` without zero padding
pub fn format_local_datetime(ts: i64) -> Option<String> {
    match Local.timestamp_opt(ts, 0) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
            Some(dt.format("%Y-%-m-%-d %-H:%-M:%-S").to_string())
        }
        LocalResult::None => None,
    }
}

/// Format a unix timestamp as the decoder's local `YYMMDD HH:MM:SS` header pair
pub fn format_header_datetime(ts: i64) -> Option<String> {
    match Local.timestamp_opt(ts, 0) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
            Some(dt.format("%y%m%d %H:%M:%S").to_string())
        }
        LocalResult::None => None,
    }
}

/// Parse a local `YYMMDD HH:MM:SS` pair (the decoder's header format) into unix seconds
pub fn parse_header_datetime(date: &str, time: &str) -> Option<i64> {
    let naive = NaiveDateTime::parse_from_str(&format!("{} {}", date, time), "%y%m%d %H:%M:%S").ok()?;
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Some(dt.timestamp()),
        LocalResult::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let ts = parse_header_datetime("221017", "14:25:24").unwrap();
        let expected = Local
            .with_ymd_and_hms(2022, 10, 17, 14, 25, 24)
            .single()
            .unwrap()
            .timestamp();
        assert_eq!(ts, expected);
    }

    #[test]
    fn test_format_has_no_padding() {
        let ts = Local
            .with_ymd_and_hms(2022, 5, 1, 3, 4, 5)
            .single()
            .unwrap()
            .timestamp();
        assert_eq!(format_local_datetime(ts).unwrap(), "2022-5-1 3:4:5");
    }

    #[test]
    fn test_header_format_matches_parse() {
        let ts = parse_header_datetime("230115", "09:05:01").unwrap();
        assert_eq!(format_header_datetime(ts).unwrap(), "230115 09:05:01");
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_header_datetime("22101", "14:25:24").is_none());
        assert!(parse_header_datetime("221017", "25:00:00").is_none());
    }
}

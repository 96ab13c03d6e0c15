use crate::error::{PipelineError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::OnceLock;

/// Hour-resolution timestamp layout used for both input and output.
pub const OUTPUT_FMT: &str = "%Y%m%d%H";

fn hour_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4})(\d{2})(\d{2})(\d{2})$").expect("static pattern compiles")
    })
}

/// Render epoch milliseconds as `YYYYMMDDHH` (UTC).
pub fn format_ts(ts_ms: i64) -> String {
    match DateTime::from_timestamp_millis(ts_ms) {
        Some(dt) => dt.format(OUTPUT_FMT).to_string(),
        None => "Unknown Time".to_string(),
    }
}

pub fn format_naive(dt: &NaiveDateTime) -> String {
    dt.format(OUTPUT_FMT).to_string()
}

/// Parse a `YYYYMMDDHH` string. Any failure is reported as a format error
/// carrying only the offending input.
pub fn parse_yyyymmddhh(value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();
    let format_err = || PipelineError::TimestampFormat {
        input: value.to_string(),
    };

    let caps = hour_pattern().captures(trimmed).ok_or_else(format_err)?;
    let field = |i: usize| caps[i].parse::<u32>().map_err(|_| format_err());

    let year = field(1)? as i32;
    NaiveDate::from_ymd_opt(year, field(2)?, field(3)?)
        .and_then(|date| date.and_hms_opt(field(4).ok()?, 0, 0))
        .ok_or_else(format_err)
}

/// Interpret a naive wall-clock time as UTC and return epoch milliseconds.
pub fn to_millis(dt: &NaiveDateTime) -> i64 {
    dt.and_utc().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_hour_resolution_utc() {
        // 2025-01-28 01:00:00 UTC
        assert_eq!(format_ts(1_738_026_000_000), "2025012801");
        // Minutes are truncated, not rounded.
        assert_eq!(format_ts(1_738_026_000_000 + 59 * 60_000), "2025012801");
    }

    #[test]
    fn parses_and_round_trips() {
        let dt = parse_yyyymmddhh("2025012816").unwrap();
        assert_eq!(format_naive(&dt), "2025012816");
        assert_eq!(format_ts(to_millis(&dt)), "2025012816");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert!(parse_yyyymmddhh(" 2025012816\n").is_ok());
    }

    #[test]
    fn rejects_dashed_dates() {
        let err = parse_yyyymmddhh("2025-01-28").unwrap_err();
        assert!(matches!(err, PipelineError::TimestampFormat { .. }));
    }

    #[test]
    fn rejects_impossible_calendar_values() {
        for bad in ["2025023001", "2025011324", "2025130101", "202501281", "20250128160"] {
            assert!(
                matches!(parse_yyyymmddhh(bad), Err(PipelineError::TimestampFormat { .. })),
                "{bad} should be rejected"
            );
        }
    }
}

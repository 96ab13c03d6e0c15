//! Compares the two most recent MA rows of a prebuilt csv at or before a given hour.

use crate::error::{PipelineError, Result};
use crate::table::HEADER;
use crate::timefmt::{format_naive, parse_yyyymmddhh};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaRecord {
    pub hour: NaiveDateTime,
    pub ma30: f64,
    pub ma60: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn between(latest: f64, previous: f64) -> Self {
        if latest > previous {
            Trend::Up
        } else if latest < previous {
            Trend::Down
        } else {
            Trend::Flat
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaTrendResult {
    pub input: String,
    pub latest_ts: String,
    pub prev_ts: String,
    pub ma30_latest: f64,
    pub ma30_prev: f64,
    pub ma30_trend: Trend,
    pub ma60_latest: f64,
    pub ma60_prev: f64,
    pub ma60_trend: Trend,
}

fn parse_number(value: &str, field: &str, row: usize) -> Result<f64> {
    value.trim().parse().map_err(|_| PipelineError::MaCsv {
        row,
        message: format!("{field} is not a number: {value:?}"),
    })
}

/// Loads and sorts the rows of an MA csv (header `timestamp,ma30,ma60`).
pub fn load_ma_csv<P: AsRef<Path>>(path: P) -> Result<Vec<MaRecord>> {
    let file = std::fs::File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(file);

    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let (Some(ts_col), Some(ma30_col), Some(ma60_col)) = (column("timestamp"), column("ma30"), column("ma60")) else {
        let mut missing: Vec<&str> = HEADER.iter().copied().filter(|name| column(*name).is_none()).collect();
        missing.sort_unstable();
        return Err(PipelineError::MaCsv {
            row: 1,
            message: format!("header is missing fields: {}", missing.join(", ")),
        });
    };

    let mut records = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let row = i + 2;
        let record = result?;
        let field = |col: usize| record.get(col).unwrap_or("");

        let raw_ts = field(ts_col);
        if raw_ts.is_empty() {
            return Err(PipelineError::MaCsv {
                row,
                message: "timestamp is empty".into(),
            });
        }
        let hour = parse_yyyymmddhh(raw_ts).map_err(|_| PipelineError::MaCsv {
            row,
            message: format!("timestamp {raw_ts:?} is not YYYYMMDDHH"),
        })?;

        records.push(MaRecord {
            hour,
            ma30: parse_number(field(ma30_col), "ma30", row)?,
            ma60: parse_number(field(ma60_col), "ma60", row)?,
        });
    }

    if records.is_empty() {
        return Err(PipelineError::InsufficientData("ma csv has no data rows".into()));
    }

    records.sort_by_key(|r| r.hour);
    Ok(records)
}

/// Trend of both averages between the last two rows at or before `end`.
pub fn calc_ma_trend<P: AsRef<Path>>(end: NaiveDateTime, path: P) -> Result<MaTrendResult> {
    let records = load_ma_csv(path)?;
    let upto: Vec<&MaRecord> = records.iter().filter(|r| r.hour <= end).collect();

    let [.., previous, latest] = upto.as_slice() else {
        return Err(PipelineError::InsufficientData(format!(
            "need at least 2 rows at or before {}, found {}",
            format_naive(&end),
            upto.len()
        )));
    };

    Ok(MaTrendResult {
        input: format_naive(&end),
        latest_ts: format_naive(&latest.hour),
        prev_ts: format_naive(&previous.hour),
        ma30_latest: latest.ma30,
        ma30_prev: previous.ma30,
        ma30_trend: Trend::between(latest.ma30, previous.ma30),
        ma60_latest: latest.ma60,
        ma60_prev: previous.ma60,
        ma60_trend: Trend::between(latest.ma60, previous.ma60),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn hour(raw: &str) -> NaiveDateTime {
        parse_yyyymmddhh(raw).unwrap()
    }

    #[test]
    fn two_rows_trending_up() {
        let file = csv_file("timestamp,ma30,ma60\n2025012800,10,20\n2025012801,12,22\n");
        let result = calc_ma_trend(hour("2025012801"), file.path()).unwrap();

        assert_eq!(result.latest_ts, "2025012801");
        assert_eq!(result.prev_ts, "2025012800");
        assert_eq!(result.ma30_latest, 12.0);
        assert_eq!(result.ma30_prev, 10.0);
        assert_eq!(result.ma30_trend, Trend::Up);
        assert_eq!(result.ma60_latest, 22.0);
        assert_eq!(result.ma60_prev, 20.0);
        assert_eq!(result.ma60_trend, Trend::Up);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["ma30_trend"], "up");
    }

    #[test]
    fn unsorted_rows_and_later_rows_are_ignored() {
        let file = csv_file(
            "ma60,timestamp,ma30\n21,2025012802,9\n20,2025012800,11\n20,2025012801,11\n30,2025012805,50\n",
        );
        let result = calc_ma_trend(hour("2025012803"), file.path()).unwrap();
        assert_eq!(result.latest_ts, "2025012802");
        assert_eq!(result.prev_ts, "2025012801");
        assert_eq!(result.ma30_trend, Trend::Down);
        assert_eq!(result.ma60_trend, Trend::Up);
    }

    #[test]
    fn equal_values_are_flat() {
        assert_eq!(Trend::between(1.5, 1.5), Trend::Flat);
    }

    #[test]
    fn one_row_before_end_is_insufficient() {
        let file = csv_file("timestamp,ma30,ma60\n2025012800,10,20\n2025012801,12,22\n");
        let err = calc_ma_trend(hour("2025012800"), file.path()).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData(_)));
    }

    #[test]
    fn missing_header_fields_listed() {
        let file = csv_file("timestamp,ma30\n2025012800,10\n");
        match load_ma_csv(file.path()) {
            Err(PipelineError::MaCsv { row: 1, message }) => assert!(message.ends_with("ma60")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_timestamp_names_row() {
        let file = csv_file("timestamp,ma30,ma60\n2025012800,10,20\n2025-01-28,12,22\n");
        match load_ma_csv(file.path()) {
            Err(PipelineError::MaCsv { row, message }) => {
                assert_eq!(row, 3);
                assert!(message.contains("YYYYMMDDHH"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_number_names_field() {
        let file = csv_file("timestamp,ma30,ma60\n2025012800,ten,20\n");
        let err = load_ma_csv(file.path()).unwrap_err();
        assert!(err.to_string().contains("ma30"));
    }

    #[test]
    fn short_row_names_missing_field() {
        let file = csv_file("timestamp,ma30,ma60\n2025012800,10,20\n2025012801,12\n");
        match load_ma_csv(file.path()) {
            Err(PipelineError::MaCsv { row, message }) => {
                assert_eq!(row, 3);
                assert!(message.contains("ma60"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn header_only_is_insufficient() {
        let file = csv_file("timestamp,ma30,ma60\n");
        assert!(matches!(load_ma_csv(file.path()), Err(PipelineError::InsufficientData(_))));
    }

    #[test]
    fn missing_file_is_io() {
        let err = load_ma_csv("/nonexistent/ma.csv").unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}

use crate::error::Result;
use crate::series::MaRow;
use crate::timefmt::format_ts;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};
use std::io::Write;
use std::path::Path;

pub const HEADER: [&str; 3] = ["timestamp", "ma30", "ma60"];

/// Writes `timestamp,ma30,ma60` followed by one record per row.
pub fn write_rows<W: Write>(rows: &[MaRow], sink: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(sink);
    writer.write_record(HEADER)?;
    for row in rows {
        writer.write_record([format_ts(row.timestamp), row.ma30.to_string(), row.ma60.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_table<P: AsRef<Path>>(rows: &[MaRow], destination: P) -> Result<()> {
    let file = std::fs::File::create(destination)?;
    write_rows(rows, file)
}

/// Terminal preview of the most recent `limit` rows.
pub fn preview_table(rows: &[MaRow], limit: usize) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Hour (UTC)").add_attribute(Attribute::Bold),
            Cell::new("MA30")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
            Cell::new("MA60")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
        ]);

    let start = rows.len().saturating_sub(limit);
    for row in &rows[start..] {
        // Green when the short average sits above the long one.
        let color = if row.ma30 >= row.ma60 { Color::Green } else { Color::Red };
        table.add_row(vec![
            Cell::new(format_ts(row.timestamp)).fg(Color::DarkGrey),
            Cell::new(format!("{:.4}", row.ma30))
                .fg(color)
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.4}", row.ma60)).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_738_022_400_000; // 2025-01-28 00:00 UTC

    fn rows() -> Vec<MaRow> {
        vec![
            MaRow { timestamp: T0, ma30: 10.0, ma60: 20.0 },
            MaRow { timestamp: T0 + 3_600_000, ma30: 12.5, ma60: 22.25 },
        ]
    }

    #[test]
    fn writes_header_and_hour_timestamps() {
        let mut buf = Vec::new();
        write_rows(&rows(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "timestamp,ma30,ma60\n2025012800,10,20\n2025012801,12.5,22.25\n");
    }

    #[test]
    fn empty_rows_still_get_header() {
        let mut buf = Vec::new();
        write_rows(&[], &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "timestamp,ma30,ma60\n");
    }

    #[test]
    fn writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ma.csv");
        write_table(&rows(), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("timestamp,ma30,ma60\n"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn preview_keeps_latest_rows() {
        let rendered = preview_table(&rows(), 1).to_string();
        assert!(rendered.contains("2025012801"));
        assert!(!rendered.contains("2025012800"));
    }
}

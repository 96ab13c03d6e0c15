use crate::series::{MA_LONG, MA_SHORT};
use crate::timefmt::format_naive;
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

/// First bar of the MA30 and MA60 windows ending at a given hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaStartDates {
    pub ma30_start: String,
    pub ma60_start: String,
}

/// Start of an `n`-bar hourly window that includes the bar at `end`.
pub fn window_start(end: NaiveDateTime, n: usize) -> NaiveDateTime {
    end - Duration::hours(n.saturating_sub(1) as i64)
}

pub fn window_starts(end: NaiveDateTime) -> MaStartDates {
    MaStartDates {
        ma30_start: format_naive(&window_start(end, MA_SHORT)),
        ma60_start: format_naive(&window_start(end, MA_LONG)),
    }
}

//! Chronological series building and fixed-window rolling means.

use crate::error::{PipelineError, Result};
use std::collections::{BTreeMap, VecDeque};
use ta::{Next, Reset};
use tracing::warn;

pub const MA_SHORT: usize = 30;
pub const MA_LONG: usize = 60;

/// One bar reduced to what the aggregation needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    /// Bar open time, epoch milliseconds (UTC).
    pub timestamp: i64,
    pub close: f64,
}

impl Candle {
    pub fn new(timestamp: i64, close: f64) -> Self {
        Self { timestamp, close }
    }
}

/// Candles strictly ascending by timestamp, one per timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    candles: Vec<Candle>,
    conflicts: usize,
}

impl Series {
    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Timestamps that appeared more than once with differing closes.
    pub fn conflicts(&self) -> usize {
        self.conflicts
    }
}

/// Sorts raw candles and collapses repeated timestamps, keeping the first seen.
pub fn build_series(mut raw: Vec<Candle>) -> Series {
    raw.sort_by_key(|c| c.timestamp);

    let mut candles: Vec<Candle> = Vec::with_capacity(raw.len());
    let mut conflicts = 0;
    let mut last_conflict = None;

    for candle in raw {
        match candles.last() {
            Some(prev) if prev.timestamp == candle.timestamp => {
                if prev.close != candle.close && last_conflict != Some(candle.timestamp) {
                    warn!(
                        timestamp = candle.timestamp,
                        kept = prev.close,
                        dropped = candle.close,
                        "overlapping pages disagree on close price"
                    );
                    conflicts += 1;
                    last_conflict = Some(candle.timestamp);
                }
            }
            _ => candles.push(candle),
        }
    }

    Series { candles, conflicts }
}

/// Fixed-window arithmetic mean with O(1) updates.
#[derive(Debug, Clone)]
pub struct RollingMean {
    window: usize,
    values: VecDeque<f64>,
    sum: f64,
}

impl RollingMean {
    pub fn new(window: usize) -> Result<Self> {
        if window == 0 {
            return Err(PipelineError::Config("rolling window must be at least 1".into()));
        }
        Ok(Self::fixed(window))
    }

    fn fixed(window: usize) -> Self {
        Self {
            window,
            values: VecDeque::with_capacity(window + 1),
            sum: 0.0,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

impl Next<f64> for RollingMean {
    /// `None` until `window` samples have been seen.
    type Output = Option<f64>;

    fn next(&mut self, value: f64) -> Self::Output {
        self.values.push_back(value);
        self.sum += value;
        if self.values.len() > self.window {
            if let Some(oldest) = self.values.pop_front() {
                self.sum -= oldest;
            }
        }
        (self.values.len() == self.window).then(|| self.sum / self.window as f64)
    }
}

impl Reset for RollingMean {
    fn reset(&mut self) {
        self.values.clear();
        self.sum = 0.0;
    }
}

/// Mean of the last `window` closes, keyed by the timestamp ending each window.
pub fn rolling_means(series: &Series, window: usize) -> Result<BTreeMap<i64, f64>> {
    let mut acc = RollingMean::new(window)?;
    Ok(series
        .candles()
        .iter()
        .filter_map(|c| acc.next(c.close).map(|mean| (c.timestamp, mean)))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingPoint {
    pub timestamp: i64,
    pub ma30: Option<f64>,
    pub ma60: Option<f64>,
}

/// A table row: both means populated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaRow {
    pub timestamp: i64,
    pub ma30: f64,
    pub ma60: f64,
}

/// Windows count samples, not hours: a missing bar does not reset or shorten them.
pub fn rolling_points(series: &Series) -> Vec<RollingPoint> {
    let mut short = RollingMean::fixed(MA_SHORT);
    let mut long = RollingMean::fixed(MA_LONG);

    series
        .candles()
        .iter()
        .map(|c| RollingPoint {
            timestamp: c.timestamp,
            ma30: short.next(c.close),
            ma60: long.next(c.close),
        })
        .collect()
}

/// Rows at or after `horizon_ms` where both means exist.
pub fn build_rows(series: &Series, horizon_ms: i64) -> Vec<MaRow> {
    rolling_points(series)
        .into_iter()
        .filter(|p| p.timestamp >= horizon_ms)
        .filter_map(|p| {
            Some(MaRow {
                timestamp: p.timestamp,
                ma30: p.ma30?,
                ma60: p.ma60?,
            })
        })
        .collect()
}

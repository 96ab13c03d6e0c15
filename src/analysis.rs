//! This module contains the core acquisition pipeline logic.

use crate::config::FetchConfig;
use crate::error::{PipelineError, Result};
use crate::klines::{OkxClient, PageSource};
use crate::pagination::{SeriesRequest, fetch_series};
use crate::series::{MA_LONG, MaRow, build_rows, build_series};
use crate::table::write_table;
use chrono::{DateTime, Duration, DurationRound, Utc};
use tracing::{info, warn};

/// Time bounds of one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Horizon {
    /// First hour that must appear in the output table.
    pub target_start_ms: i64,
    /// Oldest hour to fetch so the first output row has a full MA60 window.
    pub fetch_start_ms: i64,
}

impl Horizon {
    pub fn lookback(now: DateTime<Utc>, days: u32) -> Result<Self> {
        let out_of_range = || PipelineError::Config(format!("days = {days} reaches before the representable time range"));
        let now = now.duration_trunc(Duration::hours(1)).unwrap_or(now);
        let target_start = Duration::try_days(days as i64)
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or_else(out_of_range)?;
        let fetch_start = target_start
            .checked_sub_signed(Duration::hours(MA_LONG as i64 - 1))
            .ok_or_else(out_of_range)?;
        Ok(Self {
            target_start_ms: target_start.timestamp_millis(),
            fetch_start_ms: fetch_start.timestamp_millis(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub rows: Vec<MaRow>,
    pub candles_fetched: usize,
    pub conflicts: usize,
}

/// Fetch, normalize and aggregate using any page source.
pub async fn collect_rows<S: PageSource>(source: &mut S, config: &FetchConfig, horizon: Horizon) -> Result<PipelineOutput> {
    config.validate()?;

    let request = SeriesRequest {
        inst_id: &config.inst_id,
        bar: &config.bar,
        horizon_start_ms: horizon.fetch_start_ms,
        max_batches: config.max_batches,
        page_limit: config.effective_page_limit(),
    };
    let raw = fetch_series(source, &request).await?;
    if raw.is_empty() {
        return Err(PipelineError::InsufficientData(format!(
            "provider returned no candles for {}",
            config.inst_id
        )));
    }

    let candles_fetched = raw.len();
    let series = build_series(raw);
    if series.conflicts() > 0 {
        warn!(conflicts = series.conflicts(), "duplicate timestamps carried different closes");
    }

    let rows = build_rows(&series, horizon.target_start_ms);
    if rows.is_empty() {
        return Err(PipelineError::InsufficientData(
            "not enough history to compute MA30/MA60 for the requested window".into(),
        ));
    }

    Ok(PipelineOutput {
        rows,
        candles_fetched,
        conflicts: series.conflicts(),
    })
}

/// Runs the full pipeline against the network and writes the csv:
/// 1. Pages back through history until the lookback plus MA60 warm-up is covered.
/// 2. Sorts and dedupes the candles, then computes MA30/MA60.
/// 3. Writes rows inside the lookback to `config.output`.
pub async fn run_fetch_pipeline(config: &FetchConfig) -> Result<PipelineOutput> {
    config.validate()?;
    let horizon = Horizon::lookback(Utc::now(), config.days)?;
    let mut client = OkxClient::new(config)?;

    info!(
        inst_id = %config.inst_id,
        endpoint = %client.endpoint(),
        days = config.days,
        "starting fetch"
    );

    let output = collect_rows(&mut client, config, horizon).await?;
    write_table(&output.rows, &config.output)?;
    info!(rows = output.rows.len(), path = %config.output, "table written");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::klines::PageRequest;
    use crate::series::Candle;
    use chrono::TimeZone;

    const HOUR_MS: i64 = 3_600_000;

    /// Serves hourly candles of constant close from `newest` back to `oldest`.
    struct HistorySource {
        newest: i64,
        oldest: i64,
        close: f64,
    }

    impl PageSource for HistorySource {
        async fn fetch_page(&mut self, request: &PageRequest<'_>) -> Result<Vec<Candle>> {
            use crate::klines::PageCursor;
            let top = match request.cursor {
                None => self.newest,
                Some(PageCursor::Before(ts)) => ts - ts.rem_euclid(HOUR_MS),
                Some(PageCursor::After(ts)) => ts - HOUR_MS,
            };
            Ok((0..request.limit as i64)
                .map(|i| top - i * HOUR_MS)
                .take_while(|&ts| ts >= self.oldest)
                .map(|ts| Candle::new(ts, self.close))
                .collect())
        }
    }

    #[test]
    fn lookback_adds_ma60_warmup() {
        let now = Utc.with_ymd_and_hms(2025, 1, 31, 16, 42, 7).unwrap();
        let horizon = Horizon::lookback(now, 3).unwrap();
        let target = Utc.with_ymd_and_hms(2025, 1, 28, 16, 0, 0).unwrap();
        assert_eq!(horizon.target_start_ms, target.timestamp_millis());
        assert_eq!(horizon.target_start_ms - horizon.fetch_start_ms, 59 * HOUR_MS);
    }

    #[test]
    fn huge_lookback_is_config_error() {
        let err = Horizon::lookback(Utc::now(), u32::MAX).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[tokio::test]
    async fn constant_history_gives_constant_rows() {
        let newest = 2_000 * HOUR_MS;
        let horizon = Horizon {
            target_start_ms: newest - 48 * HOUR_MS,
            fetch_start_ms: newest - 107 * HOUR_MS,
        };
        let mut source = HistorySource {
            newest,
            oldest: 0,
            close: 42.0,
        };

        let output = collect_rows(&mut source, &FetchConfig::default(), horizon).await.unwrap();
        assert_eq!(output.rows.len(), 49);
        assert!(output.rows.iter().all(|r| r.ma30 == 42.0 && r.ma60 == 42.0));
        assert_eq!(output.rows[0].timestamp, horizon.target_start_ms);
        assert_eq!(output.conflicts, 0);
    }

    #[tokio::test]
    async fn short_history_is_insufficient() {
        let newest = 2_000 * HOUR_MS;
        let horizon = Horizon {
            target_start_ms: newest - 10 * HOUR_MS,
            fetch_start_ms: newest - 69 * HOUR_MS,
        };
        // Only 20 bars exist, so no MA60 can be formed.
        let mut source = HistorySource {
            newest,
            oldest: newest - 19 * HOUR_MS,
            close: 1.0,
        };
        let err = collect_rows(&mut source, &FetchConfig::default(), horizon).await.unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData(_)));
    }

    #[tokio::test]
    async fn no_candles_is_insufficient() {
        let mut source = HistorySource {
            newest: 0,
            oldest: 1,
            close: 1.0,
        };
        let horizon = Horizon {
            target_start_ms: 0,
            fetch_start_ms: 0,
        };
        let err = collect_rows(&mut source, &FetchConfig::default(), horizon).await.unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData(msg) if msg.contains("no candles")));
    }

    #[tokio::test]
    async fn invalid_config_fails_before_fetching() {
        let mut source = HistorySource {
            newest: 0,
            oldest: 0,
            close: 1.0,
        };
        let config = FetchConfig {
            max_batches: 0,
            ..FetchConfig::default()
        };
        let horizon = Horizon {
            target_start_ms: 0,
            fetch_start_ms: 0,
        };
        let err = collect_rows(&mut source, &config, horizon).await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}

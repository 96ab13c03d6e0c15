//! Cursor-driven pagination until a historical horizon is covered.
//!
//! The provider pages newest-first and its `before` cursor can stall,
//! handing back the same page again. The driver then falls back to
//! `after` paging from the stuck timestamp; a second stall is fatal.

use crate::error::{PipelineError, Result};
use crate::klines::{PageCursor, PageRequest, PageSource};
use crate::series::Candle;
use crate::timefmt::format_ts;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMode {
    Before,
    After,
}

/// Pagination state owned by one `fetch_series` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationCursor {
    pub mode: PageMode,
    pub anchor: Option<i64>,
    pub last_oldest_seen: Option<i64>,
    pub batches_issued: u32,
}

/// Outcome of feeding one non-empty batch to the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Continue(PaginationCursor),
    Done,
}

impl Default for PaginationCursor {
    fn default() -> Self {
        Self::start()
    }
}

impl PaginationCursor {
    pub fn start() -> Self {
        Self {
            mode: PageMode::Before,
            anchor: None,
            last_oldest_seen: None,
            batches_issued: 0,
        }
    }

    /// Cursor parameter for the next request, if any.
    pub fn page_cursor(&self) -> Option<PageCursor> {
        self.anchor.map(|ts| match self.mode {
            PageMode::Before => PageCursor::Before(ts),
            PageMode::After => PageCursor::After(ts),
        })
    }

    /// Counts one more request against the ceiling.
    pub fn issue(self, max_batches: u32) -> Result<Self> {
        let batches_issued = self.batches_issued + 1;
        if batches_issued > max_batches {
            return Err(PipelineError::ExcessivePagination { max_batches });
        }
        Ok(Self { batches_issued, ..self })
    }

    /// Next state given the oldest timestamp of the batch just received.
    pub fn advance(self, oldest_ts: i64, horizon_start_ms: i64) -> Result<Transition> {
        if let Some(last) = self.last_oldest_seen {
            if oldest_ts >= last {
                return match self.mode {
                    PageMode::Before => Ok(Transition::Continue(Self {
                        mode: PageMode::After,
                        anchor: Some(oldest_ts),
                        last_oldest_seen: None,
                        ..self
                    })),
                    PageMode::After => Err(PipelineError::PaginationStalled { timestamp: oldest_ts }),
                };
            }
        }

        if oldest_ts <= horizon_start_ms {
            return Ok(Transition::Done);
        }

        let anchor = match self.mode {
            PageMode::Before => oldest_ts - 1,
            PageMode::After => oldest_ts,
        };
        Ok(Transition::Continue(Self {
            anchor: Some(anchor),
            last_oldest_seen: Some(oldest_ts),
            ..self
        }))
    }
}

#[derive(Debug, Clone)]
pub struct SeriesRequest<'a> {
    pub inst_id: &'a str,
    pub bar: &'a str,
    pub horizon_start_ms: i64,
    pub max_batches: u32,
    pub page_limit: u32,
}

/// Pages backwards until the horizon is covered or history runs out.
/// Returns the raw candles in the order received.
pub async fn fetch_series<S: PageSource>(source: &mut S, request: &SeriesRequest<'_>) -> Result<Vec<Candle>> {
    let mut candles = Vec::new();
    let mut cursor = PaginationCursor::start();

    loop {
        cursor = cursor.issue(request.max_batches)?;
        let page = PageRequest {
            inst_id: request.inst_id,
            bar: request.bar,
            limit: request.page_limit,
            cursor: cursor.page_cursor(),
        };

        let batch = source.fetch_page(&page).await?;
        let (Some(oldest), Some(newest)) = (
            batch.iter().map(|c| c.timestamp).min(),
            batch.iter().map(|c| c.timestamp).max(),
        ) else {
            info!(batch = cursor.batches_issued, "empty page, no more history");
            break;
        };

        info!(
            batch = cursor.batches_issued,
            mode = ?cursor.mode,
            newest = %format_ts(newest),
            oldest = %format_ts(oldest),
            "page received"
        );
        candles.extend(batch);

        match cursor.advance(oldest, request.horizon_start_ms)? {
            Transition::Continue(next) => {
                if next.mode != cursor.mode {
                    warn!(stuck_at = oldest, "before-pagination stalled, switching to after mode");
                }
                cursor = next;
            }
            Transition::Done => break,
        }
    }

    Ok(candles)
}

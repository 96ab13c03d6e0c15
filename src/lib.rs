//! Hourly candle acquisition and MA30/MA60 aggregation.
//!
//! Pipeline: [`pagination::fetch_series`] drives a [`klines::PageSource`]
//! back to a horizon, [`series`] sorts the samples and computes rolling
//! means, and [`table`] writes the `timestamp,ma30,ma60` csv. [`window`]
//! and [`ma_trend`] are the two stateless entry points used by callers
//! that only need date arithmetic or a trend read-out.

pub mod analysis;
pub mod config;
pub mod error;
pub mod klines;
pub mod ma_trend;
pub mod pagination;
pub mod series;
pub mod table;
pub mod timefmt;
pub mod window;

pub use error::{PipelineError, Result};

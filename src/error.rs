//! Error types for the acquisition pipeline.

use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Every failure the pipeline can surface. Network, provider and
/// internal-logic faults are kept in separate variants.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Transport kept failing until the retry budget ran out.
    #[error("network exhausted after {attempts} attempt(s): {cause}; check network, proxy or firewall and retry later")]
    NetworkExhausted { attempts: u32, cause: String },

    /// Payload carried a non-success status code.
    #[error("provider rejected request (code {code}): {message}")]
    ProviderRejected { code: String, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("pagination stalled at {timestamp}, provider returned duplicate data")]
    PaginationStalled { timestamp: i64 },

    #[error("excessive pagination (more than {max_batches} batches), possible API anomaly")]
    ExcessivePagination { max_batches: u32 },

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid timestamp {input:?}: expected YYYYMMDDHH, e.g. 2025012816")]
    TimestampFormat { input: String },

    /// Content error in an MA csv file. `row` is 1-based, the header being row 1.
    #[error("ma csv row {row}: {message}")]
    MaCsv { row: usize, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Building the HTTP client failed (bad proxy url, TLS backend).
    #[error("http client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl PipelineError {
    /// True when the failure came from the network, so rerunning the whole
    /// fetch later may succeed. Provider and logic faults are final.
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::NetworkExhausted { .. })
    }
}

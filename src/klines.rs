//! HTTP fetch client for the paginated history-candles endpoint.

use crate::config::FetchConfig;
use crate::error::{PipelineError, Result};
use crate::series::Candle;
use reqwest::{Client, Proxy, tls};
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub const ENDPOINT: &str = "/api/v5/market/history-candles";

const TS_INDEX: usize = 0;
const CLOSE_INDEX: usize = 4;

/// Boundary passed to the provider. Exactly one is sent per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCursor {
    Before(i64),
    After(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest<'a> {
    pub inst_id: &'a str,
    pub bar: &'a str,
    pub limit: u32,
    pub cursor: Option<PageCursor>,
}

impl PageRequest<'_> {
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("instId", self.inst_id.to_string()),
            ("bar", self.bar.to_string()),
            ("limit", self.limit.to_string()),
        ];
        match self.cursor {
            Some(PageCursor::Before(ts)) => query.push(("before", ts.to_string())),
            Some(PageCursor::After(ts)) => query.push(("after", ts.to_string())),
            None => {}
        }
        query
    }
}

/// Anything that can serve one page of candles, newest first.
pub trait PageSource {
    fn fetch_page(&mut self, request: &PageRequest<'_>) -> impl Future<Output = Result<Vec<Candle>>>;
}

#[derive(Deserialize, Debug)]
struct Envelope {
    #[serde(default)]
    code: Value,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Linear backoff, clamped instead of overflowing.
fn retry_delay(backoff: Duration, attempt: u32) -> Duration {
    backoff.saturating_mul(attempt)
}

/// Runs a transport operation up to `attempts` times, sleeping
/// `backoff * attempt` (saturating) between tries. The last failure becomes
/// `NetworkExhausted` naming its cause.
pub async fn with_retries<T, E, F, Fut>(attempts: u32, backoff: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => {
                return Err(PipelineError::NetworkExhausted {
                    attempts,
                    cause: e.to_string(),
                });
            }
            Err(e) => {
                warn!(attempt, attempts, error = %e, "request failed, retrying");
                tokio::time::sleep(retry_delay(backoff, attempt)).await;
                attempt += 1;
            }
        }
    }
}

// Cells arrive as strings, but accept bare numbers too.
fn cell_i64(cell: &Value) -> Option<i64> {
    match cell {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

fn cell_f64(cell: &Value) -> Option<f64> {
    match cell {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Decodes a response body into candles, checking the embedded status code.
pub fn parse_payload(body: &[u8]) -> Result<Vec<Candle>> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| PipelineError::MalformedResponse(format!("body is not a json object: {e}")))?;

    let success = matches!(&envelope.code, Value::String(code) if code == "0");
    if !success {
        let code = match &envelope.code {
            Value::String(s) => s.clone(),
            Value::Null => "missing".to_string(),
            other => other.to_string(),
        };
        let message = envelope
            .msg
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(PipelineError::ProviderRejected { code, message });
    }

    let Value::Array(rows) = envelope.data else {
        return Err(PipelineError::MalformedResponse(
            "data field is not a sequence".to_string(),
        ));
    };

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let cells = row
                .as_array()
                .filter(|cells| cells.len() > CLOSE_INDEX)
                .ok_or_else(|| PipelineError::MalformedResponse(format!("row {i} is not a candle array")))?;
            let timestamp = cell_i64(&cells[TS_INDEX])
                .ok_or_else(|| PipelineError::MalformedResponse(format!("row {i} has a bad timestamp")))?;
            let close = cell_f64(&cells[CLOSE_INDEX])
                .ok_or_else(|| PipelineError::MalformedResponse(format!("row {i} has a bad close price")))?;
            Ok(Candle::new(timestamp, close))
        })
        .collect()
}

/// Network-backed page source.
pub struct OkxClient {
    client: Client,
    base_url: String,
    attempts: u32,
    backoff: Duration,
}

impl OkxClient {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(config.timeout())
            .user_agent("ma-horizon")
            .min_tls_version(tls::Version::TLS_1_2);

        if config.insecure {
            warn!("TLS certificate validation disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        // Only an explicitly configured proxy is used; environment proxies are ignored.
        builder = match config.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(proxy) => builder.proxy(Proxy::all(proxy)?),
            None => builder.no_proxy(),
        };

        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            attempts: config.attempts(),
            backoff: config.retry_backoff(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, ENDPOINT)
    }
}

impl PageSource for OkxClient {
    async fn fetch_page(&mut self, request: &PageRequest<'_>) -> Result<Vec<Candle>> {
        let url = self.endpoint();
        let query = request.query();
        let client = &self.client;
        let (url, query) = (url.as_str(), &query);

        let body = with_retries(self.attempts, self.backoff, || async move {
            client
                .get(url)
                .query(query)
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await
        })
        .await?;

        parse_payload(&body)
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Response headers captured from every received response
pub const RATE_LIMIT_HEADERS: [&str; 3] = ["Retry-After", "X-RateLimit-Limit", "X-RateLimit-Remaining"];

/// Identifier assigned to a load test by the orchestrator
pub type TestId = String;

/// HTTP method used for every request of a test
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// Upper bounds applied when validating a [`TestConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestLimits {
    pub max_requests: u32,
    pub max_concurrency: u32,
}

impl Default for TestLimits {
    fn default() -> Self {
        Self {
            max_requests: 1000,
            max_concurrency: 50,
        }
    }
}

impl TestLimits {
    /// Limits that may be tighter than the defaults but never looser
    pub fn capped(max_requests: u32, max_concurrency: u32) -> Self {
        let ceiling = Self::default();
        Self {
            max_requests: max_requests.min(ceiling.max_requests),
            max_concurrency: max_concurrency.min(ceiling.max_concurrency),
        }
    }
}

/// Rejected load test configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request_count must be between 1 and {max}, got {got}")]
    RequestCountOutOfRange { got: u32, max: u32 },

    #[error("concurrency must be between 1 and {max}, got {got}")]
    ConcurrencyOutOfRange { got: u32, max: u32 },
}

/// Parameters of a single load test. Immutable once the test is dispatched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestConfig {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default = "default_request_count")]
    pub request_count: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

fn default_request_count() -> u32 {
    50
}

fn default_concurrency() -> u32 {
    10
}

impl TestConfig {
    pub fn new(url: impl Into<String>, method: HttpMethod, request_count: u32, concurrency: u32) -> Self {
        Self {
            url: url.into(),
            method,
            request_count,
            concurrency,
        }
    }

    /// Check the configuration against `limits`.
    ///
    /// Only absolute `http`/`https` URLs with a host are accepted.
    pub fn validate(&self, limits: &TestLimits) -> Result<(), ConfigError> {
        let parsed = url::Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: self.url.clone(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(ConfigError::InvalidUrl {
                url: self.url.clone(),
                reason: "missing host".to_string(),
            });
        }

        if self.request_count == 0 || self.request_count > limits.max_requests {
            return Err(ConfigError::RequestCountOutOfRange {
                got: self.request_count,
                max: limits.max_requests,
            });
        }
        if self.concurrency == 0 || self.concurrency > limits.max_concurrency {
            return Err(ConfigError::ConcurrencyOutOfRange {
                got: self.concurrency,
                max: limits.max_concurrency,
            });
        }
        Ok(())
    }
}

/// Outcome of one HTTP request fired by the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestResult {
    /// HTTP status, or 0 when the request never got a response
    pub status_code: u16,
    pub response_time_ms: f64,
    /// Request start, seconds since the Unix epoch
    pub timestamp: f64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub rate_limit_headers: BTreeMap<String, Option<String>>,
}

impl RequestResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.status_code >= 400
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status_code == 429
    }
}

/// One synchronized group of requests, as appended to the result log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchResult {
    pub test_id: TestId,
    pub batch_number: u32,
    pub results: Vec<RequestResult>,
    /// Advisory only; completion is signalled by the store's completion flag
    #[serde(default)]
    pub is_complete: bool,
}

/// Messages pushed to a live stream subscriber besides the raw batches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamMessage {
    /// Terminal marker, sent exactly once after the last batch
    TestComplete { test_id: TestId },
}

/// Response for POST /api/run-test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartTestResponse {
    pub test_id: TestId,
    pub status: String,
    pub message: String,
}

impl StartTestResponse {
    pub fn started(test_id: TestId) -> Self {
        Self {
            test_id,
            status: "started".to_string(),
            message: "Load test queued successfully.".to_string(),
        }
    }
}

/// Response-time distribution in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseTimes {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Aggregate statistics for a finished (or running) test
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestSummary {
    pub total_requests: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub rate_limit_hits: usize,
    pub response_times: ResponseTimes,
}

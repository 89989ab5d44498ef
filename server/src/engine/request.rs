//! A single timed HTTP request

use crate::protocol::{RATE_LIMIT_HEADERS, RequestResult};
use metrics::{counter, histogram};
use reqwest::{Client, Method, header::HeaderMap};
use std::collections::BTreeMap;
use std::error::Error as _;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch as a float
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn capture_rate_limit_headers(headers: &HeaderMap) -> BTreeMap<String, Option<String>> {
    RATE_LIMIT_HEADERS
        .iter()
        .map(|name| {
            let value = headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            (name.to_string(), value)
        })
        .collect()
}

/// Human-readable description of a transport failure, including the
/// underlying cause chain (reqwest's own message omits it).
pub fn describe_transport_error(e: &reqwest::Error) -> String {
    let kind = if e.is_timeout() {
        "request timed out"
    } else if e.is_connect() {
        "connection failed"
    } else if e.is_body() || e.is_decode() {
        "failed to read response body"
    } else if e.is_redirect() {
        "redirect error"
    } else {
        "request failed"
    };

    let mut message = format!("{}: {}", kind, e);
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn transport_failure(timestamp: f64, start: Instant, e: &reqwest::Error) -> RequestResult {
    counter!("ratescope_requests_total", "outcome" => "transport_error").increment(1);
    RequestResult {
        status_code: 0,
        response_time_ms: round2(start.elapsed().as_secs_f64() * 1000.0),
        timestamp,
        error: Some(describe_transport_error(e)),
        rate_limit_headers: BTreeMap::new(),
    }
}

/// Fire one request and record its outcome. Never fails: transport errors
/// become a result with `status_code == 0` and `error` set.
///
/// The elapsed time covers the full response body, so a body that stalls past
/// the client timeout is reported as a failure.
pub async fn fire_request(client: &Client, method: Method, url: &str) -> RequestResult {
    let timestamp = unix_now();
    let start = Instant::now();

    let response = match client.request(method, url).send().await {
        Ok(response) => response,
        Err(e) => return transport_failure(timestamp, start, &e),
    };

    let status_code = response.status().as_u16();
    let rate_limit_headers = capture_rate_limit_headers(response.headers());

    if let Err(e) = response.bytes().await {
        return transport_failure(timestamp, start, &e);
    }

    let elapsed = start.elapsed();
    counter!("ratescope_requests_total", "outcome" => "response").increment(1);
    histogram!("ratescope_request_duration_seconds").record(elapsed);

    RequestResult {
        status_code,
        response_time_ms: round2(elapsed.as_secs_f64() * 1000.0),
        timestamp,
        error: None,
        rate_limit_headers,
    }
}

//! Load test execution engine
//!
//! Fires `request_count` requests in sequential batches of at most
//! `concurrency` concurrent requests. Each batch is a barrier: batch N+1 starts
//! only after every request of batch N has finished. Every finished batch is
//! appended to the result store, and the completion flag is set once the last
//! append has returned.

mod request;

pub use request::{describe_transport_error, fire_request, round2, unix_now};

use crate::protocol::{BatchResult, HttpMethod, TestConfig};
use crate::store::{ResultStore, StoreError};
use futures_util::future::join_all;
use metrics::counter;
use reqwest::{Client, Method};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Engine-level failures. Per-request failures are data, not errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Result store error: {0}")]
    Store(#[from] StoreError),
}

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Timeout applied to every individual request
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// What a finished run produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineReport {
    pub batches: u32,
    pub requests: u32,
    pub transport_failures: u32,
}

/// Sizes of the batches a test is split into
pub fn batch_sizes(request_count: u32, concurrency: u32) -> Vec<u32> {
    let concurrency = concurrency.max(1);
    let mut sizes = Vec::with_capacity(request_count.div_ceil(concurrency) as usize);
    let mut requests_left = request_count;
    while requests_left > 0 {
        let batch_size = requests_left.min(concurrency);
        sizes.push(batch_size);
        requests_left -= batch_size;
    }
    sizes
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
    }
}

/// Runs load tests and writes their results to a [`ResultStore`]
pub struct LoadTestEngine {
    store: Arc<dyn ResultStore>,
    config: EngineConfig,
}

impl LoadTestEngine {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<dyn ResultStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Whether a run for `test_id` has already written anything
    pub async fn has_run(&self, test_id: &str) -> Result<bool, StoreError> {
        Ok(self.store.len(test_id).await? > 0 || self.store.is_complete(test_id).await?)
    }

    /// One pooled client per run, so every request in the test reuses
    /// connections. Dropped when the run returns.
    fn build_client(&self, concurrency: u32) -> Result<Client, reqwest::Error> {
        Client::builder()
            .timeout(self.config.request_timeout)
            .pool_max_idle_per_host(concurrency as usize)
            .build()
    }

    /// Execute a load test to completion.
    ///
    /// On `Err` the completion flag is left unset and the test stays in
    /// progress for observers.
    pub async fn run(&self, test_id: &str, config: &TestConfig) -> Result<EngineReport, EngineError> {
        let started = Instant::now();
        info!(
            "Starting load test {}: {} {} x{} (concurrency {})",
            test_id,
            config.method.as_str(),
            config.url,
            config.request_count,
            config.concurrency
        );

        let client = self.build_client(config.concurrency)?;
        let method = to_reqwest_method(config.method);

        let mut report = EngineReport {
            batches: 0,
            requests: 0,
            transport_failures: 0,
        };
        for (batch_size, batch_number) in batch_sizes(config.request_count, config.concurrency)
            .into_iter()
            .zip(1..)
        {
            let requests =
                (0..batch_size).map(|_| fire_request(&client, method.clone(), &config.url));
            let results = join_all(requests).await;

            let failures = results.iter().filter(|r| r.status_code == 0).count() as u32;
            let batch = BatchResult {
                test_id: test_id.to_string(),
                batch_number,
                results,
                is_complete: false,
            };
            self.store.append(test_id, &batch).await?;
            counter!("ratescope_batches_appended_total").increment(1);
            debug!(
                "Test {} batch {} appended ({} requests, {} transport failures)",
                test_id, batch_number, batch_size, failures
            );

            report.batches += 1;
            report.requests += batch_size;
            report.transport_failures += failures;
        }

        self.store.mark_complete(test_id).await?;

        info!(
            "Load test {} complete: {} requests in {} batches, {} transport failures, {:?}",
            test_id,
            report.requests,
            report.batches,
            report.transport_failures,
            started.elapsed()
        );
        Ok(report)
    }
}

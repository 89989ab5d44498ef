//! Aggregate statistics over a test's full result log

use crate::engine::round2;
use crate::protocol::{BatchResult, RequestResult, ResponseTimes, TestSummary};
use crate::store::{ResultStore, StoreError};

/// Nearest-rank percentile over an ascending-sorted slice: the element at
/// `floor(len * p)`, clamped to the last index. No interpolation.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (sorted.len() as f64 * p).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn response_times(results: &[&RequestResult]) -> ResponseTimes {
    let mut sorted: Vec<f64> = results.iter().map(|r| r.response_time_ms).collect();
    sorted.sort_by(f64::total_cmp);

    let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
        return ResponseTimes {
            min: 0.0,
            max: 0.0,
            avg: 0.0,
            p50: 0.0,
            p95: 0.0,
            p99: 0.0,
        };
    };

    ResponseTimes {
        min,
        max,
        avg: round2(sorted.iter().sum::<f64>() / sorted.len() as f64),
        p50: percentile(&sorted, 0.50),
        p95: percentile(&sorted, 0.95),
        p99: percentile(&sorted, 0.99),
    }
}

/// Summarize batches in log order. `None` when there are no results at all.
pub fn summarize_batches(batches: &[BatchResult]) -> Option<TestSummary> {
    let results: Vec<&RequestResult> = batches.iter().flat_map(|b| &b.results).collect();
    if results.is_empty() {
        return None;
    }

    Some(TestSummary {
        total_requests: results.len(),
        success_count: results.iter().filter(|r| r.is_success()).count(),
        error_count: results.iter().filter(|r| r.is_error()).count(),
        rate_limit_hits: results.iter().filter(|r| r.is_rate_limited()).count(),
        response_times: response_times(&results),
    })
}

/// Read the whole log for `test_id` and summarize it.
///
/// Returns `Ok(None)` for unknown tests and tests with no batches yet.
pub async fn summarize(
    store: &dyn ResultStore,
    test_id: &str,
) -> Result<Option<TestSummary>, StoreError> {
    let batches = store.all(test_id).await?;
    Ok(summarize_batches(&batches))
}

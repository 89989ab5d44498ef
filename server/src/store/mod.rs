//! Result store: an ordered append-only log of batches per test plus a
//! completion flag.
//!
//! The engine is the only writer for a given test id; the relay and the
//! summary aggregator only read.

mod memory;
mod redis_store;

pub use memory::MemoryResultStore;
pub use redis_store::{RedisResultStore, complete_key, results_key};

use crate::protocol::BatchResult;
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a result store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Corrupt log entry for test {test_id}: {reason}")]
    Corrupt { test_id: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Append a batch to the end of the test's log
    async fn append(&self, test_id: &str, batch: &BatchResult) -> Result<(), StoreError>;

    /// Number of batches currently in the test's log (0 for unknown tests)
    async fn len(&self, test_id: &str) -> Result<usize, StoreError>;

    /// Batches in `[from, to)`, in append order. Out-of-range bounds are clamped.
    async fn range(&self, test_id: &str, from: usize, to: usize)
    -> Result<Vec<BatchResult>, StoreError>;

    /// Whether the completion flag has been set
    async fn is_complete(&self, test_id: &str) -> Result<bool, StoreError>;

    /// Set the completion flag. Must only be called after the final append.
    async fn mark_complete(&self, test_id: &str) -> Result<(), StoreError>;

    /// Liveness probe for the health endpoint
    async fn ping(&self) -> Result<(), StoreError>;

    /// The whole log for a test
    async fn all(&self, test_id: &str) -> Result<Vec<BatchResult>, StoreError> {
        let len = self.len(test_id).await?;
        self.range(test_id, 0, len).await
    }

    /// Backend name for logs and the health endpoint
    fn backend_name(&self) -> &'static str;
}

//! Test orchestration: id allocation and hand-off to the worker pool

mod pool;

pub use pool::WorkerPool;

use crate::protocol::{StartTestResponse, TestConfig, TestId};
use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// A load test waiting to be executed
#[derive(Debug, Clone)]
pub struct LoadTestJob {
    pub test_id: TestId,
    pub config: TestConfig,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Job queue is full")]
    QueueFull,

    #[error("Dispatcher unavailable: {0}")]
    Unavailable(String),

    #[error("Test {0} was already dispatched")]
    Duplicate(TestId),
}

/// Moves a job to an execution context. Each test id runs at most once.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn submit(&self, job: LoadTestJob) -> Result<(), DispatchError>;
}

/// Accepts validated configurations and queues them for execution
pub struct TestOrchestrator {
    dispatcher: Arc<dyn Dispatcher>,
}

impl TestOrchestrator {
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Allocate a test id and queue the test. Returns without waiting for any
    /// request to be sent.
    pub async fn start_test(&self, config: TestConfig) -> Result<StartTestResponse, DispatchError> {
        let test_id = Uuid::new_v4().to_string();
        let job = LoadTestJob {
            test_id: test_id.clone(),
            config,
        };

        if let Err(e) = self.dispatcher.submit(job).await {
            warn!("Failed to dispatch test {}: {}", test_id, e);
            return Err(e);
        }

        counter!("ratescope_tests_started_total").increment(1);
        info!("Queued load test {}", test_id);
        Ok(StartTestResponse::started(test_id))
    }
}

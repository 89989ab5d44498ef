use crate::orchestrator::{Dispatcher, TestOrchestrator};
use crate::protocol::TestLimits;
use crate::store::ResultStore;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ResultStore>,
    pub orchestrator: Arc<TestOrchestrator>,
    pub limits: TestLimits,
    pub poll_interval: Duration,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn ResultStore>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            store,
            orchestrator: Arc::new(TestOrchestrator::new(dispatcher)),
            limits: TestLimits::default(),
            poll_interval: Duration::from_millis(500),
            started_at: Instant::now(),
        }
    }

    pub fn with_limits(mut self, limits: TestLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

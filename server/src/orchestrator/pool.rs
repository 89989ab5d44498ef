use super::{DispatchError, Dispatcher, LoadTestJob};
use crate::engine::LoadTestEngine;
use async_trait::async_trait;
use dashmap::DashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// In-process job queue drained by a fixed number of worker tasks.
///
/// Every queued job is received by exactly one worker. A test id is refused
/// while it is queued or running, and afterwards once the store holds results
/// for it, so each test executes at most once.
pub struct WorkerPool {
    queue: mpsc::Sender<LoadTestJob>,
    // Held so the queue stays open even with zero workers
    _pending: Arc<Mutex<mpsc::Receiver<LoadTestJob>>>,
    engine: Arc<LoadTestEngine>,
    /// Ids queued or running; removed once the run returns
    in_flight: Arc<DashSet<String>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(engine: Arc<LoadTestEngine>, worker_count: usize, queue_capacity: usize) -> Self {
        let (queue, rx) = mpsc::channel(queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let in_flight = Arc::new(DashSet::new());

        let workers = (0..worker_count)
            .map(|worker_id| {
                let rx = rx.clone();
                let engine = engine.clone();
                let in_flight = in_flight.clone();
                tokio::spawn(async move { worker_loop(worker_id, rx, engine, in_flight).await })
            })
            .collect();

        info!(
            "Started worker pool: {} workers, queue capacity {}",
            worker_count,
            queue_capacity.max(1)
        );

        Self {
            queue,
            _pending: rx,
            engine,
            in_flight,
            workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Tests currently queued or running
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<LoadTestJob>>>,
    engine: Arc<LoadTestEngine>,
    in_flight: Arc<DashSet<String>>,
) {
    loop {
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else {
            debug!("Worker {} stopping: queue closed", worker_id);
            return;
        };

        debug!("Worker {} picked up test {}", worker_id, job.test_id);
        // Errors leave the completion flag unset; the test stays in progress
        if let Err(e) = engine.run(&job.test_id, &job.config).await {
            error!("Load test {} aborted: {}", job.test_id, e);
        }
        in_flight.remove(&job.test_id);
    }
}

#[async_trait]
impl Dispatcher for WorkerPool {
    async fn submit(&self, job: LoadTestJob) -> Result<(), DispatchError> {
        let test_id = job.test_id.clone();
        if !self.in_flight.insert(test_id.clone()) {
            return Err(DispatchError::Duplicate(test_id));
        }

        // A finished run leaves results behind before its id leaves `in_flight`
        match self.engine.has_run(&test_id).await {
            Ok(false) => {}
            Ok(true) => {
                self.in_flight.remove(&test_id);
                return Err(DispatchError::Duplicate(test_id));
            }
            Err(e) => {
                self.in_flight.remove(&test_id);
                return Err(DispatchError::Unavailable(e.to_string()));
            }
        }

        if let Err(e) = self.queue.try_send(job) {
            self.in_flight.remove(&test_id);
            return Err(match e {
                mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
                // The pool holds a receiver for its whole lifetime
                mpsc::error::TrySendError::Closed(_) => {
                    DispatchError::Unavailable("job queue closed".to_string())
                }
            });
        }
        Ok(())
    }
}

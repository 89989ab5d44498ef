//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules: a target HTTP server
//! for the engine to load, and the Ratescope app wired to an in-memory store.

#![allow(dead_code)]

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
};
use ratescope_server::server::{AppState, api_routes};
use ratescope_server::{EngineConfig, LoadTestEngine, MemoryResultStore, WorkerPool};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Counters kept by the target server
#[derive(Default)]
pub struct TargetStats {
    pub hits: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl TargetStats {
    fn enter(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// HTTP server the load tests are pointed at
pub struct TargetServer {
    pub addr: SocketAddr,
    pub stats: Arc<TargetStats>,
    handle: JoinHandle<()>,
}

impl TargetServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TargetServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn ok(State(stats): State<Arc<TargetStats>>) -> (HeaderMap, &'static str) {
    stats.enter();
    stats.exit();
    let mut headers = HeaderMap::new();
    headers.insert("X-RateLimit-Limit", HeaderValue::from_static("100"));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("99"));
    (headers, "ok")
}

async fn limited(State(stats): State<Arc<TargetStats>>) -> (StatusCode, HeaderMap, &'static str) {
    stats.enter();
    stats.exit();
    let mut headers = HeaderMap::new();
    headers.insert("Retry-After", HeaderValue::from_static("1"));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
    (StatusCode::TOO_MANY_REQUESTS, headers, "slow down")
}

async fn slow(State(stats): State<Arc<TargetStats>>) -> &'static str {
    stats.enter();
    tokio::time::sleep(Duration::from_secs(3)).await;
    stats.exit();
    "finally"
}

async fn tracked(State(stats): State<Arc<TargetStats>>) -> &'static str {
    stats.enter();
    tokio::time::sleep(Duration::from_millis(40)).await;
    stats.exit();
    "tracked"
}

/// Start a target server on a random port.
///
/// Routes: `/ok` (200 with rate-limit headers), `/limited` (429 with
/// `Retry-After`), `/slow` (answers after 3s), `/tracked` (200 after 40ms,
/// recording concurrent requests), `/post-only` (POST only).
pub async fn start_target_server() -> TargetServer {
    let stats = Arc::new(TargetStats::default());
    let app = Router::new()
        .route("/ok", get(ok))
        .route("/limited", get(limited))
        .route("/slow", get(slow))
        .route("/tracked", get(tracked))
        .route("/post-only", post(ok))
        .with_state(stats.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TargetServer {
        addr,
        stats,
        handle,
    }
}

/// URL on which nothing is listening
pub fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/", addr)
}

/// Ratescope app wired to an in-memory store
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryResultStore>,
}

/// Options for [`create_test_app`]
pub struct TestAppOptions {
    pub workers: usize,
    pub queue_capacity: usize,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for TestAppOptions {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 16,
            request_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(25),
        }
    }
}

/// Create a test application router with state
pub fn create_test_app(options: TestAppOptions) -> TestApp {
    let store = Arc::new(MemoryResultStore::new());
    let engine = Arc::new(LoadTestEngine::with_config(
        store.clone(),
        EngineConfig {
            request_timeout: options.request_timeout,
        },
    ));
    let pool = Arc::new(WorkerPool::start(
        engine,
        options.workers,
        options.queue_capacity,
    ));

    let state = AppState::new(store.clone(), pool).with_poll_interval(options.poll_interval);
    let router = api_routes(state.clone(), &["*".to_string()]);

    TestApp {
        router,
        state,
        store,
    }
}

/// Serve a test app on a random port
pub async fn start_app_server(app: &TestApp) -> (SocketAddr, JoinHandle<()>) {
    let router = app.router.clone();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (addr, handle)
}

/// Initialize test logging for detailed output
pub fn init_test_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ratescope=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

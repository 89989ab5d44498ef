use axum::{Router, response::IntoResponse, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use ratescope_server::config::{Config, StoreBackend};
use ratescope_server::server::{AppState, api_routes};
use ratescope_server::{
    EngineConfig, LoadTestEngine, MemoryResultStore, RedisResultStore, ResultStore, WorkerPool,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prometheus metrics handle for exposing metrics in Prometheus format
static PROMETHEUS_HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();

/// Initialize the Prometheus metrics recorder
fn setup_prometheus_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Endpoint to expose metrics in Prometheus format
async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn ResultStore>> {
    let store: Arc<dyn ResultStore> = match config.store.backend {
        StoreBackend::Memory => {
            info!("Using in-memory result store");
            Arc::new(MemoryResultStore::new())
        }
        StoreBackend::Redis => Arc::new(RedisResultStore::connect(&config.store.redis_url).await?),
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize Prometheus metrics recorder (must be done before any metrics are recorded)
    let prometheus_handle = setup_prometheus_metrics();
    PROMETHEUS_HANDLE.set(prometheus_handle).ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ratescope=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        "Loaded configuration: host={}, port={}",
        config.host, config.port
    );
    info!(
        "Limits: max_requests={}, max_concurrency={}, request_timeout={:?}",
        config.load_test.max_requests,
        config.load_test.max_concurrency,
        config.load_test.request_timeout
    );

    let store = build_store(&config).await?;

    let engine = Arc::new(LoadTestEngine::with_config(
        store.clone(),
        EngineConfig {
            request_timeout: config.load_test.request_timeout,
        },
    ));
    let pool = Arc::new(WorkerPool::start(
        engine,
        config.load_test.worker_count,
        config.load_test.queue_capacity,
    ));

    let app_state = AppState::new(store, pool)
        .with_limits(config.load_test.limits())
        .with_poll_interval(config.relay.poll_interval);

    // Periodic update of gauge metrics (every 5 seconds)
    let gauge_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            metrics::gauge!("ratescope_uptime_seconds").set(gauge_state.uptime_seconds() as f64);
        }
    });

    let app = Router::new()
        .route("/metrics/prometheus", get(prometheus_metrics))
        .merge(api_routes(app_state, &config.cors_origins));

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Ratescope server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

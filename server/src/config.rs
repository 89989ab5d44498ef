//! Server configuration
//!
//! Configuration is loaded from environment variables. See `.env.example` for documentation.

use crate::protocol::TestLimits;
use std::env;
use std::time::Duration;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,

    /// Result store configuration
    pub store: StoreConfig,

    /// Load test limits and execution settings
    pub load_test: LoadTestConfig,

    /// Live stream configuration
    pub relay: RelayConfig,
}

/// Which result store backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process store, results are lost on restart
    Memory,
    /// Shared Redis lists and flags
    Redis,
}

/// Result store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
}

/// Load test execution configuration
#[derive(Debug, Clone)]
pub struct LoadTestConfig {
    /// Maximum requests per test
    pub max_requests: u32,
    /// Maximum concurrent requests per batch
    pub max_concurrency: u32,
    /// Timeout for each individual request
    pub request_timeout: Duration,
    /// Number of tests that can run at the same time
    pub worker_count: usize,
    /// Tests that can wait for a free worker before new ones are refused
    pub queue_capacity: usize,
}

/// Stream relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Delay between store polls while a test is running
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            store: StoreConfig::default(),
            load_test: LoadTestConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://localhost:6379/0".to_string(),
        }
    }
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            max_requests: 1000,
            max_concurrency: 50,
            request_timeout: Duration::from_secs(10),
            worker_count: 4,
            queue_capacity: 256,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl LoadTestConfig {
    pub fn limits(&self) -> TestLimits {
        TestLimits::capped(self.max_requests, self.max_concurrency)
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Server config
        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }
        if let Ok(val) = env::var("CORS_ORIGINS") {
            let origins = parse_origins(&val);
            if !origins.is_empty() {
                config.cors_origins = origins;
            }
        }

        // Store config
        if let Ok(val) = env::var("STORE_BACKEND") {
            match val.to_lowercase().as_str() {
                "redis" => config.store.backend = StoreBackend::Redis,
                "memory" => config.store.backend = StoreBackend::Memory,
                _ => {}
            }
        }
        if let Ok(url) = env::var("REDIS_URL")
            && !url.is_empty()
        {
            config.store.redis_url = url;
        }

        // Load test config
        if let Ok(val) = env::var("MAX_REQUESTS")
            && let Ok(v) = val.parse::<u32>()
        {
            config.load_test.max_requests = v.min(TestLimits::default().max_requests);
        }
        if let Ok(val) = env::var("MAX_CONCURRENCY")
            && let Ok(v) = val.parse::<u32>()
        {
            config.load_test.max_concurrency = v.min(TestLimits::default().max_concurrency);
        }
        if let Ok(val) = env::var("REQUEST_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.load_test.request_timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("WORKER_COUNT")
            && let Ok(v) = val.parse()
        {
            config.load_test.worker_count = v;
        }
        if let Ok(val) = env::var("JOB_QUEUE_CAPACITY")
            && let Ok(v) = val.parse()
        {
            config.load_test.queue_capacity = v;
        }

        // Relay config
        if let Ok(val) = env::var("RELAY_POLL_INTERVAL_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.relay.poll_interval = Duration::from_millis(ms);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.load_test.request_timeout, Duration::from_secs(10));
        assert_eq!(config.relay.poll_interval, Duration::from_millis(500));
        assert_eq!(
            config.load_test.limits(),
            TestLimits {
                max_requests: 1000,
                max_concurrency: 50
            }
        );
    }

    #[test]
    fn test_limits_never_exceed_defaults() {
        let mut load_test = LoadTestConfig {
            max_requests: 5000,
            max_concurrency: 200,
            ..Default::default()
        };
        assert_eq!(load_test.limits(), TestLimits::default());

        load_test.max_requests = 100;
        load_test.max_concurrency = 5;
        assert_eq!(
            load_test.limits(),
            TestLimits {
                max_requests: 100,
                max_concurrency: 5
            }
        );
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins("http://localhost:3000, http://localhost:5173,,"),
            vec!["http://localhost:3000", "http://localhost:5173"]
        );
        assert!(parse_origins(" , ").is_empty());
    }
}

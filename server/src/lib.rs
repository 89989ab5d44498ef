//! Ratescope Server Library
//!
//! This module exports the server components for use in integration tests
//! and external tooling.

pub mod config;
pub mod engine;
pub mod orchestrator;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod store;
pub mod summary;

// Re-export commonly used types
pub use engine::{EngineConfig, LoadTestEngine};
pub use orchestrator::{Dispatcher, TestOrchestrator, WorkerPool};
pub use protocol::{BatchResult, RequestResult, StreamMessage, TestConfig, TestSummary};
pub use relay::StreamRelay;
pub use server::AppState;
pub use store::{MemoryResultStore, RedisResultStore, ResultStore};

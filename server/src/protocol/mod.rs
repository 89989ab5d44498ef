//! Wire types shared by the engine, store, relay and HTTP API

mod messages;

pub use messages::*;

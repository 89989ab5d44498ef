mod routes;
mod state;
mod websocket;

pub use routes::{
    ApiErrorResponse, HealthResponse, SUMMARY_NOT_FOUND, api_routes, cors_layer, get_summary,
    health, run_test,
};
pub use state::AppState;
pub use websocket::ws_handler;

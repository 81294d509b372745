pub mod catalog;
pub mod config;
pub mod error;
pub mod handlers;
pub mod probe;
pub mod protocol;
pub mod state;
pub mod supervisor;
pub mod translate;

use axum::routing::{get, post};
use axum::Router;

use state::AppState;

/// Build the application router with the given state.
/// Extracted from `main()` so integration tests can construct the app
/// without binding to a network port.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health))
        .route("/api/health/ready", get(handlers::readiness))
        // Servers
        .route("/api/mcp/servers", get(handlers::list_servers))
        .route("/api/mcp/servers/{id}", get(handlers::get_server))
        // Lifecycle
        .route("/api/mcp/start", post(handlers::start_servers))
        .route("/api/mcp/stop", post(handlers::stop_servers))
        // Tools
        .route(
            "/api/mcp/tools",
            get(handlers::list_tools).post(handlers::query_tools),
        )
        // One-shot probe
        .route("/api/mcp/test-connection", post(handlers::test_connection))
        // Shared state
        .with_state(state)
}

//! Application state.
//!
//! Explicitly owned and dependency-injected (no globals) so tests can
//! construct independent instances with their own registries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::catalog::ToolCatalog;
use crate::config::ServerConfig;
use crate::supervisor::Supervisor;

/// Central application state. Clone-friendly — all fields are Arc-backed.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub catalog: ToolCatalog,
    pub start_time: Instant,
    /// `true` once startup completes.
    pub ready: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(servers: Vec<ServerConfig>) -> Self {
        let supervisor = Arc::new(Supervisor::new(servers));
        tracing::info!(
            "AppState initialised -- {} MCP server(s) registered",
            supervisor.registered_count()
        );
        Self {
            catalog: ToolCatalog::new(supervisor.clone()),
            supervisor,
            start_time: Instant::now(),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Relaxed);
        tracing::info!("Backend marked as READY");
    }
}

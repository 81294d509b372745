//! HTTP boundary: health endpoints plus the MCP lifecycle/tool routes.
//!
//! Handlers stay thin — input validation and JSON shaping only. Everything
//! stateful lives in the supervisor and catalog; internal error kinds map
//! onto status codes in `error.rs` at this boundary only.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::McpError;
use crate::probe::{self, ProbeSpec};
use crate::state::AppState;
use crate::supervisor::ServerState;
use crate::translate;

// ---------------------------------------------------------------------------
// Request shapes
// ---------------------------------------------------------------------------

/// Start/stop accept one of three shapes: `{id}`, `{ids:[...]}`, `{all:true}`.
#[derive(Debug, Default, Deserialize)]
pub struct BatchRequest {
    pub id: Option<String>,
    pub ids: Option<Vec<String>>,
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ToolsRequest {
    pub server_id: Option<String>,
    pub provider: Option<String>,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": if state.is_ready() { "ok" } else { "starting" },
        "version": env!("CARGO_PKG_VERSION"),
        "app": "Claudia MCP",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "servers": {
            "registered": state.supervisor.registered_count(),
            "running": state.supervisor.running_count().await,
        },
    }))
}

pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if state.is_ready() {
        (StatusCode::OK, Json(json!({ "ready": true })))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "ready": false })))
    }
}

// ---------------------------------------------------------------------------
// Servers
// ---------------------------------------------------------------------------

pub async fn list_servers(State(state): State<AppState>) -> Json<Value> {
    let statuses = state.supervisor.all_statuses().await;
    let running = state.supervisor.running_count().await;
    Json(json!({ "servers": statuses, "running": running }))
}

pub async fn get_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, McpError> {
    let config = state
        .supervisor
        .config(&id)
        .ok_or_else(|| McpError::NotFound(id.clone()))?;
    let status = state.supervisor.status(&id).await;
    Ok(Json(json!({ "config": config, "status": status })))
}

// ---------------------------------------------------------------------------
// Start / Stop
// ---------------------------------------------------------------------------

pub async fn start_servers(
    State(state): State<AppState>,
    Json(body): Json<BatchRequest>,
) -> Result<Json<Value>, McpError> {
    if let Some(id) = body.id {
        let status = state.supervisor.start_server(&id).await?;
        return Ok(Json(serde_json::to_value(status).unwrap_or_default()));
    }

    if let Some(ids) = body.ids {
        let mut results = Vec::with_capacity(ids.len());
        for id in &ids {
            match state.supervisor.start_server(id).await {
                Ok(status) => results.push(json!({ "id": id, "status": status })),
                Err(e) => results.push(json!({ "id": id, "error": e.to_string() })),
            }
        }
        return Ok(Json(json!({ "results": results })));
    }

    if body.all {
        let statuses = state.supervisor.all_statuses().await;
        let mut started = 0usize;
        let mut failed = 0usize;
        for s in &statuses {
            match state.supervisor.start_server(&s.id).await {
                Ok(status) if status.state == ServerState::Running => started += 1,
                _ => failed += 1,
            }
        }
        return Ok(Json(json!({
            "started": started,
            "failed": failed,
            "total": statuses.len(),
        })));
    }

    Err(McpError::BadRequest(
        "provide one of 'id', 'ids' or 'all'".into(),
    ))
}

pub async fn stop_servers(
    State(state): State<AppState>,
    Json(body): Json<BatchRequest>,
) -> Result<Json<Value>, McpError> {
    if let Some(id) = body.id {
        let status = state.supervisor.stop_server(&id).await?;
        return Ok(Json(serde_json::to_value(status).unwrap_or_default()));
    }

    if let Some(ids) = body.ids {
        let mut results = Vec::with_capacity(ids.len());
        for id in &ids {
            match state.supervisor.stop_server(id).await {
                Ok(status) => results.push(json!({ "id": id, "status": status })),
                Err(e) => results.push(json!({ "id": id, "error": e.to_string() })),
            }
        }
        return Ok(Json(json!({ "results": results })));
    }

    if body.all {
        let report = state.supervisor.stop_all().await;
        let count = report.stopped.len();
        return Ok(Json(json!({
            "stopped": report.stopped,
            "count": count,
            "failed": report.failed,
        })));
    }

    Err(McpError::BadRequest(
        "provide one of 'id', 'ids' or 'all'".into(),
    ))
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// Quick unified listing across all running servers.
pub async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    let listing = state.catalog.all_tools().await;
    Json(json!({
        "total": listing.tools.len(),
        "tools": listing.tools,
        "failures": listing.failures,
        "running_servers": state.supervisor.running_count().await,
    }))
}

/// Scoped and/or provider-translated tool listing.
pub async fn query_tools(
    State(state): State<AppState>,
    Json(body): Json<ToolsRequest>,
) -> Result<Json<Value>, McpError> {
    let (tools, failures) = match body.server_id.as_deref() {
        Some(id) => (state.catalog.server_tools(id).await?, Vec::new()),
        None => {
            let listing = state.catalog.all_tools().await;
            (listing.tools, listing.failures)
        }
    };

    match body.provider.as_deref() {
        Some(provider) => {
            let translated = translate::translate_tools(&tools, provider)?;
            Ok(Json(json!({
                "provider": provider,
                "total": translated.len(),
                "tools": translated,
                "failures": failures,
            })))
        }
        None => Ok(Json(json!({
            "total": tools.len(),
            "tools": tools,
            "failures": failures,
        }))),
    }
}

// ---------------------------------------------------------------------------
// Test connection (one-shot probe)
// ---------------------------------------------------------------------------

pub async fn test_connection(Json(spec): Json<ProbeSpec>) -> Result<Json<Value>, McpError> {
    if spec.command.trim().is_empty() {
        return Err(McpError::BadRequest("command is required".into()));
    }
    let report = probe::probe(&spec).await;
    Ok(Json(serde_json::to_value(report).unwrap_or_default()))
}

//! Unified tool catalog across all running tool servers.
//!
//! Descriptors are derived data: recomputed on every query from the live
//! connections, so a stopped server's tools can never linger in results.
//! Aggregation is best-effort — one misbehaving server lands in the
//! `failures` list instead of failing the whole listing.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::McpError;
use crate::supervisor::Supervisor;

/// A tool offered by a running server, stamped with its provenance.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    /// Original tool name as the server reports it.
    pub name: String,
    /// Collision-free dispatch name: `mcp_{server}_{tool}`.
    pub prefixed_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
    pub server_id: String,
    pub server_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerFailure {
    pub server_id: String,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct ToolListing {
    pub tools: Vec<ToolDescriptor>,
    pub failures: Vec<ServerFailure>,
}

#[derive(Clone)]
pub struct ToolCatalog {
    supervisor: Arc<Supervisor>,
}

impl ToolCatalog {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self { supervisor }
    }

    /// Tools of one server, queried over its long-lived connection.
    pub async fn server_tools(&self, id: &str) -> Result<Vec<ToolDescriptor>, McpError> {
        let cfg = self
            .supervisor
            .config(id)
            .ok_or_else(|| McpError::NotFound(id.to_string()))?
            .clone();
        let handle = self
            .supervisor
            .handle(id)
            .await
            .ok_or_else(|| McpError::NotRunning(id.to_string()))?;

        let mut h = handle.lock().await;
        h.conn.ensure_initialized().await?;
        let result = h.conn.request("tools/list", json!({})).await?;
        drop(h);

        Ok(parse_tools(&result, &cfg.id, &cfg.name))
    }

    /// Flattened tools of every running server, with per-server failures
    /// collected rather than aborting the aggregate.
    pub async fn all_tools(&self) -> ToolListing {
        let mut listing = ToolListing::default();
        for id in self.supervisor.running_ids().await {
            match self.server_tools(&id).await {
                Ok(mut tools) => listing.tools.append(&mut tools),
                // Stopped between the id snapshot and the query.
                Err(McpError::NotRunning(_)) => {}
                Err(e) => {
                    tracing::warn!("catalog: tools/list failed for '{}': {}", id, e);
                    listing.failures.push(ServerFailure {
                        server_id: id,
                        error: e.to_string(),
                    });
                }
            }
        }
        listing
    }
}

fn parse_tools(result: &Value, server_id: &str, server_name: &str) -> Vec<ToolDescriptor> {
    let sanitized = sanitize_server_name(server_name);
    result
        .get("tools")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|t| {
                    let name = t.get("name")?.as_str()?.to_string();
                    let description = t
                        .get("description")
                        .and_then(Value::as_str)
                        .map(String::from);
                    let input_schema = t
                        .get("inputSchema")
                        .cloned()
                        .unwrap_or_else(|| json!({"type": "object", "properties": {}}));
                    let prefixed_name = format!("mcp_{sanitized}_{name}");
                    Some(ToolDescriptor {
                        name,
                        prefixed_name,
                        description,
                        input_schema,
                        server_id: server_id.to_string(),
                        server_name: server_name.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn sanitize_server_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            result.push(ch.to_ascii_lowercase());
        } else if !result.ends_with('_') {
            result.push('_');
        }
    }
    result.trim_end_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_handles_separators_and_case() {
        assert_eq!(sanitize_server_name("my-server"), "my_server");
        assert_eq!(sanitize_server_name("My Server 2"), "my_server_2");
        assert_eq!(sanitize_server_name("a--b"), "a_b");
        assert_eq!(sanitize_server_name("simple"), "simple");
        assert_eq!(sanitize_server_name("UPPER"), "upper");
    }

    #[test]
    fn parse_tools_stamps_provenance() {
        let result = json!({"tools": [
            {"name": "search", "description": "find things",
             "inputSchema": {"type": "object", "properties": {"q": {"type": "string"}}}},
            {"name": "fetch"}
        ]});
        let tools = parse_tools(&result, "lin-1", "Linear Bridge");
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].prefixed_name, "mcp_linear_bridge_search");
        assert_eq!(tools[0].server_id, "lin-1");
        assert_eq!(tools[0].server_name, "Linear Bridge");
        // Missing schema defaults to an empty object schema.
        assert_eq!(tools[1].input_schema["type"], "object");
        assert!(tools[1].description.is_none());
    }

    #[test]
    fn parse_tools_skips_nameless_entries() {
        let result = json!({"tools": [{"description": "no name"}, {"name": "ok"}]});
        let tools = parse_tools(&result, "s", "S");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "ok");
    }

    #[test]
    fn parse_tools_empty_on_missing_array() {
        assert!(parse_tools(&json!({}), "s", "S").is_empty());
    }
}

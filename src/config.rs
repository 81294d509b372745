//! Server registry: launch configuration for each known MCP tool server.
//!
//! Loaded once at startup from a JSON file and immutable afterwards — the
//! supervisor owns all mutable per-server state. Shape:
//!
//! ```json
//! { "servers": [ { "id": "echo-tool", "name": "Echo", "command": "node",
//!                  "args": ["echo-server.js"], "env": {"DEBUG": "1"} } ] }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const DEFAULT_REGISTRY_FILE: &str = "mcp-servers.json";

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub id: String,
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment merged over the base process environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Per-request timeout for JSON-RPC calls on the long-lived connection.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    servers: Vec<ServerConfig>,
}

/// Load and validate the registry. A missing file is not an error — the
/// dashboard may simply have no servers configured yet.
pub fn load_registry(path: &Path) -> anyhow::Result<Vec<ServerConfig>> {
    if !path.exists() {
        tracing::warn!("registry file {} not found — starting with empty registry", path.display());
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read registry file {}", path.display()))?;
    let parsed: RegistryFile = serde_json::from_str(&raw)
        .with_context(|| format!("registry file {} is not valid JSON", path.display()))?;

    validate(&parsed.servers)?;
    Ok(parsed.servers)
}

fn validate(servers: &[ServerConfig]) -> anyhow::Result<()> {
    let mut seen = HashSet::new();
    for s in servers {
        if s.id.trim().is_empty() {
            anyhow::bail!("server entry with empty id (name: '{}')", s.name);
        }
        if s.command.trim().is_empty() {
            anyhow::bail!("server '{}' has an empty command", s.id);
        }
        if !seen.insert(s.id.as_str()) {
            anyhow::bail!("duplicate server id '{}'", s.id);
        }
    }
    Ok(())
}

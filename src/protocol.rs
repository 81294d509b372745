//! Line-delimited JSON-RPC 2.0 over a tool server's standard streams.
//!
//! One `Connection` per running server: requests go down stdin as single
//! newline-terminated JSON objects, responses come back as stdout lines.
//! Tool servers are allowed to be noisy — lines that are not valid JSON, or
//! JSON carrying a different request id, are skipped rather than treated as
//! protocol errors.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::time::Instant;

use crate::error::McpError;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Params for the MCP `initialize` request.
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": { "listChanged": true }
        },
        "clientInfo": {
            "name": "claudia-mcp",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

/// True when a parsed JSON-RPC payload is a recognizable MCP handshake
/// response: it declares capabilities or carries a tool list.
pub fn is_handshake_response(v: &Value) -> bool {
    v.pointer("/result/capabilities").is_some()
        || v.pointer("/result/tools").is_some()
        || v.get("tools").is_some_and(Value::is_array)
}

/// Extract tool names from an MCP response carrying a `tools` array.
pub fn extract_tool_names(v: &Value) -> Vec<String> {
    let tools = v
        .pointer("/result/tools")
        .or_else(|| v.get("tools"))
        .and_then(Value::as_array);

    tools
        .map(|arr| {
            arr.iter()
                .filter_map(|t| t.get("name").and_then(Value::as_str))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// A long-lived JSON-RPC connection to a running tool server.
pub struct Connection {
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    initialized: bool,
    timeout: Duration,
}

impl Connection {
    pub fn new(stdin: ChildStdin, stdout: ChildStdout, timeout: Duration) -> Self {
        Self {
            stdin,
            lines: BufReader::new(stdout).lines(),
            next_id: 1,
            initialized: false,
            timeout,
        }
    }

    /// Perform the `initialize` handshake once, lazily. Idempotent.
    pub async fn ensure_initialized(&mut self) -> Result<(), McpError> {
        if self.initialized {
            return Ok(());
        }
        self.request("initialize", initialize_params()).await?;
        // Servers expect the initialized notification before serving requests.
        self.notify("notifications/initialized").await?;
        self.initialized = true;
        Ok(())
    }

    /// Send one request and wait for the response with a matching id.
    /// Interleaved notifications and unparsable lines are skipped.
    pub async fn request(&mut self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id;
        self.next_id += 1;

        self.send_line(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .await?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(McpError::Timeout(self.timeout.as_secs()));
            }

            let line = match tokio::time::timeout(remaining, self.lines.next_line()).await {
                Err(_) => return Err(McpError::Timeout(self.timeout.as_secs())),
                Ok(Err(e)) => return Err(McpError::Upstream(format!("stdout read failed: {e}"))),
                Ok(Ok(None)) => {
                    return Err(McpError::Upstream("server closed its stdout".into()));
                }
                Ok(Ok(Some(line))) => line,
            };

            // Output may be buffered mid-line or carry non-protocol noise.
            let Ok(payload) = serde_json::from_str::<Value>(&line) else {
                continue;
            };
            if payload.get("id").and_then(Value::as_u64) != Some(id) {
                continue;
            }

            if let Some(err) = payload.get("error") {
                let msg = err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown JSON-RPC error");
                let code = err.get("code").and_then(Value::as_i64).unwrap_or(-1);
                return Err(McpError::Upstream(format!("JSON-RPC error {code}: {msg}")));
            }
            return Ok(payload.get("result").cloned().unwrap_or(Value::Null));
        }
    }

    /// Fire-and-forget notification (no id, no response).
    async fn notify(&mut self, method: &str) -> Result<(), McpError> {
        self.send_line(&json!({ "jsonrpc": "2.0", "method": method }))
            .await
    }

    async fn send_line(&mut self, payload: &Value) -> Result<(), McpError> {
        let mut line = payload.to_string();
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| McpError::Upstream(format!("stdin write failed: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| McpError::Upstream(format!("stdin flush failed: {e}")))
    }
}

//! One-shot liveness and capability probe for a tool server command.
//!
//! Spawns the command, writes a single `initialize` line, and races three
//! mutually exclusive terminal events: a recognized handshake response, a
//! natural process exit, or the probe deadline. The loop is sequential, so
//! exactly one branch ever produces the report; the process is terminated
//! on the response and timeout paths (a probe is not a connection).

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::time::Instant;

use crate::protocol;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Grace before writing the handshake, so slow interpreters can boot.
pub const INIT_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
}

impl ProbeReport {
    fn failure(message: String) -> Self {
        Self { success: false, message, tools: None }
    }
}

/// Probe with the default 10 s deadline.
pub async fn probe(spec: &ProbeSpec) -> ProbeReport {
    probe_with(spec, DEFAULT_TIMEOUT, INIT_DELAY).await
}

/// Probe with explicit deadline and init delay. Never returns an error —
/// every failure mode is a structured report.
pub async fn probe_with(spec: &ProbeSpec, timeout: Duration, init_delay: Duration) -> ProbeReport {
    let started = Instant::now();

    let mut cmd = Command::new(&spec.command);
    cmd.args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            return ProbeReport::failure(format!("failed to spawn '{}': {e}", spec.command));
        }
    };

    let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
        let _ = child.start_kill();
        let _ = child.wait().await;
        return ProbeReport::failure("could not attach to process stdio".into());
    };
    let stderr = child.stderr.take();

    // Drain stderr concurrently so the child never blocks on a full pipe.
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(mut pipe) = stderr {
            let _ = pipe.read_to_string(&mut buf).await;
        }
        buf
    });

    tokio::time::sleep(init_delay).await;

    // The process may already have exited; a broken pipe here is fine —
    // the exit path decides what that means.
    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": protocol::initialize_params(),
    });
    let mut line = request.to_string();
    line.push('\n');
    if let Err(e) = stdin.write_all(line.as_bytes()).await {
        tracing::debug!("probe: handshake write failed (process likely exited): {e}");
    }
    let _ = stdin.flush().await;

    let deadline = started + timeout;
    let mut lines = BufReader::new(stdout).lines();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, lines.next_line()).await {
            // Deadline hit mid-read.
            Err(_) => break,

            Ok(Ok(Some(text))) => {
                // Partial or non-JSON lines are noise, not errors.
                let Ok(payload) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                if !protocol::is_handshake_response(&payload) {
                    continue;
                }
                // Terminal: recognized response.
                let _ = child.start_kill();
                let _ = child.wait().await;
                stderr_task.abort();
                let names = protocol::extract_tool_names(&payload);
                let message = if names.is_empty() {
                    "server responded to initialize".to_string()
                } else {
                    format!("server responded to initialize ({} tools advertised)", names.len())
                };
                return ProbeReport {
                    success: true,
                    message,
                    tools: (!names.is_empty()).then_some(names),
                };
            }

            // Terminal: stdout closed — the process is exiting on its own.
            Ok(Ok(None)) => {
                let reap = deadline
                    .saturating_duration_since(Instant::now())
                    .max(Duration::from_millis(250));
                let status = match tokio::time::timeout(reap, child.wait()).await {
                    Ok(s) => s,
                    Err(_) => {
                        // Closed stdout but kept running — treat as unresponsive.
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        stderr_task.abort();
                        return ProbeReport::failure(
                            "server closed stdout without a handshake response".into(),
                        );
                    }
                };
                let stderr_text = stderr_task.await.unwrap_or_default();
                return match status {
                    Ok(st) if st.success() => ProbeReport {
                        success: true,
                        message: "process started and exited cleanly".into(),
                        tools: None,
                    },
                    Ok(st) => {
                        let detail = stderr_text.trim();
                        ProbeReport::failure(if detail.is_empty() {
                            format!("process exited with {st} before responding")
                        } else {
                            format!("process exited with {st}: {detail}")
                        })
                    }
                    Err(e) => ProbeReport::failure(format!("failed to reap process: {e}")),
                };
            }

            Ok(Err(e)) => {
                tracing::debug!("probe: stdout read error: {e}");
                break;
            }
        }
    }

    // Terminal: timeout. Unconditionally terminate the process.
    let _ = child.start_kill();
    let _ = child.wait().await;
    stderr_task.abort();
    ProbeReport::failure(format!(
        "no handshake response within {}s",
        timeout.as_secs()
    ))
}

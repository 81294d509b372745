//! Process supervisor — one OS process per registered tool server.
//!
//! Owns all mutable per-server state: the status map, the running-process
//! map, and a per-id transition lock so concurrent start/stop calls on the
//! same server serialize instead of racing. Failures never escape as
//! panics or opaque errors; a spawn failure or unexpected exit lands in
//! the server's status as `error` with the captured message.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::error::McpError;
use crate::protocol::Connection;

/// How long `stop_server` waits for an exit after the kill signal.
const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub id: String,
    pub state: ServerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl ServerStatus {
    fn stopped(id: &str) -> Self {
        Self {
            id: id.to_string(),
            state: ServerState::Stopped,
            error: None,
            started_at: None,
        }
    }
}

/// A live child process plus its JSON-RPC connection.
pub struct ServerHandle {
    child: Child,
    pub(crate) conn: Connection,
}

/// Per-id outcomes of a batch stop. One failing server never aborts the rest.
#[derive(Debug, Default, Serialize)]
pub struct StopAllReport {
    pub stopped: Vec<String>,
    pub failed: Vec<StopFailure>,
}

#[derive(Debug, Serialize)]
pub struct StopFailure {
    pub id: String,
    pub error: String,
}

pub struct Supervisor {
    configs: HashMap<String, ServerConfig>,
    /// Registration order, for stable status listings.
    order: Vec<String>,
    statuses: RwLock<HashMap<String, ServerStatus>>,
    running: RwLock<HashMap<String, Arc<Mutex<ServerHandle>>>>,
    /// Per-id locks held for the duration of a start/stop transition.
    transitions: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Supervisor {
    pub fn new(servers: Vec<ServerConfig>) -> Self {
        let order: Vec<String> = servers.iter().map(|s| s.id.clone()).collect();
        let statuses = servers
            .iter()
            .map(|s| (s.id.clone(), ServerStatus::stopped(&s.id)))
            .collect();
        let configs = servers.into_iter().map(|s| (s.id.clone(), s)).collect();
        Self {
            configs,
            order,
            statuses: RwLock::new(statuses),
            running: RwLock::new(HashMap::new()),
            transitions: Mutex::new(HashMap::new()),
        }
    }

    // ── Pure reads ──────────────────────────────────────────────────────

    pub fn config(&self, id: &str) -> Option<&ServerConfig> {
        self.configs.get(id)
    }

    pub fn registered_count(&self) -> usize {
        self.configs.len()
    }

    pub async fn status(&self, id: &str) -> Option<ServerStatus> {
        self.statuses.read().await.get(id).cloned()
    }

    /// All statuses in registration order.
    pub async fn all_statuses(&self) -> Vec<ServerStatus> {
        let lock = self.statuses.read().await;
        self.order
            .iter()
            .filter_map(|id| lock.get(id).cloned())
            .collect()
    }

    pub async fn is_running(&self, id: &str) -> bool {
        self.running.read().await.contains_key(id)
    }

    pub async fn running_count(&self) -> usize {
        self.running.read().await.len()
    }

    pub async fn running_ids(&self) -> Vec<String> {
        let lock = self.running.read().await;
        self.order
            .iter()
            .filter(|id| lock.contains_key(id.as_str()))
            .cloned()
            .collect()
    }

    pub(crate) async fn handle(&self, id: &str) -> Option<Arc<Mutex<ServerHandle>>> {
        self.running.read().await.get(id).cloned()
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Start a registered server. Idempotent: a server that is already
    /// running keeps its single process and current status. Spawn failures
    /// are reported through the returned status, not as an `Err`.
    pub async fn start_server(&self, id: &str) -> Result<ServerStatus, McpError> {
        let cfg = self
            .configs
            .get(id)
            .ok_or_else(|| McpError::NotFound(id.to_string()))?
            .clone();

        let gate = self.transition_gate(id).await;
        let _guard = gate.lock().await;

        if let Some(handle) = self.handle(id).await {
            let alive = handle.lock().await.child.try_wait().ok().flatten().is_none();
            if alive {
                tracing::debug!("supervisor: '{}' already running", id);
                return Ok(self
                    .status(id)
                    .await
                    .unwrap_or_else(|| ServerStatus::stopped(id)));
            }
            // Stale entry from a process that died since the last check.
            self.running.write().await.remove(id);
        }

        self.set_status(id, ServerState::Starting, None, None).await;
        tracing::info!("supervisor: starting '{}' -- {} {:?}", id, cfg.command, cfg.args);

        let mut cmd = Command::new(&cfg.command);
        cmd.args(&cfg.args)
            .envs(&cfg.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                let msg = McpError::Spawn {
                    command: cfg.command.clone(),
                    message: e.to_string(),
                }
                .to_string();
                tracing::warn!("supervisor: {}", msg);
                return Ok(self.set_status(id, ServerState::Error, Some(msg), None).await);
            }
        };

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.start_kill();
            let _ = child.wait().await;
            let msg = "could not attach to process stdio".to_string();
            return Ok(self.set_status(id, ServerState::Error, Some(msg), None).await);
        };

        // Keep the child's stderr drained; surface it at debug level.
        if let Some(stderr) = child.stderr.take() {
            let sid = id.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!("[{}] stderr: {}", sid, line);
                }
            });
        }

        // Confirmed alive = spawned and not already reaped.
        if let Ok(Some(st)) = child.try_wait() {
            let msg = format!("process exited immediately with {st}");
            tracing::warn!("supervisor: '{}' {}", id, msg);
            return Ok(self.set_status(id, ServerState::Error, Some(msg), None).await);
        }

        let conn = Connection::new(stdin, stdout, Duration::from_secs(cfg.timeout_secs));
        self.running
            .write()
            .await
            .insert(id.to_string(), Arc::new(Mutex::new(ServerHandle { child, conn })));

        let status = self
            .set_status(id, ServerState::Running, None, Some(Utc::now()))
            .await;
        tracing::info!("supervisor: '{}' running", id);
        Ok(status)
    }

    /// Stop a registered server. A no-op returning `stopped` when it is
    /// not running; otherwise kills the process and waits within a grace
    /// period.
    pub async fn stop_server(&self, id: &str) -> Result<ServerStatus, McpError> {
        if !self.configs.contains_key(id) {
            return Err(McpError::NotFound(id.to_string()));
        }

        let gate = self.transition_gate(id).await;
        let _guard = gate.lock().await;

        let Some(handle) = self.running.write().await.remove(id) else {
            return Ok(self.set_status(id, ServerState::Stopped, None, None).await);
        };

        tracing::info!("supervisor: stopping '{}'", id);
        {
            let mut h = handle.lock().await;
            if let Err(e) = h.child.start_kill() {
                tracing::debug!("supervisor: kill '{}' failed (already exited?): {e}", id);
            }
            match tokio::time::timeout(STOP_GRACE, h.child.wait()).await {
                Ok(Ok(st)) => tracing::debug!("supervisor: '{}' exited with {st}", id),
                Ok(Err(e)) => tracing::warn!("supervisor: failed to reap '{}': {e}", id),
                Err(_) => tracing::warn!(
                    "supervisor: '{}' did not exit within {}s grace",
                    id,
                    STOP_GRACE.as_secs()
                ),
            }
        }

        Ok(self.set_status(id, ServerState::Stopped, None, None).await)
    }

    /// Stop every running server, collecting per-id outcomes.
    pub async fn stop_all(&self) -> StopAllReport {
        let ids = self.running_ids().await;
        let mut report = StopAllReport::default();
        for id in ids {
            match self.stop_server(&id).await {
                Ok(_) => report.stopped.push(id),
                Err(e) => report.failed.push(StopFailure {
                    id,
                    error: e.to_string(),
                }),
            }
        }
        report
    }

    /// Sweep the running map for processes that exited on their own and
    /// downgrade their status to `error`. Returns the reaped ids.
    pub async fn reap_exited(&self) -> Vec<String> {
        let entries: Vec<(String, Arc<Mutex<ServerHandle>>)> = self
            .running
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut reaped = Vec::new();
        for (id, handle) in entries {
            let exited = {
                // A handle busy with an in-flight request is alive enough.
                let Ok(mut h) = handle.try_lock() else { continue };
                match h.child.try_wait() {
                    Ok(Some(st)) => Some(st.to_string()),
                    _ => None,
                }
            };
            if let Some(st) = exited {
                self.running.write().await.remove(&id);
                self.set_status(
                    &id,
                    ServerState::Error,
                    Some(format!("process exited unexpectedly ({st})")),
                    None,
                )
                .await;
                reaped.push(id);
            }
        }
        reaped
    }

    // ── Internals ───────────────────────────────────────────────────────

    async fn transition_gate(&self, id: &str) -> Arc<Mutex<()>> {
        let mut map = self.transitions.lock().await;
        map.entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn set_status(
        &self,
        id: &str,
        state: ServerState,
        error: Option<String>,
        started_at: Option<DateTime<Utc>>,
    ) -> ServerStatus {
        let status = ServerStatus {
            id: id.to_string(),
            state,
            error,
            started_at,
        };
        self.statuses
            .write()
            .await
            .insert(id.to_string(), status.clone());
        status
    }
}

/// Background watchdog: periodically reaps servers whose process died.
pub fn spawn_watchdog(supervisor: Arc<Supervisor>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("watchdog: started (interval={}s)", interval.as_secs());
        loop {
            tokio::time::sleep(interval).await;
            let reaped = supervisor.reap_exited().await;
            if !reaped.is_empty() {
                tracing::warn!("watchdog: marked exited servers as error: {:?}", reaped);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Vec<ServerConfig> {
        vec![ServerConfig {
            id: "echo".into(),
            name: "Echo".into(),
            command: "true".into(),
            args: vec![],
            env: HashMap::new(),
            timeout_secs: 10,
        }]
    }

    #[tokio::test]
    async fn all_statuses_start_stopped() {
        let sup = Supervisor::new(registry());
        let statuses = sup.all_statuses().await;
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].state, ServerState::Stopped);
        assert_eq!(sup.running_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let sup = Supervisor::new(registry());
        assert!(matches!(
            sup.start_server("ghost").await,
            Err(McpError::NotFound(_))
        ));
        assert!(matches!(
            sup.stop_server("ghost").await,
            Err(McpError::NotFound(_))
        ));
        assert_eq!(sup.running_count().await, 0);
    }

    #[tokio::test]
    async fn stop_on_stopped_server_is_noop() {
        let sup = Supervisor::new(registry());
        let status = sup.stop_server("echo").await.unwrap();
        assert_eq!(status.state, ServerState::Stopped);
        assert!(status.error.is_none());
    }
}

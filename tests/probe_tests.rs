// One-shot probe properties, exercised against real `sh` children.
#![cfg(unix)]

use std::collections::HashMap;
use std::time::{Duration, Instant};

use claudia_mcp::probe::{probe_with, ProbeSpec};

const SHORT_DELAY: Duration = Duration::from_millis(50);

fn spec(command: &str, args: &[&str]) -> ProbeSpec {
    ProbeSpec {
        command: command.into(),
        args: args.iter().map(|s| s.to_string()).collect(),
        env: HashMap::new(),
    }
}

#[tokio::test]
async fn recognized_handshake_succeeds_and_extracts_tools() {
    // Print a handshake with a tool list, then linger — the probe must
    // recognize the line and kill the process rather than wait.
    let script = r#"printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"capabilities":{},"tools":[{"name":"alpha"},{"name":"beta"}]}}'; sleep 30"#;
    let started = Instant::now();
    let report = probe_with(
        &spec("sh", &["-c", script]),
        Duration::from_secs(10),
        SHORT_DELAY,
    )
    .await;

    assert!(report.success, "unexpected failure: {}", report.message);
    assert_eq!(
        report.tools,
        Some(vec!["alpha".to_string(), "beta".to_string()])
    );
    // Recognition must terminate the probe well before the sleep ends.
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn noise_lines_before_handshake_are_skipped() {
    let script = r#"echo 'booting up...'; echo '{partial json'; printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"capabilities":{}}}'; sleep 30"#;
    let report = probe_with(
        &spec("sh", &["-c", script]),
        Duration::from_secs(10),
        SHORT_DELAY,
    )
    .await;

    assert!(report.success, "unexpected failure: {}", report.message);
    assert!(report.tools.is_none());
}

#[tokio::test]
async fn clean_exit_without_handshake_is_soft_success() {
    let report = probe_with(&spec("true", &[]), Duration::from_secs(10), SHORT_DELAY).await;

    assert!(report.success);
    assert!(report.message.contains("exited cleanly"));
    assert!(report.tools.is_none());
}

#[tokio::test]
async fn nonzero_exit_surfaces_stderr() {
    let script = r#"echo 'missing API_KEY' >&2; exit 3"#;
    let report = probe_with(
        &spec("sh", &["-c", script]),
        Duration::from_secs(10),
        SHORT_DELAY,
    )
    .await;

    assert!(!report.success);
    assert!(report.message.contains("missing API_KEY"));
}

#[tokio::test]
async fn unresponsive_process_times_out() {
    let started = Instant::now();
    let report = probe_with(
        &spec("sleep", &["30"]),
        Duration::from_secs(1),
        SHORT_DELAY,
    )
    .await;

    assert!(!report.success);
    assert!(report.message.contains("no handshake response"));
    // Deadline plus small scheduling slack.
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn spawn_failure_is_a_report_not_a_panic() {
    let report = probe_with(
        &spec("/nonexistent/not-a-server", &[]),
        Duration::from_secs(1),
        SHORT_DELAY,
    )
    .await;

    assert!(!report.success);
    assert!(report.message.contains("failed to spawn"));
}

#[tokio::test]
async fn declared_env_reaches_the_child() {
    let script =
        r#"printf '{"jsonrpc":"2.0","id":1,"result":{"capabilities":{},"tools":[{"name":"'"$TOOL_NAME"'"}]}}\n'; sleep 5"#;
    let mut s = spec("sh", &["-c", script]);
    s.env.insert("TOOL_NAME".into(), "from_env".into());

    let report = probe_with(&s, Duration::from_secs(10), SHORT_DELAY).await;

    assert!(report.success, "unexpected failure: {}", report.message);
    assert_eq!(report.tools, Some(vec!["from_env".to_string()]));
}

//! Stdio tool processes driven by a POSIX `sh` script that speaks the
//! newline-delimited JSON-RPC protocol.

#![cfg(unix)]

use std::time::Duration;

use serde_json::json;

use scribe_core::{
    StdioLauncher, ToolKind, ToolProcessError, ToolProcessHandle, ToolProcessSpec, ToolStatus,
};

/// Answers `initialize`, `tools/call` for `google_search`, and reports an
/// error for the `broken` tool. Notifications (no `id`) are ignored.
const FAKE_SERVER: &str = r#"
echo "fake server booting"
echo "fake server log line" >&2
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"fake-mcp","version":"0.0.1"}}}\n' "$id" ;;
    *'"name":"google_search"'*)
      printf '{"jsonrpc":"2.0","method":"notifications/progress","params":{}}\n'
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"1. search ok"}]}}\n' "$id" ;;
    *'"name":"broken"'*)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"unknown tool"}}\n' "$id" ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$id" ;;
  esac
done
"#;

fn fake_server() -> ToolProcessSpec {
    ToolProcessSpec::new("fake-search", ToolKind::Search, "sh")
        .with_args(["-c", FAKE_SERVER])
        .with_readiness_timeout(Duration::from_secs(5))
        .with_shutdown_grace(Duration::from_secs(2))
}

#[tokio::test]
async fn handshake_then_tool_call() {
    let launcher = StdioLauncher::new();
    let handle = ToolProcessHandle::acquire(&launcher, fake_server())
        .await
        .expect("fake server should become ready");
    assert_eq!(handle.status().await, ToolStatus::Ready);

    let text = handle
        .call_tool("google_search", json!({ "q": "rust async" }))
        .await
        .unwrap();
    assert_eq!(text, "1. search ok");

    // A second request on the same handle gets its own id.
    let text = handle
        .call_tool("google_search", json!({ "q": "tokio" }))
        .await
        .unwrap();
    assert_eq!(text, "1. search ok");

    assert_eq!(handle.release().await, ToolStatus::Closed);
}

#[tokio::test]
async fn remote_error_is_surfaced() {
    let launcher = StdioLauncher::new();
    let handle = ToolProcessHandle::acquire(&launcher, fake_server())
        .await
        .unwrap();

    let err = handle.call_tool("broken", json!({})).await.unwrap_err();
    match err {
        ToolProcessError::Remote { code, message, .. } => {
            assert_eq!(code, -32601);
            assert_eq!(message, "unknown tool");
        }
        other => panic!("expected Remote, got {other:?}"),
    }

    // The process is still usable after a remote error.
    assert_eq!(handle.status().await, ToolStatus::Ready);
    handle.release().await;
}

#[tokio::test]
async fn release_is_idempotent() {
    let launcher = StdioLauncher::new();
    let handle = ToolProcessHandle::acquire(&launcher, fake_server())
        .await
        .unwrap();

    assert_eq!(handle.release().await, ToolStatus::Closed);
    assert_eq!(handle.release().await, ToolStatus::Closed);

    let err = handle
        .call_tool("google_search", json!({ "q": "late" }))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolProcessError::NotReady { .. }));
}

#[tokio::test]
async fn process_exiting_before_ready_fails_acquire() {
    let launcher = StdioLauncher::new();
    let spec = ToolProcessSpec::new("exits", ToolKind::Search, "true");

    let err = match ToolProcessHandle::acquire(&launcher, spec).await {
        Ok(_) => panic!("`true` never answers the handshake"),
        Err(e) => e,
    };
    assert!(
        matches!(err, ToolProcessError::ProcessExitedEarly { .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn silent_process_times_out() {
    let launcher = StdioLauncher::new();
    let spec = ToolProcessSpec::new("silent", ToolKind::Search, "sleep")
        .with_args(["30"])
        .with_readiness_timeout(Duration::from_millis(200));

    let err = match ToolProcessHandle::acquire(&launcher, spec).await {
        Ok(_) => panic!("`sleep` never answers the handshake"),
        Err(e) => e,
    };
    assert!(
        matches!(err, ToolProcessError::StartupTimeout { timeout_ms: 200, .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn missing_binary_fails_to_spawn() {
    let launcher = StdioLauncher::new();
    let spec = ToolProcessSpec::new("missing", ToolKind::Search, "scribe-no-such-binary");

    let err = match ToolProcessHandle::acquire(&launcher, spec).await {
        Ok(_) => panic!("binary does not exist"),
        Err(e) => e,
    };
    assert!(matches!(err, ToolProcessError::Spawn { .. }), "got {err:?}");
}

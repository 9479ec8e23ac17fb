//! Supervisor tests against a real child process speaking MCP over stdio.
#![cfg(unix)]
#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use aria_agent::{McpConnector, ProcessBackend, WorkerSupervisor};
use aria_core::Generation;
use aria_mcp::{ArtistArgs, ToolName};
use futures::future::join_all;
use serde_json::{Map, Value};
use tempfile::TempDir;

/// Line-oriented MCP worker. Answers `initialize` by echoing the client's
/// protocol version; answers `tools/call` with its own pid, an empty
/// content list for `Nobody`, or exits without replying for `Crash`.
const SH_WORKER: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\),"method".*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *'"method":"initialize"'*)
      version=$(printf '%s' "$line" | sed -n 's/.*"protocolVersion":"\([^"]*\)".*/\1/p')
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"%s","capabilities":{"tools":{}},"serverInfo":{"name":"sh-worker","version":"0.1.0"}}}\n' "$id" "$version"
      ;;
    *'"method":"tools/call"'*)
      case "$line" in
        *'"name":"Crash"'*) exit 3 ;;
        *'"name":"Nobody"'*)
          printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[]}}\n' "$id"
          ;;
        *)
          printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"pid %s"}]}}\n' "$id" "$$"
          ;;
      esac
      ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"method not found"}}\n' "$id"
      ;;
  esac
done
"#;

const BIO: &str = "get_artist_biography";

fn sh_supervisor(dir: &Path) -> WorkerSupervisor {
    let script = dir.join("worker.sh");
    std::fs::write(&script, SH_WORKER).unwrap();
    let backend = ProcessBackend::new("/bin/sh", vec![script.display().to_string()])
        .with_kill_grace(Duration::from_secs(1));
    let connector = McpConnector::new("sh-worker", Duration::from_secs(5));
    WorkerSupervisor::new("sh-worker", Arc::new(backend), Arc::new(connector))
        .with_call_timeout(Some(Duration::from_secs(10)))
}

fn artist(name: &str) -> Map<String, Value> {
    ArtistArgs::new("7", name).to_arguments()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cold_calls_start_one_process() {
    let dir = TempDir::new().unwrap();
    let supervisor = sh_supervisor(dir.path());

    let replies = join_all((0..4).map(|_| supervisor.invoke(BIO, artist("Nirvana")))).await;
    let replies: Vec<String> = replies.into_iter().map(Result::unwrap).collect();

    assert!(replies[0].starts_with("pid "), "{}", replies[0]);
    assert!(replies.iter().all(|r| *r == replies[0]), "{replies:?}");
    assert_eq!(supervisor.generation().await, Some(Generation(1)));

    supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_content_is_not_found() {
    let dir = TempDir::new().unwrap();
    let supervisor = sh_supervisor(dir.path());

    let err = supervisor
        .invoke(ToolName::ArtistBiography.as_str(), artist("Nobody"))
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err:?}");

    // Not-found is an answer; the worker stays up.
    supervisor.invoke(BIO, artist("Nirvana")).await.unwrap();
    assert_eq!(supervisor.generation().await, Some(Generation(1)));

    supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn crash_mid_call_then_restart() {
    let dir = TempDir::new().unwrap();
    let supervisor = sh_supervisor(dir.path());

    let first = supervisor.invoke(BIO, artist("Nirvana")).await.unwrap();

    let err = supervisor.invoke(BIO, artist("Crash")).await.unwrap_err();
    assert!(err.is_communication(), "unexpected error: {err:?}");

    let second = supervisor.invoke(BIO, artist("Nirvana")).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(supervisor.generation().await, Some(Generation(2)));

    supervisor.shutdown().await;
}

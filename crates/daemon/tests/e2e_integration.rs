//! End-to-end integration tests for FileBridge.
//!
//! These tests run a real orchestrator on a temporary socket and verify
//! complete flows:
//! - Bridge startup and shutdown
//! - Token issuance and authentication
//! - File operations over the socket
//! - Protocol error handling on a live connection

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use daemon::config::Config;
use daemon::ipc::{IpcClient, IpcError};
use daemon::orchestrator::{BridgeOrchestrator, OrchestratorState};
use protocol::{BridgeRequest, EntryKind};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;

/// Create a test configuration with a temporary root and socket.
fn create_test_config() -> (Config, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.service.root_folder = temp_dir.path().join("root");
    config.service.max_file_size = 64 * 1024;
    config.service.allowed_extensions = vec!["txt".to_string(), "md".to_string()];
    config.ipc.socket_path = Some(temp_dir.path().join("run").join("bridge.sock"));
    config.ipc.shutdown_grace_secs = 1;
    (config, temp_dir)
}

/// Start an orchestrator and return it with its socket path.
async fn start_bridge(config: Config) -> (BridgeOrchestrator, PathBuf) {
    let socket_path = config.socket_path();
    let mut orchestrator = BridgeOrchestrator::new(config).unwrap();
    orchestrator.start(CancellationToken::new()).await.unwrap();
    (orchestrator, socket_path)
}

fn rejection(err: IpcError) -> String {
    match err {
        IpcError::Rejected(message) => message,
        other => panic!("Expected a failure response, got {other:?}"),
    }
}

// =============================================================================
// Orchestrator Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_orchestrator_state_starts_stopped() {
    let (config, _temp_dir) = create_test_config();

    let orchestrator = BridgeOrchestrator::new(config).unwrap();

    assert_eq!(orchestrator.state().await, OrchestratorState::Stopped);
}

#[tokio::test]
async fn test_orchestrator_stop_when_already_stopped() {
    let (config, _temp_dir) = create_test_config();

    let mut orchestrator = BridgeOrchestrator::new(config).unwrap();

    // Stop should succeed even when already stopped
    let result = orchestrator.stop().await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_shutdown_removes_socket_and_refuses_clients() {
    let (config, _temp_dir) = create_test_config();
    let (mut orchestrator, socket_path) = start_bridge(config).await;
    assert!(socket_path.exists());

    orchestrator.stop().await.unwrap();

    assert!(!socket_path.exists());
    assert!(IpcClient::connect(&socket_path).await.is_err());
}

#[tokio::test]
async fn test_restart_after_stop() {
    let (config, _temp_dir) = create_test_config();
    let (mut orchestrator, socket_path) = start_bridge(config).await;
    orchestrator.stop().await.unwrap();

    orchestrator.start(CancellationToken::new()).await.unwrap();
    let mut client = IpcClient::connect(&socket_path).await.unwrap();
    client.get_token().await.unwrap();

    orchestrator.stop().await.unwrap();
}

// =============================================================================
// Authentication Tests
// =============================================================================

#[tokio::test]
async fn test_tokenless_create_rejected_then_token_flow_succeeds() {
    let (config, temp_dir) = create_test_config();
    let (mut orchestrator, socket_path) = start_bridge(config).await;

    let mut client = IpcClient::connect(&socket_path).await.unwrap();

    // No token yet
    let err = client
        .create_file("notes/a.txt", b"hello".to_vec())
        .await
        .unwrap_err();
    assert_eq!(
        rejection(err),
        "authentication failed: invalid or missing token"
    );
    assert!(!temp_dir.path().join("root/notes/a.txt").exists());

    // Same request with a fresh token
    client.get_token().await.unwrap();
    client
        .create_file("notes/a.txt", b"hello".to_vec())
        .await
        .unwrap();
    assert_eq!(client.read_file("notes/a.txt").await.unwrap(), b"hello");

    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn test_forged_token_rejected() {
    let (config, _temp_dir) = create_test_config();
    let (mut orchestrator, socket_path) = start_bridge(config).await;

    let mut client = IpcClient::connect(&socket_path).await.unwrap();
    client.set_token("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=");

    let err = client.list_files("").await.unwrap_err();
    assert!(rejection(err).starts_with("authentication failed"));

    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn test_parallel_get_token_yields_distinct_valid_tokens() {
    const CLIENTS: usize = 16;

    let (config, _temp_dir) = create_test_config();
    let (mut orchestrator, socket_path) = start_bridge(config).await;

    let mut handles = Vec::new();
    for _ in 0..CLIENTS {
        let socket_path = socket_path.clone();
        handles.push(tokio::spawn(async move {
            let mut client = IpcClient::connect(&socket_path).await.unwrap();
            client.get_token().await.unwrap()
        }));
    }

    let mut tokens = HashSet::new();
    for handle in handles {
        tokens.insert(handle.await.unwrap());
    }
    assert_eq!(tokens.len(), CLIENTS);

    let store = orchestrator.token_store();
    assert_eq!(store.len(), CLIENTS);
    for token in &tokens {
        assert!(store.validate(token));
    }

    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn test_authentication_disabled() {
    let (mut config, _temp_dir) = create_test_config();
    config.security.require_authentication = false;
    let (mut orchestrator, socket_path) = start_bridge(config).await;

    let mut client = IpcClient::connect(&socket_path).await.unwrap();
    client.create_file("open.txt", b"x".to_vec()).await.unwrap();
    assert_eq!(client.read_file("open.txt").await.unwrap(), b"x");

    orchestrator.stop().await.unwrap();
}

// =============================================================================
// File Operation Tests
// =============================================================================

#[tokio::test]
async fn test_file_lifecycle_over_socket() {
    let (config, _temp_dir) = create_test_config();
    let (mut orchestrator, socket_path) = start_bridge(config).await;

    let mut client = IpcClient::connect(&socket_path).await.unwrap();
    client.get_token().await.unwrap();

    assert!(client.list_files("").await.unwrap().is_empty());

    let binary: Vec<u8> = (0..=255).collect();
    client.create_file("docs/readme.md", b"# hi".to_vec()).await.unwrap();
    client.create_file("docs/data.txt", binary.clone()).await.unwrap();
    client.create_file("top.txt", Vec::new()).await.unwrap();

    let entries = client.list_files("").await.unwrap();
    let summary: Vec<_> = entries
        .iter()
        .map(|e| (e.relative_path.as_str(), e.kind))
        .collect();
    assert_eq!(
        summary,
        vec![("docs", EntryKind::Directory), ("top.txt", EntryKind::File)]
    );

    let entries = client.list_files("docs").await.unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["data.txt", "readme.md"]);

    assert_eq!(client.read_file("docs/data.txt").await.unwrap(), binary);
    assert_eq!(client.read_file("top.txt").await.unwrap(), Vec::<u8>::new());

    client.delete_file("docs/data.txt").await.unwrap();
    let err = client.read_file("docs/data.txt").await.unwrap_err();
    assert_eq!(rejection(err), "file not found");

    let err = client.delete_file("docs/data.txt").await.unwrap_err();
    assert_eq!(rejection(err), "file not found");

    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn test_validation_failures_over_socket() {
    let (config, temp_dir) = create_test_config();
    let (mut orchestrator, socket_path) = start_bridge(config).await;

    let mut client = IpcClient::connect(&socket_path).await.unwrap();
    client.get_token().await.unwrap();

    let err = client.read_file("../../etc/passwd").await.unwrap_err();
    assert_eq!(rejection(err), "invalid or unsafe path");

    let err = client.create_file("a.exe", b"MZ".to_vec()).await.unwrap_err();
    assert_eq!(rejection(err), "file extension not allowed");

    let err = client
        .create_file("big.txt", vec![0u8; 64 * 1024 + 1])
        .await
        .unwrap_err();
    assert_eq!(
        rejection(err),
        "file size exceeds maximum allowed (65536 bytes)"
    );
    assert!(!temp_dir.path().join("root/big.txt").exists());

    let err = client.list_files("missing").await.unwrap_err();
    assert_eq!(rejection(err), "directory not found");

    // Connection is still usable after every failure
    client.create_file("ok.txt", b"ok".to_vec()).await.unwrap();

    orchestrator.stop().await.unwrap();
}

// =============================================================================
// Protocol Tests
// =============================================================================

#[tokio::test]
async fn test_malformed_request_keeps_connection_open() {
    let (config, _temp_dir) = create_test_config();
    let (mut orchestrator, socket_path) = start_bridge(config).await;

    let stream = UnixStream::connect(&socket_path).await.unwrap();
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    write_half.write_all(b"{\"Command\":\n").await.unwrap();
    reader.read_line(&mut line).await.unwrap();
    assert!(line.starts_with("{\"Success\":false,\"ErrorMessage\":\"invalid request: "));

    line.clear();
    write_half
        .write_all(b"{\"command\":\"nope\"}\n")
        .await
        .unwrap();
    reader.read_line(&mut line).await.unwrap();
    assert!(line.contains("invalid request: missing command"));

    line.clear();
    write_half
        .write_all(b"{\"Command\":\"GETTOKEN\",\"Token\":null}\n")
        .await
        .unwrap();
    reader.read_line(&mut line).await.unwrap();
    assert!(line.starts_with("{\"Success\":true,\"Data\":\""));

    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn test_unknown_command_with_valid_token() {
    let (config, _temp_dir) = create_test_config();
    let (mut orchestrator, socket_path) = start_bridge(config).await;

    let mut client = IpcClient::connect(&socket_path).await.unwrap();
    client.get_token().await.unwrap();

    let mut request = BridgeRequest::read_file("a.txt");
    request.command = Some("RenameFile".to_string());
    let response = client.send(request).await.unwrap();
    assert!(!response.success);
    assert_eq!(
        response.error_message.as_deref(),
        Some("unknown command: RenameFile")
    );

    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn test_idle_client_does_not_delay_shutdown() {
    let (mut config, _temp_dir) = create_test_config();
    config.ipc.shutdown_grace_secs = 30;
    let (mut orchestrator, socket_path) = start_bridge(config).await;

    let mut client = IpcClient::connect(&socket_path).await.unwrap();
    client.get_token().await.unwrap();

    let stopped = tokio::time::timeout(Duration::from_secs(5), orchestrator.stop()).await;
    assert!(stopped.is_ok(), "stop should not wait for idle clients");
    assert_eq!(orchestrator.state().await, OrchestratorState::Stopped);
}

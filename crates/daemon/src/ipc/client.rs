//! IPC Client for talking to the bridge via Unix Domain Sockets.
//!
//! The client connects to the daemon's Unix socket and sends requests,
//! receiving responses in a strict request-response pattern. A token obtained
//! through [`IpcClient::get_token`] is remembered and attached to every later
//! request that does not carry one.

use std::path::Path;
use std::time::Duration;

use protocol::{BridgeRequest, BridgeResponse, DirectoryEntry, ResponseData};
use tokio::net::UnixStream;

use super::server::{IpcConnection, IpcError};

/// Default timeout for client operations in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// A client for communicating with the bridge over IPC.
pub struct IpcClient {
    conn: IpcConnection,
    timeout: Duration,
    token: Option<String>,
}

impl IpcClient {
    /// Connect to the daemon at the specified socket path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    /// This typically indicates that the daemon is not running.
    pub async fn connect(path: &Path) -> Result<Self, IpcError> {
        Self::connect_with_timeout(path, Duration::from_secs(DEFAULT_TIMEOUT_SECS)).await
    }

    /// Connect to the daemon with a custom timeout.
    ///
    /// The timeout bounds the connection attempt and every later request.
    pub async fn connect_with_timeout(path: &Path, timeout: Duration) -> Result<Self, IpcError> {
        let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
            .await
            .map_err(|_| IpcError::Timeout)??;

        Ok(Self {
            // Responses carry whole files, so they are not length bounded.
            conn: IpcConnection::new(stream, usize::MAX),
            timeout,
            token: None,
        })
    }

    /// Set the timeout for operations.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// The remembered token, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Use `token` for later requests.
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    /// Send a request and wait for the response.
    ///
    /// The remembered token is attached when the request has none.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent, the response cannot be
    /// read or parsed, or the operation times out. A failure response from
    /// the daemon is not an error here.
    pub async fn send(&mut self, mut request: BridgeRequest) -> Result<BridgeResponse, IpcError> {
        if request.token.is_none() {
            request.token = self.token.clone();
        }

        tokio::time::timeout(self.timeout, self.send_internal(&request))
            .await
            .map_err(|_| IpcError::Timeout)?
    }

    /// Internal send implementation without timeout.
    async fn send_internal(&mut self, request: &BridgeRequest) -> Result<BridgeResponse, IpcError> {
        let json = request.to_json()?;
        self.conn.send_line(&json).await?;

        let line = self.conn.read_line().await?.ok_or(IpcError::UnexpectedEof)?;
        Ok(BridgeResponse::from_json(&line)?)
    }

    /// Send a request and unwrap a successful payload.
    async fn call(&mut self, request: BridgeRequest) -> Result<Option<ResponseData>, IpcError> {
        self.send(request).await?.into_result().map_err(IpcError::Rejected)
    }

    /// Obtain a fresh token and remember it.
    pub async fn get_token(&mut self) -> Result<String, IpcError> {
        let token = self
            .call(BridgeRequest::get_token())
            .await?
            .and_then(|data| data.as_text().map(str::to_string))
            .ok_or_else(|| IpcError::Rejected("daemon returned no token".to_string()))?;

        self.token = Some(token.clone());
        Ok(token)
    }

    /// Create or overwrite `path` with `content`.
    pub async fn create_file(&mut self, path: &str, content: Vec<u8>) -> Result<String, IpcError> {
        let data = self.call(BridgeRequest::create_file(path, content)).await?;
        Ok(confirmation(data))
    }

    /// Read the content of `path`.
    pub async fn read_file(&mut self, path: &str) -> Result<Vec<u8>, IpcError> {
        match self.call(BridgeRequest::read_file(path)).await? {
            Some(data) => Ok(data.into_bytes()?),
            None => Ok(Vec::new()),
        }
    }

    /// Delete `path`.
    pub async fn delete_file(&mut self, path: &str) -> Result<String, IpcError> {
        let data = self.call(BridgeRequest::delete_file(path)).await?;
        Ok(confirmation(data))
    }

    /// List the directory at `path`; an empty path lists the root.
    pub async fn list_files(&mut self, path: &str) -> Result<Vec<DirectoryEntry>, IpcError> {
        match self.call(BridgeRequest::list_files(path)).await? {
            Some(data) => Ok(data.into_entries()?),
            None => Ok(Vec::new()),
        }
    }
}

fn confirmation(data: Option<ResponseData>) -> String {
    data.and_then(|data| data.as_text().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::server::IpcServer;
    use protocol::EntryKind;
    use tempfile::tempdir;

    const MAX_LINE: usize = 64 * 1024;

    #[tokio::test]
    async fn test_client_connect_fails_when_daemon_not_running() {
        let temp_dir = tempdir().unwrap();
        let socket_path = temp_dir.path().join("nonexistent.sock");

        let result = IpcClient::connect(&socket_path).await;
        assert!(matches!(result, Err(IpcError::Io(_))));
    }

    #[tokio::test]
    async fn test_client_remembers_token() {
        let temp_dir = tempdir().unwrap();
        let socket_path = temp_dir.path().join("test.sock");

        let server = IpcServer::bind(&socket_path, MAX_LINE).await.unwrap();

        let server_handle = tokio::spawn(async move {
            let mut conn = server.accept().await.unwrap();

            let line = conn.read_line().await.unwrap().unwrap();
            let request = BridgeRequest::from_json(&line).unwrap();
            assert_eq!(request, BridgeRequest::get_token());
            conn.send_response(&BridgeResponse::ok(ResponseData::Text("tok".to_string())))
                .await
                .unwrap();

            let line = conn.read_line().await.unwrap().unwrap();
            let request = BridgeRequest::from_json(&line).unwrap();
            assert_eq!(request.token.as_deref(), Some("tok"));
            conn.send_response(&BridgeResponse::ok(ResponseData::Bytes(b"hi".to_vec())))
                .await
                .unwrap();
        });

        let mut client = IpcClient::connect(&socket_path).await.unwrap();
        assert_eq!(client.get_token().await.unwrap(), "tok");
        assert_eq!(client.token(), Some("tok"));
        assert_eq!(client.read_file("a.txt").await.unwrap(), b"hi");

        server_handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_client_list_files() {
        let temp_dir = tempdir().unwrap();
        let socket_path = temp_dir.path().join("test.sock");

        let server = IpcServer::bind(&socket_path, MAX_LINE).await.unwrap();

        let server_handle = tokio::spawn(async move {
            let mut conn = server.accept().await.unwrap();
            let line = conn.read_line().await.unwrap().unwrap();
            let request = BridgeRequest::from_json(&line).unwrap();
            assert_eq!(request.relative_path.as_deref(), Some("docs"));
            conn.send_response(&BridgeResponse::ok(ResponseData::Entries(vec![
                DirectoryEntry {
                    name: "a.txt".to_string(),
                    kind: EntryKind::File,
                    relative_path: "docs/a.txt".to_string(),
                },
            ])))
            .await
            .unwrap();
        });

        let mut client = IpcClient::connect(&socket_path).await.unwrap();
        let entries = client.list_files("docs").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].relative_path, "docs/a.txt");

        server_handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_client_failure_response_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let socket_path = temp_dir.path().join("test.sock");

        let server = IpcServer::bind(&socket_path, MAX_LINE).await.unwrap();

        let server_handle = tokio::spawn(async move {
            let mut conn = server.accept().await.unwrap();
            conn.read_line().await.unwrap().unwrap();
            conn.send_response(&BridgeResponse::failure("file not found"))
                .await
                .unwrap();
        });

        let mut client = IpcClient::connect(&socket_path).await.unwrap();
        let err = client.delete_file("gone.txt").await.unwrap_err();
        match err {
            IpcError::Rejected(message) => assert_eq!(message, "file not found"),
            other => panic!("Expected Rejected, got {other:?}"),
        }

        server_handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_client_unexpected_eof() {
        let temp_dir = tempdir().unwrap();
        let socket_path = temp_dir.path().join("test.sock");

        let server = IpcServer::bind(&socket_path, MAX_LINE).await.unwrap();

        let server_handle = tokio::spawn(async move {
            let mut conn = server.accept().await.unwrap();
            conn.read_line().await.unwrap().unwrap();
            // Connection drops without a response
        });

        let mut client = IpcClient::connect(&socket_path).await.unwrap();
        let result = client.send(BridgeRequest::get_token()).await;
        assert!(matches!(result, Err(IpcError::UnexpectedEof)));

        server_handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_client_timeout() {
        let temp_dir = tempdir().unwrap();
        let socket_path = temp_dir.path().join("test.sock");

        let server = IpcServer::bind(&socket_path, MAX_LINE).await.unwrap();

        // Server that never responds
        let _server_handle = tokio::spawn(async move {
            let _conn = server.accept().await.unwrap();
            // Don't read or respond, just sleep
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let mut client =
            IpcClient::connect_with_timeout(&socket_path, Duration::from_millis(100))
                .await
                .unwrap();

        let result = client.send(BridgeRequest::get_token()).await;
        assert!(matches!(result, Err(IpcError::Timeout)));
    }
}

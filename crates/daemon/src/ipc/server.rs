//! IPC Server for handling bridge clients via Unix Domain Sockets.
//!
//! The server listens on a Unix socket and accepts connections from local
//! clients. Each connection carries newline-delimited JSON in both directions.

use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

use futures_util::{SinkExt, StreamExt};
use protocol::{BridgeResponse, ProtocolError};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Framed};

/// Mode of the directory created to hold the socket.
const SOCKET_DIR_MODE: u32 = 0o700;

/// Mode of the socket file.
const SOCKET_FILE_MODE: u32 = 0o600;

/// Frame terminator in both directions.
const LINE_DELIMITER: &[u8] = b"\n";

/// A server that listens for IPC connections on a Unix Domain Socket.
///
/// The socket file is removed when the server is dropped.
pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
    max_line_length: usize,
}

impl IpcServer {
    /// Bind the server to the specified socket path.
    ///
    /// Missing parent directories are created with mode 0700 and the socket
    /// itself gets mode 0600. A leftover socket file from a previous run is
    /// removed, but if something is still accepting connections on it the
    /// bind fails with [`IpcError::AlreadyRunning`].
    ///
    /// Request lines longer than `max_line_length` bytes are refused.
    pub async fn bind(path: &Path, max_line_length: usize) -> Result<Self, IpcError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::DirBuilder::new()
                    .recursive(true)
                    .mode(SOCKET_DIR_MODE)
                    .create(parent)?;
            }
        }

        if path.exists() {
            if UnixStream::connect(path).await.is_ok() {
                return Err(IpcError::AlreadyRunning(path.to_path_buf()));
            }
            tracing::debug!(path = ?path, "Removing stale socket file");
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(SOCKET_FILE_MODE))?;

        Ok(Self {
            listener,
            path: path.to_path_buf(),
            max_line_length,
        })
    }

    /// Path of the socket file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept a new incoming connection.
    ///
    /// This method blocks until a client connects.
    pub async fn accept(&self) -> Result<IpcConnection, IpcError> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(IpcConnection::new(stream, self.max_line_length))
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = ?self.path, error = %e, "Failed to remove socket file");
            }
        }
    }
}

/// One end of a line-framed connection.
///
/// Used by the server for each accepted client and by [`super::IpcClient`]
/// for its connection to the daemon.
pub struct IpcConnection {
    framed: Framed<UnixStream, AnyDelimiterCodec>,
    max_line_length: usize,
}

impl IpcConnection {
    /// Wrap a Unix stream, refusing incoming lines longer than
    /// `max_line_length` bytes.
    pub fn new(stream: UnixStream, max_line_length: usize) -> Self {
        Self {
            framed: Framed::new(
                stream,
                AnyDelimiterCodec::new_with_max_length(
                    LINE_DELIMITER.to_vec(),
                    LINE_DELIMITER.to_vec(),
                    max_line_length,
                ),
            ),
            max_line_length,
        }
    }

    /// Read the next line from the peer, without its terminator.
    ///
    /// Returns `None` if the peer has disconnected. Reading is cancel safe:
    /// a partially received line stays buffered.
    ///
    /// A line that is not valid UTF-8 is consumed and reported as
    /// [`IpcError::InvalidUtf8`]; the connection stays usable.
    pub async fn read_line(&mut self) -> Result<Option<String>, IpcError> {
        let chunk = match self.framed.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                return Err(IpcError::FrameTooLong {
                    limit: self.max_line_length,
                })
            }
            Some(Err(AnyDelimiterCodecError::Io(e))) => return Err(IpcError::Io(e)),
            None => return Ok(None),
        };

        let line = chunk.strip_suffix(b"\r").unwrap_or(&chunk[..]);
        match std::str::from_utf8(line) {
            Ok(line) => Ok(Some(line.to_string())),
            Err(_) => Err(IpcError::InvalidUtf8),
        }
    }

    /// Write one line to the peer. The newline is appended here.
    pub async fn send_line(&mut self, line: &str) -> Result<(), IpcError> {
        self.framed.send(line).await.map_err(|e| match e {
            AnyDelimiterCodecError::Io(e) => IpcError::Io(e),
            AnyDelimiterCodecError::MaxChunkLengthExceeded => IpcError::FrameTooLong {
                limit: self.max_line_length,
            },
        })
    }

    /// Send a response to the client.
    pub async fn send_response(&mut self, response: &BridgeResponse) -> Result<(), IpcError> {
        let json = response.to_json()?;
        self.send_line(&json).await
    }
}

/// Errors that can occur during IPC communication.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The peer sent a line longer than allowed.
    #[error("request exceeds {limit} bytes")]
    FrameTooLong { limit: usize },

    /// The peer sent a line that is not valid UTF-8.
    #[error("request is not valid UTF-8")]
    InvalidUtf8,

    /// Another process is already serving the socket.
    #[error("another instance is already listening on {}", .0.display())]
    AlreadyRunning(PathBuf),

    /// The peer closed the connection before answering.
    #[error("daemon closed connection")]
    UnexpectedEof,

    /// The operation did not finish in time.
    #[error("operation timed out")]
    Timeout,

    /// The daemon answered with a failure response.
    #[error("request failed: {0}")]
    Rejected(String),
}

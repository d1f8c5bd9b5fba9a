//! Request router for the bridge protocol.
//!
//! This module provides the `RequestRouter` struct that turns one request line
//! into one response: it parses the request, authenticates it against the
//! token store and hands file commands to the file service. It holds no
//! per-connection state, so one router is shared by every connection.

use std::sync::Arc;

use protocol::{BridgeRequest, BridgeResponse, Command, ResponseData};
use tracing::{debug, warn};

use crate::files::{FileError, FileService};
use crate::tokens::{fingerprint, TokenStore};

/// Errors that can occur while routing a request.
///
/// The `Display` output is sent to the client as the error message.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// The line is not a valid request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request has no command.
    #[error("invalid request: missing command")]
    MissingCommand,

    /// The token is absent, unknown or expired.
    #[error("authentication failed: invalid or missing token")]
    Unauthorized,

    /// The command name is not recognized.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Required request fields are absent.
    #[error("missing {fields} for {command}")]
    MissingArguments {
        fields: &'static str,
        command: Command,
    },

    /// File operation error.
    #[error(transparent)]
    File(#[from] FileError),
}

impl From<RouterError> for BridgeResponse {
    fn from(err: RouterError) -> Self {
        BridgeResponse::failure(err.to_string())
    }
}

/// Routes requests to the token store and the file service.
#[derive(Debug, Clone)]
pub struct RequestRouter {
    tokens: Arc<TokenStore>,
    files: Arc<FileService>,
    require_authentication: bool,
}

impl RequestRouter {
    /// Create a router.
    ///
    /// When `require_authentication` is false, file commands are served
    /// without checking the token.
    pub fn new(
        tokens: Arc<TokenStore>,
        files: Arc<FileService>,
        require_authentication: bool,
    ) -> Self {
        Self {
            tokens,
            files,
            require_authentication,
        }
    }

    /// Handle one raw request line.
    pub async fn handle_line(&self, line: &str) -> BridgeResponse {
        match BridgeRequest::from_json(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                warn!(error = %e, "Rejected malformed request");
                RouterError::InvalidRequest(e.to_string()).into()
            }
        }
    }

    /// Handle one parsed request.
    pub async fn handle(&self, request: BridgeRequest) -> BridgeResponse {
        match self.route(request).await {
            Ok(data) => BridgeResponse::ok(data),
            Err(e) => e.into(),
        }
    }

    async fn route(&self, request: BridgeRequest) -> Result<ResponseData, RouterError> {
        let name = request
            .command
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(RouterError::MissingCommand)?;

        let command = Command::from_name(name);
        debug!(command = name, "Routing request");

        if command == Some(Command::GetToken) {
            return Ok(ResponseData::Text(self.tokens.issue()));
        }

        self.authenticate(request.token.as_deref())?;

        let command = command.ok_or_else(|| {
            warn!(command = name, "Rejected unknown command");
            RouterError::UnknownCommand(name.to_string())
        })?;

        match command {
            Command::GetToken => Ok(ResponseData::Text(self.tokens.issue())),
            Command::CreateFile => {
                let (path, content) = match (required_path(&request), request.content.as_deref()) {
                    (Some(path), Some(content)) => (path, content),
                    (None, None) => return Err(missing("relative path and content", command)),
                    (None, Some(_)) => return Err(missing("relative path", command)),
                    (Some(_), None) => return Err(missing("content", command)),
                };
                let message = self.files.create(path, content).await?;
                Ok(ResponseData::Text(message))
            }
            Command::ReadFile => {
                let path = required_path(&request).ok_or(missing("relative path", command))?;
                Ok(ResponseData::Bytes(self.files.read(path).await?))
            }
            Command::DeleteFile => {
                let path = required_path(&request).ok_or(missing("relative path", command))?;
                Ok(ResponseData::Text(self.files.delete(path).await?))
            }
            Command::ListFiles => {
                let path = request.relative_path.as_deref().unwrap_or("");
                Ok(ResponseData::Entries(self.files.list(path).await?))
            }
        }
    }

    fn authenticate(&self, token: Option<&str>) -> Result<(), RouterError> {
        if !self.require_authentication {
            return Ok(());
        }

        match token {
            Some(token) if self.tokens.validate(token) => Ok(()),
            Some(token) => {
                warn!(token_id = %fingerprint(token), "Authentication failed: invalid token");
                Err(RouterError::Unauthorized)
            }
            None => {
                warn!("Authentication failed: missing token");
                Err(RouterError::Unauthorized)
            }
        }
    }
}

/// The request path, unless absent or blank.
fn required_path(request: &BridgeRequest) -> Option<&str> {
    request
        .relative_path
        .as_deref()
        .filter(|path| !path.trim().is_empty())
}

fn missing(fields: &'static str, command: Command) -> RouterError {
    RouterError::MissingArguments { fields, command }
}

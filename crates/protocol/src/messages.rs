//! Protocol message definitions for FileBridge.
//!
//! Every message is a single JSON object on its own line. Field names are
//! PascalCase on the wire so that existing clients of the bridge keep working.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Commands understood by the bridge.
///
/// On the wire the command is a free-form string matched case-insensitively,
/// which is why [`BridgeRequest::command`] stays a `String`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Issue a new bearer token. Never requires authentication.
    GetToken,
    /// Create or overwrite a file.
    CreateFile,
    /// Read a file's full content.
    ReadFile,
    /// Delete a file.
    DeleteFile,
    /// List a directory.
    ListFiles,
}

impl Command {
    /// All commands, in wire-name order.
    pub const ALL: [Command; 5] = [
        Command::GetToken,
        Command::CreateFile,
        Command::ReadFile,
        Command::DeleteFile,
        Command::ListFiles,
    ];

    /// Canonical wire name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            Command::GetToken => "GetToken",
            Command::CreateFile => "CreateFile",
            Command::ReadFile => "ReadFile",
            Command::DeleteFile => "DeleteFile",
            Command::ListFiles => "ListFiles",
        }
    }

    /// Look up a command by name, ignoring ASCII case and surrounding whitespace.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single request sent by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BridgeRequest {
    /// Bearer token obtained through `GetToken`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Command name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Path relative to the bridge root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<String>,
    /// File content for `CreateFile`, base64 on the wire.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::encoding::base64_bytes::option"
    )]
    pub content: Option<Vec<u8>>,
}

impl BridgeRequest {
    /// Create a request for the given command with no arguments.
    pub fn new(command: Command) -> Self {
        Self {
            command: Some(command.as_str().to_string()),
            ..Self::default()
        }
    }

    /// Request a fresh token.
    pub fn get_token() -> Self {
        Self::new(Command::GetToken)
    }

    /// Request creation of `path` with `content`.
    pub fn create_file(path: impl Into<String>, content: Vec<u8>) -> Self {
        Self::new(Command::CreateFile)
            .with_path(path)
            .with_content(content)
    }

    /// Request the content of `path`.
    pub fn read_file(path: impl Into<String>) -> Self {
        Self::new(Command::ReadFile).with_path(path)
    }

    /// Request deletion of `path`.
    pub fn delete_file(path: impl Into<String>) -> Self {
        Self::new(Command::DeleteFile).with_path(path)
    }

    /// Request a listing of `path` (empty string lists the root).
    pub fn list_files(path: impl Into<String>) -> Self {
        Self::new(Command::ListFiles).with_path(path)
    }

    /// Attach a bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the relative path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.relative_path = Some(path.into());
        self
    }

    /// Set the file content.
    pub fn with_content(mut self, content: Vec<u8>) -> Self {
        self.content = Some(content);
        self
    }

    /// Parse a request from one line of input.
    pub fn from_json(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    /// Serialize the request as a single line (without the trailing newline).
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// The response to a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BridgeResponse {
    /// Whether the request succeeded.
    pub success: bool,
    /// Human-readable reason for a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Result payload for a success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

impl BridgeResponse {
    /// A successful response carrying `data`.
    pub fn ok(data: ResponseData) -> Self {
        Self {
            success: true,
            error_message: None,
            data: Some(data),
        }
    }

    /// A failed response with the given message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            data: None,
        }
    }

    /// Split the response into its payload or its error message.
    pub fn into_result(self) -> std::result::Result<Option<ResponseData>, String> {
        if self.success {
            Ok(self.data)
        } else {
            Err(self
                .error_message
                .unwrap_or_else(|| "request failed".to_string()))
        }
    }

    /// Parse a response from one line of input.
    pub fn from_json(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    /// Serialize the response as a single line (without the trailing newline).
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Polymorphic response payload.
///
/// Serialized untagged: `Text` and `Bytes` are both JSON strings (the latter
/// base64), `Entries` is an array of objects. A deserializer cannot tell text
/// from bytes, so a string payload always comes back as `Text`; callers that
/// expect bytes use [`ResponseData::into_bytes`], which decodes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    /// A directory listing.
    Entries(Vec<DirectoryEntry>),
    /// A token or confirmation message.
    Text(String),
    /// Raw file content.
    Bytes(#[serde(with = "crate::encoding::base64_bytes")] Vec<u8>),
}

impl ResponseData {
    /// The payload as text, if it is a string payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseData::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The payload as file content.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            ResponseData::Bytes(bytes) => Ok(bytes),
            ResponseData::Text(encoded) => Ok(BASE64.decode(encoded)?),
            ResponseData::Entries(_) => Err(ProtocolError::UnexpectedPayload {
                expected: "file content",
            }),
        }
    }

    /// The payload as a directory listing.
    pub fn into_entries(self) -> Result<Vec<DirectoryEntry>> {
        match self {
            ResponseData::Entries(entries) => Ok(entries),
            _ => Err(ProtocolError::UnexpectedPayload {
                expected: "directory listing",
            }),
        }
    }
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DirectoryEntry {
    /// File or directory name.
    pub name: String,
    /// Entry kind.
    #[serde(rename = "Type")]
    pub kind: EntryKind,
    /// Path relative to the bridge root, `/`-separated.
    pub relative_path: String,
}

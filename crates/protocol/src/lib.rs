//! # FileBridge Protocol Library
//!
//! Wire types shared by the FileBridge daemon and its clients.
//!
//! ## Overview
//!
//! The bridge speaks a deliberately small protocol over a local stream socket:
//!
//! - one JSON object per line, UTF-8, newline-terminated, in both directions
//! - strictly one request in flight per connection
//! - byte payloads carried as base64 strings
//!
//! ```text
//! client                                   daemon
//!   │  {"Command":"GetToken"}\n              │
//!   │ ─────────────────────────────────────▶ │
//!   │  {"Success":true,"Data":"q3Zk..."}\n   │
//!   │ ◀───────────────────────────────────── │
//!   │  {"Token":"q3Zk...","Command":         │
//!   │   "ReadFile","RelativePath":"a.txt"}\n │
//!   │ ─────────────────────────────────────▶ │
//!   │  {"Success":true,"Data":"aGVsbG8="}\n  │
//!   │ ◀───────────────────────────────────── │
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{BridgeRequest, BridgeResponse, ResponseData};
//!
//! let request = BridgeRequest::create_file("notes/today.txt", b"hello".to_vec())
//!     .with_token("q3Zk");
//! let line = request.to_json().unwrap();
//! assert!(line.contains(r#""Content":"aGVsbG8=""#));
//!
//! let response = BridgeResponse::from_json(r#"{"Success":true,"Data":"aGVsbG8="}"#).unwrap();
//! let bytes = response.into_result().unwrap().unwrap().into_bytes().unwrap();
//! assert_eq!(bytes, b"hello");
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Request, response and payload definitions
//! - [`encoding`]: Base64 serde helpers for byte fields
//! - [`error`]: Error types

pub mod encoding;
pub mod error;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use messages::{BridgeRequest, BridgeResponse, Command, DirectoryEntry, EntryKind, ResponseData};

/// The literal allow-list entry that disables extension filtering.
pub const WILDCARD_EXTENSION: &str = "*";

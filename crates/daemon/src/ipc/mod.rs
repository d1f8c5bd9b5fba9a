//! Unix Domain Socket IPC module for the bridge.
//!
//! This module provides the local communication channel between the daemon
//! and its clients using Unix Domain Sockets.
//!
//! ## Overview
//!
//! The IPC system uses a JSON newline-delimited protocol. Each message is a
//! single JSON object followed by a newline, and every request is answered by
//! exactly one response before the next request is read.
//!
//! ## Socket Path
//!
//! The socket path follows the XDG Base Directory Specification:
//! - Primary: `$XDG_RUNTIME_DIR/filebridge/bridge.sock`
//! - Fallback: `/tmp/filebridge-$UID/bridge.sock`
//!
//! ## Example
//!
//! ```rust,no_run
//! use daemon::ipc::{IpcClient, get_socket_path};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let socket_path = get_socket_path();
//!     let mut client = IpcClient::connect(&socket_path).await?;
//!
//!     client.get_token().await?;
//!     client.create_file("notes/today.txt", b"hello".to_vec()).await?;
//!     let content = client.read_file("notes/today.txt").await?;
//!     assert_eq!(content, b"hello");
//!
//!     Ok(())
//! }
//! ```

mod client;
mod server;

pub use client::{IpcClient, DEFAULT_TIMEOUT_SECS};
pub use server::{IpcConnection, IpcError, IpcServer};

use std::path::PathBuf;

/// Get the default socket path for the bridge.
///
/// ## Path Resolution
///
/// 1. If `$XDG_RUNTIME_DIR` is set: `$XDG_RUNTIME_DIR/filebridge/bridge.sock`
/// 2. Otherwise: `/tmp/filebridge-$UID/bridge.sock`
///
/// The `ipc.socket_path` configuration value takes precedence over both.
pub fn get_socket_path() -> PathBuf {
    use std::os::unix::fs::MetadataExt;

    match std::env::var("XDG_RUNTIME_DIR") {
        Ok(runtime_dir) if !runtime_dir.is_empty() => PathBuf::from(runtime_dir)
            .join("filebridge")
            .join("bridge.sock"),
        _ => {
            // Get UID by checking metadata of a file we own
            let uid = std::fs::metadata("/proc/self")
                .map(|m| m.uid())
                .unwrap_or(0);

            PathBuf::from(format!("/tmp/filebridge-{}", uid)).join("bridge.sock")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_get_socket_path_with_xdg_runtime_dir() {
        let original = std::env::var("XDG_RUNTIME_DIR").ok();

        std::env::set_var("XDG_RUNTIME_DIR", "/run/user/1000");
        let path = get_socket_path();
        assert_eq!(path, PathBuf::from("/run/user/1000/filebridge/bridge.sock"));

        match original {
            Some(val) => std::env::set_var("XDG_RUNTIME_DIR", val),
            None => std::env::remove_var("XDG_RUNTIME_DIR"),
        }
    }

    #[test]
    #[serial]
    fn test_get_socket_path_without_xdg_runtime_dir() {
        let original = std::env::var("XDG_RUNTIME_DIR").ok();

        std::env::remove_var("XDG_RUNTIME_DIR");
        let path = get_socket_path();
        assert!(path.to_str().unwrap().starts_with("/tmp/filebridge-"));
        assert!(path.to_str().unwrap().ends_with("/bridge.sock"));

        if let Some(val) = original {
            std::env::set_var("XDG_RUNTIME_DIR", val);
        }
    }

    #[test]
    #[serial]
    fn test_socket_path_is_absolute() {
        let path = get_socket_path();
        assert!(path.is_absolute());
        assert!(path.extension().map(|e| e == "sock").unwrap_or(false));
    }
}

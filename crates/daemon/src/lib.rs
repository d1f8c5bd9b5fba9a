//! # FileBridge Daemon Library
//!
//! This crate provides the daemon (server) side of FileBridge: a local agent
//! that exposes one directory to other processes on the same machine through a
//! Unix socket, gated by short-lived bearer tokens.
//!
//! ## Overview
//!
//! The daemon provides:
//!
//! - **Token Store**: Issue, validate and sweep bearer tokens
//! - **File Operations**: Create, read, delete and list files below the root
//! - **Path Guard**: Confine every path to the root and filter extensions
//! - **Connection Dispatcher**: Serve newline-delimited JSON over a Unix socket
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Bridge Orchestrator                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌───────────────────────────┐  ┌───────────────────────────┐   │
//! │  │  Connection Dispatcher    │  │     Token Sweeper         │   │
//! │  │  (IpcServer, JoinSet)     │  │                           │   │
//! │  └─────────────┬─────────────┘  └─────────────┬─────────────┘   │
//! │                │                              │                 │
//! │  ┌─────────────▼──────────────────────────────▼─────────────┐   │
//! │  │                   Request Router                         │   │
//! │  └─────────────┬──────────────────────────────┬─────────────┘   │
//! │                │                              │                 │
//! │  ┌─────────────▼─────────────┐  ┌─────────────▼─────────────┐   │
//! │  │  File Service + Guard     │  │       Token Store         │   │
//! │  └───────────────────────────┘  └───────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::{BridgeOrchestrator, Config};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!
//!     let mut orchestrator = BridgeOrchestrator::new(config)?;
//!     orchestrator.start(CancellationToken::new()).await?;
//!
//!     // The bridge is now accepting connections
//!     // Wait for shutdown signal...
//!
//!     orchestrator.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`logging`]: Tracing subscriber setup
//! - [`files`]: Path validation and file operations
//! - [`tokens`]: Bearer token store
//! - [`router`]: Request routing and authentication
//! - [`ipc`]: Unix socket server and client
//! - [`dispatcher`]: Per-connection request loop
//! - [`orchestrator`]: Main bridge coordinator

pub mod config;
pub mod dispatcher;
pub mod files;
pub mod ipc;
pub mod logging;
pub mod orchestrator;
pub mod router;
pub mod tokens;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export files types for convenience
pub use files::{FileError, FileService, PathError, PathGuard};

// Re-export token types for convenience
pub use tokens::TokenStore;

// Re-export router types for convenience
pub use router::{RequestRouter, RouterError};

// Re-export IPC types for convenience
pub use ipc::{IpcClient, IpcError, IpcServer};

// Re-export orchestrator types for convenience
pub use dispatcher::Dispatcher;
pub use orchestrator::{BridgeOrchestrator, OrchestratorEvent, OrchestratorState};

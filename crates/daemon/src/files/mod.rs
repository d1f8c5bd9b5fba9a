//! File access module for the bridge root.
//!
//! This module provides the restricted file surface exposed to clients:
//! - Lexical path validation and extension filtering ([`PathGuard`])
//! - Create, read, delete and list operations ([`FileService`])
//! - Atomic file writes using temp files
//!
//! # Security
//!
//! Every path is resolved against the configured root before any file system
//! call. Paths that escape the root, lexically or through symlinks, are
//! rejected without revealing where they pointed.

pub mod guard;
pub mod operations;

pub use guard::{PathError, PathGuard};
pub use operations::{FileError, FileService};

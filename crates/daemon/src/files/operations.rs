//! File operations confined to the bridge root.
//!
//! Every operation resolves its path through the [`PathGuard`] first, then
//! checks that the real location of the deepest existing ancestor is still
//! inside the canonical root. Error messages are shown to clients verbatim,
//! so they never contain absolute paths.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use protocol::{DirectoryEntry, EntryKind};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, warn};

use super::guard::{is_within, PathError, PathGuard};
use crate::config::ServiceConfig;

/// Errors returned by [`FileService`].
///
/// The `Display` output is the message sent back to the client.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("invalid or unsafe path")]
    InvalidPath(#[source] PathError),

    #[error("file extension not allowed")]
    ExtensionNotAllowed,

    #[error("file size exceeds maximum allowed ({limit} bytes)")]
    TooLarge { limit: u64 },

    #[error("file not found")]
    NotFound,

    #[error("directory not found")]
    DirectoryNotFound,

    #[error("error creating file: {0}")]
    Create(#[source] std::io::Error),

    #[error("error reading file: {0}")]
    Read(#[source] std::io::Error),

    #[error("error deleting file: {0}")]
    Delete(#[source] std::io::Error),

    #[error("error listing files: {0}")]
    List(#[source] std::io::Error),

    /// The root folder could not be created or resolved. Only returned by
    /// [`FileService::new`].
    #[error("failed to initialize root folder {path}: {source}")]
    RootInit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<PathError> for FileError {
    fn from(err: PathError) -> Self {
        FileError::InvalidPath(err)
    }
}

/// Create, read, delete and list files below one root.
#[derive(Debug, Clone)]
pub struct FileService {
    guard: PathGuard,
    max_file_size: u64,
}

impl FileService {
    /// Create the service, creating and canonicalizing `root`.
    pub fn new(
        root: impl AsRef<Path>,
        max_file_size: u64,
        allowed_extensions: &[String],
    ) -> Result<Self, FileError> {
        let root = root.as_ref();
        let init_err = |source| FileError::RootInit {
            path: root.to_path_buf(),
            source,
        };

        std::fs::create_dir_all(root).map_err(init_err)?;
        let canonical = std::fs::canonicalize(root).map_err(init_err)?;

        info!(root = %canonical.display(), max_file_size, "File service ready");

        Ok(Self {
            guard: PathGuard::new(canonical, allowed_extensions),
            max_file_size,
        })
    }

    /// Create the service from the `[service]` configuration section.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, FileError> {
        Self::new(
            &config.root_folder,
            config.max_file_size,
            &config.allowed_extensions,
        )
    }

    /// Canonical root folder.
    pub fn root(&self) -> &Path {
        self.guard.root()
    }

    /// Largest accepted file, in bytes.
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Create or overwrite `relative` with `content`.
    ///
    /// Parent directories are created as needed. The content is written to a
    /// temporary sibling and renamed over the target.
    pub async fn create(&self, relative: &str, content: &[u8]) -> Result<String, FileError> {
        let path = self.resolve(relative).await?;

        // The root itself is never a file target; its temp sibling would
        // land outside the root.
        if path == self.root() || path.file_name().is_none() {
            warn!(path = relative, "Create rejected: path names the root");
            return Err(FileError::InvalidPath(PathError::Traversal));
        }

        if !self.guard.is_extension_allowed(&path) {
            warn!(path = relative, "Create rejected: extension not allowed");
            return Err(FileError::ExtensionNotAllowed);
        }
        if content.len() as u64 > self.max_file_size {
            warn!(
                path = relative,
                size = content.len(),
                limit = self.max_file_size,
                "Create rejected: file too large"
            );
            return Err(FileError::TooLarge {
                limit: self.max_file_size,
            });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(FileError::Create)?;
        }

        let temp_path = temp_sibling(&path);
        let written = match fs::write(&temp_path, content).await {
            Ok(()) => fs::rename(&temp_path, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(path = ?temp_path, error = %cleanup, "Failed to cleanup temp file");
                }
            }
            error!(path = relative, error = %e, "Create failed");
            return Err(FileError::Create(e));
        }

        info!(path = relative, size = content.len(), "File created");
        Ok(format!("file '{relative}' created successfully"))
    }

    /// Read the full content of `relative`.
    pub async fn read(&self, relative: &str) -> Result<Vec<u8>, FileError> {
        let path = self.resolve(relative).await?;

        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(FileError::NotFound),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(FileError::NotFound),
            Err(e) => return Err(FileError::Read(e)),
        }

        if !self.guard.is_extension_allowed(&path) {
            warn!(path = relative, "Read rejected: extension not allowed");
            return Err(FileError::ExtensionNotAllowed);
        }

        let content = fs::read(&path).await.map_err(|e| {
            error!(path = relative, error = %e, "Read failed");
            FileError::Read(e)
        })?;

        info!(path = relative, size = content.len(), "File read");
        Ok(content)
    }

    /// Delete the file at `relative`. Directories are never removed.
    pub async fn delete(&self, relative: &str) -> Result<String, FileError> {
        let path = self.resolve(relative).await?;

        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(FileError::NotFound),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(FileError::NotFound),
            Err(e) => return Err(FileError::Delete(e)),
        }

        if !self.guard.is_extension_allowed(&path) {
            warn!(path = relative, "Delete rejected: extension not allowed");
            return Err(FileError::ExtensionNotAllowed);
        }

        fs::remove_file(&path).await.map_err(|e| {
            error!(path = relative, error = %e, "Delete failed");
            FileError::Delete(e)
        })?;

        info!(path = relative, "File deleted");
        Ok(format!("file '{relative}' deleted successfully"))
    }

    /// List the directory at `relative`.
    ///
    /// Subdirectories come first, then files whose extension is allowed. Each
    /// group is sorted by name.
    pub async fn list(&self, relative: &str) -> Result<Vec<DirectoryEntry>, FileError> {
        let path = self.resolve(relative).await?;

        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(FileError::DirectoryNotFound),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FileError::DirectoryNotFound)
            }
            Err(e) => return Err(FileError::List(e)),
        }

        let mut directories = Vec::new();
        let mut files = Vec::new();

        let mut reader = fs::read_dir(&path).await.map_err(FileError::List)?;
        while let Some(entry) = reader.next_entry().await.map_err(FileError::List)? {
            let entry_path = entry.path();
            let is_symlink = entry
                .file_type()
                .await
                .map(|t| t.is_symlink())
                .unwrap_or(false);

            if is_symlink {
                match fs::canonicalize(&entry_path).await {
                    Ok(target) if is_within(&target, self.root()) => {}
                    Ok(_) => {
                        debug!(path = ?entry_path, "Skipping symlink that leaves the root");
                        continue;
                    }
                    Err(_) => {
                        debug!(path = ?entry_path, "Skipping dangling symlink");
                        continue;
                    }
                }
            }

            // Follows symlinks so links are classified by their target.
            let Ok(meta) = fs::metadata(&entry_path).await else {
                continue;
            };

            // Clients address entries by UTF-8 path, so other names are unreachable.
            let Ok(name) = entry.file_name().into_string() else {
                debug!(path = ?entry_path, "Skipping entry with non-UTF-8 name");
                continue;
            };
            let relative_path = self.relative_to_root(&entry_path);

            if meta.is_dir() {
                directories.push(DirectoryEntry {
                    name,
                    kind: EntryKind::Directory,
                    relative_path,
                });
            } else if meta.is_file() && self.guard.is_extension_allowed(&entry_path) {
                files.push(DirectoryEntry {
                    name,
                    kind: EntryKind::File,
                    relative_path,
                });
            }
        }

        directories.sort_by(|a, b| a.name.cmp(&b.name));
        files.sort_by(|a, b| a.name.cmp(&b.name));
        directories.append(&mut files);

        info!(
            path = relative,
            entries = directories.len(),
            "Directory listed"
        );
        Ok(directories)
    }

    /// Resolve `relative` lexically, then make sure symlinks along the
    /// existing part of the path do not lead outside the root.
    async fn resolve(&self, relative: &str) -> Result<PathBuf, FileError> {
        let path = self.guard.resolve(relative).map_err(|e| {
            warn!(path = relative, error = %e, "Rejected unsafe path");
            FileError::from(e)
        })?;

        let mut ancestor = path.clone();
        loop {
            match fs::canonicalize(&ancestor).await {
                Ok(real) if is_within(&real, self.root()) => break,
                Ok(_) => {
                    warn!(path = relative, "Rejected path leaving the root through a symlink");
                    return Err(FileError::InvalidPath(PathError::Traversal));
                }
                Err(_) => {
                    if !ancestor.pop() {
                        break;
                    }
                }
            }
        }

        Ok(path)
    }

    /// `/`-separated path of `path` relative to the root.
    fn relative_to_root(&self, path: &Path) -> String {
        let relative = path.strip_prefix(self.root()).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Unique hidden temporary path next to `path`.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}

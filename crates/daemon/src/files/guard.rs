//! Lexical path validation against the bridge root.
//!
//! The guard never touches the file system. It turns a caller-supplied
//! relative path into an absolute one below the root, or refuses to.
//! Symlink confinement is layered on top by [`super::FileService`].

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Longest accepted path, in bytes.
pub const MAX_PATH_BYTES: usize = 4096;

/// Longest accepted single path segment, in bytes.
pub const MAX_SEGMENT_BYTES: usize = 255;

/// Characters Windows refuses in file names.
#[cfg(windows)]
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Reasons a path is refused.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum PathError {
    /// The path resolves outside the root.
    #[error("path escapes the root directory")]
    Traversal,

    /// The path contains control or reserved characters.
    #[error("path contains invalid characters")]
    InvalidChars,

    /// The path or one of its segments is too long.
    #[error("path is too long")]
    TooLong,
}

/// Validates relative paths and file extensions.
#[derive(Debug, Clone)]
pub struct PathGuard {
    /// Normalized absolute root.
    root: PathBuf,
    /// Lowercased extensions without a leading dot.
    extensions: Vec<String>,
    /// Set when the allow-list contains the wildcard.
    allow_all: bool,
}

impl PathGuard {
    /// Create a guard for `root` with the given extension allow-list.
    ///
    /// Entries are trimmed, lowercased and stripped of a leading dot, so
    /// `".TXT"` and `"txt"` are the same entry.
    pub fn new(root: impl AsRef<Path>, allowed_extensions: &[String]) -> Self {
        let mut allow_all = false;
        let mut extensions = Vec::new();

        for entry in allowed_extensions {
            let entry = entry.trim();
            if entry == protocol::WILDCARD_EXTENSION {
                allow_all = true;
                continue;
            }
            let entry = entry.trim_start_matches('.').to_lowercase();
            if !entry.is_empty() && !extensions.contains(&entry) {
                extensions.push(entry);
            }
        }

        Self {
            root: normalize(root.as_ref()),
            extensions,
            allow_all,
        }
    }

    /// The root every resolved path stays under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `relative` against the root.
    ///
    /// An empty string resolves to the root itself.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, PathError> {
        if relative.len() > MAX_PATH_BYTES {
            return Err(PathError::TooLong);
        }
        if relative.chars().any(is_invalid_char) {
            return Err(PathError::InvalidChars);
        }

        let relative = relative.replace('\\', "/");
        if relative
            .split('/')
            .any(|segment| segment.len() > MAX_SEGMENT_BYTES)
        {
            return Err(PathError::TooLong);
        }

        let resolved = normalize(&self.root.join(&relative));
        if resolved.as_os_str().len() > MAX_PATH_BYTES {
            return Err(PathError::TooLong);
        }
        if !is_within(&resolved, &self.root) {
            return Err(PathError::Traversal);
        }

        Ok(resolved)
    }

    /// Whether the extension of `file_name` is on the allow-list.
    pub fn is_extension_allowed(&self, file_name: impl AsRef<Path>) -> bool {
        if self.allow_all {
            return true;
        }

        match file_name.as_ref().extension() {
            Some(ext) => {
                let ext = ext.to_string_lossy().to_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            }
            None => false,
        }
    }
}

fn is_invalid_char(c: char) -> bool {
    #[cfg(windows)]
    if RESERVED_CHARS.contains(&c) {
        return true;
    }
    c.is_control()
}

/// Lexically resolve `.` and `..` without consulting the file system.
///
/// `..` at the top of an absolute path stays at the top.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                normalized.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
        }
    }
    normalized
}

/// Component-wise containment check.
#[cfg(not(windows))]
pub(crate) fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Component-wise containment check, ignoring case.
#[cfg(windows)]
pub(crate) fn is_within(path: &Path, root: &Path) -> bool {
    let mut path = path.components();
    root.components().all(|expected| match path.next() {
        Some(actual) => actual
            .as_os_str()
            .to_string_lossy()
            .eq_ignore_ascii_case(&expected.as_os_str().to_string_lossy()),
        None => false,
    })
}

//! Error taxonomy for boot image builds.
//!
//! Each variant maps to the pipeline stage that produces it, so a failed build
//! can always be traced back to a stage and an offending path or locator.

use std::path::{Path, PathBuf};

/// Errors produced while building a boot image.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Artifact source unreachable or returned a non-success status.
    #[error("failed to fetch '{name}' from {locator}: {reason}")]
    Fetch {
        name: String,
        locator: String,
        reason: String,
    },

    /// Fetched artifact is not in the expected shape (checksum, unpack result).
    #[error("artifact '{name}' at {path} failed verification: {reason}")]
    Integrity {
        name: String,
        path: PathBuf,
        reason: String,
    },

    #[error("failed to build filesystem tree at {path}: {reason}")]
    TreeBuild { path: PathBuf, reason: String },

    #[error("failed to pack archive {path}: {reason}")]
    Pack { path: PathBuf, reason: String },

    /// A required input is missing or invalid before the build starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// The external init build step failed or produced no binary.
    #[error("init build failed: {0}")]
    Compile(String),

    #[error("build cancelled before {0}")]
    Cancelled(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn tree(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::TreeBuild {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn pack(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Pack {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn integrity(name: &str, path: &Path, reason: impl ToString) -> Self {
        Error::Integrity {
            name: name.to_string(),
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    /// Plain io error at `path`.
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
    /// Io error raised while building the filesystem tree.
    fn tree_ctx(self, path: impl Into<PathBuf>) -> Result<T>;
    /// Io error raised while writing or reading an archive.
    fn pack_ctx(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }

    fn tree_ctx(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| Error::tree(path, e))
    }

    fn pack_ctx(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| Error::pack(path, e))
    }
}

//! Crate-wide error taxonomy.
//!
//! Every fallible public operation returns [`EngineError`]. The application
//! manager (`crate::manager`) compresses these into the five
//! [`crate::manifest::DownloadStatus`] strings a host actually sees; the
//! granular variants here exist so logs and tracker events can carry the
//! detail that status string throws away.

use std::path::PathBuf;

use thiserror::Error;

/// The crate's error type.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("network error (status {http_status:?}): {transport_kind}")]
    Network {
        http_status: Option<u16>,
        transport_kind: String,
    },

    #[error("failed to decode {field_path}: {reason}")]
    Decode { field_path: String, reason: String },

    #[error("checksum mismatch for {file_path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file_path: String,
        expected: String,
        actual: String,
    },

    #[error("path escapes workspace root: {path}")]
    PathEscape { path: PathBuf },

    #[error("I/O error during {op} on {path}: {cause}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("{which:?} timed out")]
    Timeout { which: TimeoutKind },

    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("package version {version} is blacklisted for this workspace")]
    Blacklisted { version: String },

    #[error("manifest fetch delegate did not resolve")]
    DelegateFetchFailed(String),

    #[error("promote aborted and backup restored: {0}")]
    PromoteAborted(String),
}

/// Which timer fired, for [`EngineError::Timeout`] and log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    ReleaseConfig,
    Boot,
}

impl From<std::io::Error> for EngineError {
    fn from(cause: std::io::Error) -> Self {
        EngineError::Io {
            op: "unknown",
            path: PathBuf::new(),
            cause,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Attach an operation label and path to an I/O result, producing
/// [`EngineError::Io`] with useful context instead of the bare
/// [`std::io::Error`].
pub(crate) trait IoContext<T> {
    fn io_ctx(self, op: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for std::result::Result<T, std::io::Error> {
    fn io_ctx(self, op: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|cause| EngineError::Io {
            op,
            path: path.into(),
            cause,
        })
    }
}

//! Error types for physical storage operations.

use eddy_types::ErrorCode;

/// Errors that can occur while touching a physical replica.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No physical file at the replica's location.
    #[error("no physical replica at {resource}:{path}")]
    NotFound { resource: String, path: String },

    /// The leaf resource is not reachable.
    #[error("resource {resource} is down")]
    Unreachable { resource: String },

    /// The physical path escapes the resource vault.
    #[error("invalid physical path: {path}")]
    InvalidPath { path: String },

    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("stat failed: {0}")]
    Stat(#[source] std::io::Error),

    /// Any other I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Protocol-visible error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } | Self::InvalidPath { .. } | Self::Io(_) => {
                ErrorCode::UnixFileOpenErr
            }
            Self::Unreachable { .. } => ErrorCode::SysRescIsDown,
            Self::Read(_) => ErrorCode::UnixFileReadErr,
            Self::Write(_) => ErrorCode::UnixFileWriteErr,
            Self::Stat(_) => ErrorCode::UnixFileStatErr,
        }
    }
}

//! Error types for the catalog.

use eddy_types::{ErrorCode, ReplicaNumber};

/// Errors returned by [`Catalog`](crate::Catalog) operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Fjall database error.
    #[error("fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    /// I/O error (e.g. from Fjall guard operations).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] postcard::Error),

    /// No data object is registered under the path.
    #[error("data object not found: {path}")]
    NotFound { path: String },

    /// A data object is already registered under the path.
    #[error("data object already exists: {path}")]
    AlreadyExists { path: String },

    /// The data object has no replica with this number.
    #[error("replica {replica} of {path} does not exist")]
    ReplicaNotFound {
        path: String,
        replica: ReplicaNumber,
    },

    /// A compare-and-swap precondition no longer holds.
    #[error("write conflict on replica {replica} of {path}: {reason}")]
    WriteConflict {
        path: String,
        replica: ReplicaNumber,
        reason: String,
    },

    /// The updating user owns neither the replica nor the data object.
    #[error("user {user} may not update {path}")]
    PermissionDenied { user: String, path: String },

    /// The record produced by an update breaks a structural invariant.
    #[error("rejected update of {path}: {reason}")]
    Invariant { path: String, reason: String },
}

impl CatalogError {
    /// Protocol-visible error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Fjall(_) | Self::Io(_) | Self::Serde(_) => ErrorCode::CatSqlErr,
            Self::NotFound { .. } => ErrorCode::ObjPathDoesNotExist,
            Self::AlreadyExists { .. } => ErrorCode::CatNameExistsAsDataobj,
            Self::ReplicaNotFound { .. } => ErrorCode::SysReplicaDoesNotExist,
            Self::WriteConflict { .. } => ErrorCode::SysCatalogWriteConflict,
            Self::PermissionDenied { .. } => ErrorCode::CatNoAccessPermission,
            Self::Invariant { .. } => ErrorCode::SysInternalErr,
        }
    }
}

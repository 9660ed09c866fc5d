//! Error types for checksum operations.

use eddy_types::{ErrorCode, ReplicaNumber};

/// Errors that can occur while computing or verifying checksums.
#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    /// Failed to access the catalog.
    #[error("catalog error: {0}")]
    Catalog(#[from] eddy_catalog::CatalogError),

    /// Failed to access a physical replica.
    #[error("storage error: {0}")]
    Storage(#[from] eddy_storage::StorageError),

    /// The request combines flags that cannot be used together.
    #[error("incompatible parameters: {reason}")]
    IncompatibleParams { reason: String },

    /// An administrative override was requested by an unprivileged user.
    #[error("user {user} is not privileged")]
    InsufficientPrivilege { user: String },

    /// The user may not read the data object.
    #[error("user {user} has no access to {path}")]
    NoAccess { user: String, path: String },

    /// The explicitly named replica does not exist.
    #[error("no replica of {path} matches {target}")]
    ReplicaNotFound { path: String, target: String },

    /// Default targeting found no good replica.
    #[error("no good replica of {path}")]
    NoGoodReplica { path: String },

    /// The replica is open for write.
    #[error("replica {replica} of {path} is intermediate")]
    Intermediate { path: String, replica: ReplicaNumber },

    /// The replica is locked by an open of a sibling.
    #[error("replica {replica} of {path} is locked")]
    Locked { path: String, replica: ReplicaNumber },

    /// Bundle replicas are never checksummed.
    #[error("replica {replica} of {path} lives on a bundle resource")]
    BundleResource { path: String, replica: ReplicaNumber },

    /// The physical size disagrees with the catalog.
    #[error(
        "size mismatch on replica {replica} of {path}: catalog {catalog}, physical {physical}"
    )]
    SizeMismatch {
        path: String,
        replica: ReplicaNumber,
        /// Size recorded in the catalog.
        catalog: i64,
        /// Size reported by the storage driver.
        physical: i64,
    },
}

impl ChecksumError {
    /// Protocol-visible error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Catalog(e) => e.code(),
            Self::Storage(e) => e.code(),
            Self::IncompatibleParams { .. } => ErrorCode::UserIncompatibleParams,
            Self::InsufficientPrivilege { .. } => ErrorCode::CatInsufficientPrivilegeLevel,
            Self::NoAccess { .. } => ErrorCode::CatNoAccessPermission,
            Self::ReplicaNotFound { .. } => ErrorCode::SysReplicaDoesNotExist,
            Self::NoGoodReplica { .. } => ErrorCode::SysNoGoodReplica,
            Self::Intermediate { .. } => ErrorCode::IntermediateReplicaAccess,
            Self::Locked { .. } => ErrorCode::LockedDataObjectAccess,
            Self::BundleResource { .. } => ErrorCode::SysNotAllowed,
            Self::SizeMismatch { .. } => ErrorCode::UserFileSizeMismatch,
        }
    }
}

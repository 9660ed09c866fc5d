//! Error types for the engine.

use eddy_types::{ErrorCode, ReplicaNumber, ReplicaStatus};

use crate::handle::HandleId;

/// Errors that can occur during engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Failed to access the catalog.
    #[error("catalog error: {0}")]
    Catalog(#[from] eddy_catalog::CatalogError),

    /// Failed to access a physical replica.
    #[error("storage error: {0}")]
    Storage(#[from] eddy_storage::StorageError),

    /// Checksum lookup or verification failed.
    #[error("checksum error: {0}")]
    Checksum(#[from] eddy_checksum::ChecksumError),

    /// The request combines options that cannot be used together.
    #[error("incompatible parameters: {reason}")]
    IncompatibleParams { reason: String },

    /// An administrative override was requested by an unprivileged user.
    #[error("user {user} is not privileged")]
    InsufficientPrivilege { user: String },

    /// The access-control collaborator refused the operation.
    #[error("user {user} has no access to {path}")]
    NoAccess { user: String, path: String },

    /// The explicitly named replica does not exist.
    #[error("no replica of {path} matches {target}")]
    ReplicaNotFound { path: String, target: String },

    /// No replica is in a state that can serve the request.
    #[error("no good replica of {path}")]
    NoGoodReplica { path: String },

    /// The replication source is not a good replica.
    #[error("replica {replica} of {path} is {status} and cannot be a source")]
    SourceInaccessible {
        path: String,
        replica: ReplicaNumber,
        status: ReplicaStatus,
    },

    /// The replica is open for write by another connection.
    #[error("replica {replica} of {path} is intermediate")]
    Intermediate { path: String, replica: ReplicaNumber },

    /// The data object is locked by an open for write.
    #[error("data object {path} is locked")]
    Locked { path: String },

    /// The operation is not permitted on this replica or resource.
    #[error("not allowed: {reason}")]
    NotAllowed { reason: String },

    /// The named resource is not part of the topology.
    #[error("resource does not exist: {resource}")]
    ResourceNotFound { resource: String },

    /// The replica carries no checksum to verify against.
    #[error("replica {replica} of {path} has no checksum")]
    NoChecksum { path: String, replica: ReplicaNumber },

    /// The digest of the written content differs from the expected one.
    #[error("checksum mismatch on replica {replica} of {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        replica: ReplicaNumber,
        expected: String,
        actual: String,
    },

    /// A replication copied a different number of bytes than the source holds.
    #[error("copied {copied} bytes of {path} but the source holds {expected}")]
    CopyLength {
        path: String,
        expected: i64,
        copied: i64,
    },

    /// No open handle with this id exists in the session.
    #[error("no open handle {handle}")]
    BadHandle { handle: HandleId },

    /// The handle was opened for read.
    #[error("handle {handle} is not open for write")]
    NotWritable { handle: HandleId },

    /// The lock a handle was opened under is gone.
    #[error("lock on replica {replica} of {path} is no longer held")]
    LockLost { path: String, replica: ReplicaNumber },

    /// A status change outside the transition table was attempted.
    #[error("illegal transition from {from} on {event}")]
    IllegalTransition { from: ReplicaStatus, event: String },

    /// A request could not be decoded.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
}

impl EngineError {
    /// Protocol-visible error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Catalog(e) => e.code(),
            Self::Storage(e) => e.code(),
            Self::Checksum(e) => e.code(),
            Self::IncompatibleParams { .. } => ErrorCode::UserIncompatibleParams,
            Self::InsufficientPrivilege { .. } => ErrorCode::CatInsufficientPrivilegeLevel,
            Self::NoAccess { .. } => ErrorCode::CatNoAccessPermission,
            Self::ReplicaNotFound { .. } => ErrorCode::SysReplicaDoesNotExist,
            Self::NoGoodReplica { .. } => ErrorCode::SysNoGoodReplica,
            Self::SourceInaccessible { .. } => ErrorCode::SysReplicaInaccessible,
            Self::Intermediate { .. } => ErrorCode::IntermediateReplicaAccess,
            Self::Locked { .. } => ErrorCode::LockedDataObjectAccess,
            Self::NotAllowed { .. } => ErrorCode::SysNotAllowed,
            Self::ResourceNotFound { .. } => ErrorCode::SysRescDoesNotExist,
            Self::NoChecksum { .. } => ErrorCode::CatNoChecksumForReplica,
            Self::ChecksumMismatch { .. } => ErrorCode::UserChksumMismatch,
            Self::CopyLength { .. } => ErrorCode::SysCopyLenErr,
            Self::BadHandle { .. } | Self::NotWritable { .. } => ErrorCode::BadInputDescIndex,
            Self::LockLost { .. } => ErrorCode::SysCatalogWriteConflict,
            Self::IllegalTransition { .. } => ErrorCode::SysInternalErr,
            Self::InvalidRequest { .. } => ErrorCode::SysInvalidInputParam,
        }
    }
}

//! Shared types and identifiers for Eddy.
//!
//! This crate defines the core types used across the Eddy workspace:
//! identifiers ([`DataId`], [`ReplicaNumber`], [`SessionId`], [`ReplicaToken`]),
//! catalog records ([`DataObject`], [`Replica`], [`ObjectLock`]),
//! the replica status codes ([`ReplicaStatus`]), checksum schemes
//! ([`ChecksumScheme`]), verification findings ([`VerificationResult`]),
//! the stable error-code vocabulary ([`ErrorCode`]), and configuration
//! ([`EngineConfig`], [`ResourceSpec`]).

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name($inner);

        impl $name {
            /// Wrap a raw value.
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Return the raw value.
            pub const fn get(self) -> $inner {
                self.0
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_id!(
    /// Catalog identifier of a data object, allocated from a monotonic sequence.
    DataId(u64)
);

define_id!(
    /// Per-object replica number. Never reused within one data object.
    ReplicaNumber(u32)
);

define_id!(
    /// Identifier of one agent connection.
    SessionId(u64)
);

impl SessionId {
    /// Draw a fresh random session id.
    pub fn random() -> Self {
        Self(rand::random())
    }
}

/// Opaque capability naming one write lock.
///
/// Handed out by a write open; presenting it on a later open joins the
/// existing lock instead of being rejected.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicaToken(String);

impl ReplicaToken {
    /// Generate a new random token (128 bits, hex encoded).
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Borrow the token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ReplicaToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ReplicaToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ReplicaToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ReplicaToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReplicaToken({})", self.0)
    }
}

/// Path from the root of a composite resource tree down to a storage leaf.
///
/// Rendered as `root;child;leaf`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHierarchy(Vec<String>);

impl ResourceHierarchy {
    pub const SEPARATOR: char = ';';

    /// Parse a `;`-separated hierarchy string. Empty components are rejected.
    pub fn parse(text: &str) -> Option<Self> {
        let parts: Vec<String> = text.split(Self::SEPARATOR).map(str::to_string).collect();
        Self::from_components(parts)
    }

    /// Build a hierarchy from its components, root first.
    pub fn from_components(parts: Vec<String>) -> Option<Self> {
        if parts.is_empty() || parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        Some(Self(parts))
    }

    /// A single-level hierarchy made of one leaf.
    pub fn leaf_only(name: &str) -> Self {
        Self(vec![name.to_string()])
    }

    pub fn root(&self) -> &str {
        &self.0[0]
    }

    pub fn leaf(&self) -> &str {
        &self.0[self.0.len() - 1]
    }

    pub fn components(&self) -> &[String] {
        &self.0
    }

    /// Whether `name` appears anywhere in the hierarchy.
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|c| c == name)
    }
}

impl fmt::Display for ResourceHierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", Self::SEPARATOR)?;
            }
            f.write_str(part)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Replica status
// ---------------------------------------------------------------------------

/// Status of one replica. Wire codes follow the catalog column values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaStatus {
    /// Content is not known to be current.
    Stale,
    /// Content is current and complete.
    Good,
    /// Opened for write; content is in flux.
    Intermediate,
    /// Advisory read lock. Nothing in this workspace produces it.
    ReadLocked,
    /// A sibling is intermediate; this replica cannot be opened.
    WriteLocked,
}

impl ReplicaStatus {
    /// Numeric code stored in the catalog.
    pub const fn code(self) -> u8 {
        match self {
            Self::Stale => 0,
            Self::Good => 1,
            Self::Intermediate => 2,
            Self::ReadLocked => 3,
            Self::WriteLocked => 4,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Stale),
            1 => Some(Self::Good),
            2 => Some(Self::Intermediate),
            3 => Some(Self::ReadLocked),
            4 => Some(Self::WriteLocked),
            _ => None,
        }
    }

    /// Stale or good: the states a lock can restore a replica to.
    pub const fn at_rest(self) -> bool {
        matches!(self, Self::Stale | Self::Good)
    }

    pub const fn is_locked(self) -> bool {
        matches!(self, Self::ReadLocked | Self::WriteLocked)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stale => "stale",
            Self::Good => "good",
            Self::Intermediate => "intermediate",
            Self::ReadLocked => "read_locked",
            Self::WriteLocked => "write_locked",
        }
    }
}

impl fmt::Display for ReplicaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Catalog records
// ---------------------------------------------------------------------------

/// One physical copy of a data object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    pub data_id: DataId,
    pub replica_number: ReplicaNumber,
    pub resource_hierarchy: ResourceHierarchy,
    /// Path of the replica inside its leaf resource.
    pub physical_path: String,
    /// Size in bytes, `-1` while unknown (between create and close).
    pub size: i64,
    /// Registered checksum, empty when absent.
    pub checksum: String,
    pub status: ReplicaStatus,
    pub owner: String,
    /// Unix seconds.
    pub create_time: u64,
    /// Unix seconds. Only moves when content changes.
    pub modify_time: u64,
    pub version: String,
    /// Content generation, bumped each time new bytes are recorded.
    pub generation: u64,
}

impl Replica {
    /// Mark the bytes behind this replica as changed.
    pub fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn has_checksum(&self) -> bool {
        !self.checksum.is_empty()
    }

    pub fn leaf(&self) -> &str {
        self.resource_hierarchy.leaf()
    }
}

/// Lock record attached to a data object while one of its replicas is open
/// for write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectLock {
    /// The intermediate replica.
    pub target: ReplicaNumber,
    /// Token joiners must present.
    pub token: ReplicaToken,
    /// Sessions holding a handle on the target. The last one out finalizes.
    pub holders: Vec<SessionId>,
    /// The target was created by the opening request.
    pub created: bool,
    /// Some holder wrote bytes.
    pub content_written: bool,
    /// Some holder closed with an error.
    pub failed: bool,
    /// Status of every replica (target included) before the lock was taken.
    pub original_statuses: BTreeMap<ReplicaNumber, ReplicaStatus>,
}

impl ObjectLock {
    /// Status a replica had before locking, if it existed then.
    pub fn original_status(&self, number: ReplicaNumber) -> Option<ReplicaStatus> {
        self.original_statuses.get(&number).copied()
    }
}

/// A logical data object and all of its replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataObject {
    pub data_id: DataId,
    pub logical_path: String,
    pub owner: String,
    /// Next replica number to hand out. Only grows.
    pub next_replica_number: ReplicaNumber,
    /// Replicas ordered by replica number.
    pub replicas: Vec<Replica>,
    pub lock: Option<ObjectLock>,
    pub create_time: u64,
}

impl DataObject {
    /// A fresh object with no replicas yet.
    pub fn new(data_id: DataId, logical_path: &str, owner: &str) -> Self {
        Self {
            data_id,
            logical_path: logical_path.to_string(),
            owner: owner.to_string(),
            next_replica_number: ReplicaNumber::new(0),
            replicas: Vec::new(),
            lock: None,
            create_time: now_secs(),
        }
    }

    pub fn replica(&self, number: ReplicaNumber) -> Option<&Replica> {
        self.replicas.iter().find(|r| r.replica_number == number)
    }

    pub fn replica_mut(&mut self, number: ReplicaNumber) -> Option<&mut Replica> {
        self.replicas.iter_mut().find(|r| r.replica_number == number)
    }

    /// The replica whose hierarchy ends at (or passes through) `resource`.
    pub fn replica_on_resource(&self, resource: &str) -> Option<&Replica> {
        self.replicas
            .iter()
            .find(|r| r.resource_hierarchy.leaf() == resource)
            .or_else(|| {
                self.replicas
                    .iter()
                    .find(|r| r.resource_hierarchy.contains(resource))
            })
    }

    /// First replica (by number) with the given status.
    pub fn first_with_status(&self, status: ReplicaStatus) -> Option<&Replica> {
        self.replicas.iter().find(|r| r.status == status)
    }

    pub fn has_good_replica(&self) -> bool {
        self.first_with_status(ReplicaStatus::Good).is_some()
    }

    /// Whether some replica is intermediate or write locked.
    pub fn is_write_locked(&self) -> bool {
        self.replicas.iter().any(|r| {
            matches!(
                r.status,
                ReplicaStatus::Intermediate | ReplicaStatus::WriteLocked
            )
        })
    }

    /// Hand out the next replica number.
    pub fn allocate_replica_number(&mut self) -> ReplicaNumber {
        let number = self.next_replica_number;
        self.next_replica_number = ReplicaNumber::new(number.get() + 1);
        number
    }

    /// Check the structural invariants of the record.
    ///
    /// Replica numbers are unique and below `next_replica_number`; at most
    /// one replica is intermediate, and when one is, every sibling is write
    /// locked and the lock record names it. A lock record never outlives its
    /// intermediate replica.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut seen = std::collections::BTreeSet::new();
        for replica in &self.replicas {
            if replica.data_id != self.data_id {
                return Err(format!(
                    "replica {} carries data id {} instead of {}",
                    replica.replica_number, replica.data_id, self.data_id
                ));
            }
            if !seen.insert(replica.replica_number) {
                return Err(format!("duplicate replica number {}", replica.replica_number));
            }
            if replica.replica_number >= self.next_replica_number {
                return Err(format!(
                    "replica number {} not below next replica number {}",
                    replica.replica_number, self.next_replica_number
                ));
            }
        }

        let intermediates: Vec<&Replica> = self
            .replicas
            .iter()
            .filter(|r| r.status == ReplicaStatus::Intermediate)
            .collect();
        if intermediates.len() > 1 {
            return Err(format!(
                "{} intermediate replicas on {}",
                intermediates.len(),
                self.logical_path
            ));
        }

        match (intermediates.first(), &self.lock) {
            (Some(target), Some(lock)) => {
                if lock.target != target.replica_number {
                    return Err(format!(
                        "lock names replica {} but replica {} is intermediate",
                        lock.target, target.replica_number
                    ));
                }
                if lock.holders.is_empty() {
                    return Err("lock record without holders".to_string());
                }
                if let Some(sibling) = self.replicas.iter().find(|r| {
                    r.replica_number != target.replica_number
                        && r.status != ReplicaStatus::WriteLocked
                }) {
                    return Err(format!(
                        "replica {} is {} while replica {} is intermediate",
                        sibling.replica_number, sibling.status, target.replica_number
                    ));
                }
            }
            (Some(target), None) => {
                return Err(format!(
                    "replica {} is intermediate without a lock record",
                    target.replica_number
                ));
            }
            (None, Some(lock)) => {
                return Err(format!(
                    "lock record names replica {} which is not intermediate",
                    lock.target
                ));
            }
            (None, None) => {
                if let Some(locked) = self
                    .replicas
                    .iter()
                    .find(|r| r.status == ReplicaStatus::WriteLocked)
                {
                    return Err(format!(
                        "replica {} is write locked with no intermediate sibling",
                        locked.replica_number
                    ));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Checksums
// ---------------------------------------------------------------------------

/// Digest algorithm used when computing replica checksums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumScheme {
    /// SHA-256, base64 encoded, `sha2:` prefix.
    #[default]
    #[serde(rename = "sha2")]
    Sha256,
    /// BLAKE3, hex encoded, `blake3:` prefix.
    Blake3,
}

impl ChecksumScheme {
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Sha256 => "sha2:",
            Self::Blake3 => "blake3:",
        }
    }

    /// Scheme a registered checksum string was produced with.
    pub fn of_checksum(checksum: &str) -> Option<Self> {
        [Self::Sha256, Self::Blake3]
            .into_iter()
            .find(|s| checksum.starts_with(s.prefix()))
    }

    pub fn hasher(self) -> ChecksumHasher {
        match self {
            Self::Sha256 => ChecksumHasher::Sha256(Sha256::new()),
            Self::Blake3 => ChecksumHasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    /// Digest a whole buffer.
    pub fn digest(self, data: &[u8]) -> String {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }
}

impl fmt::Display for ChecksumScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix().trim_end_matches(':'))
    }
}

/// Incremental digest state for one [`ChecksumScheme`].
pub enum ChecksumHasher {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl ChecksumHasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Finish and render the checksum in its registered form.
    pub fn finalize(self) -> String {
        match self {
            Self::Sha256(h) => format!("sha2:{}", BASE64.encode(h.finalize())),
            Self::Blake3(h) => format!("blake3:{}", h.finalize().to_hex()),
        }
    }
}

// ---------------------------------------------------------------------------
// Verification results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One observation made while verifying replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub code: ErrorCode,
    pub message: String,
    /// The replica the finding concerns, if any.
    pub replica: Option<ReplicaNumber>,
}

/// Ordered findings of a verification run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub findings: Vec<Finding>,
}

impl VerificationResult {
    pub fn push(
        &mut self,
        severity: Severity,
        code: ErrorCode,
        replica: Option<ReplicaNumber>,
        message: impl Into<String>,
    ) {
        self.findings.push(Finding {
            severity,
            code,
            message: message.into(),
            replica,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// Whether any finding is a warning or an error.
    pub fn has_problems(&self) -> bool {
        self.findings.iter().any(|f| f.severity >= Severity::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Error)
    }
}

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Stable, protocol-visible error names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ObjPathDoesNotExist,
    SysReplicaDoesNotExist,
    SysNoGoodReplica,
    SysReplicaInaccessible,
    IntermediateReplicaAccess,
    LockedDataObjectAccess,
    CatNoAccessPermission,
    CatInsufficientPrivilegeLevel,
    CatNoChecksumForReplica,
    CatNameExistsAsDataobj,
    SysNotAllowed,
    SysRescDoesNotExist,
    SysRescIsDown,
    UserIncompatibleParams,
    UserFileSizeMismatch,
    UserChksumMismatch,
    SysReplicaChecksumsDiffer,
    SysCatalogWriteConflict,
    SysCopyLenErr,
    CheckVerificationResults,
    BadInputDescIndex,
    SysInvalidInputParam,
    UnixFileOpenErr,
    UnixFileReadErr,
    UnixFileWriteErr,
    UnixFileStatErr,
    CatSqlErr,
    SysInternalErr,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ObjPathDoesNotExist => "OBJ_PATH_DOES_NOT_EXIST",
            Self::SysReplicaDoesNotExist => "SYS_REPLICA_DOES_NOT_EXIST",
            Self::SysNoGoodReplica => "SYS_NO_GOOD_REPLICA",
            Self::SysReplicaInaccessible => "SYS_REPLICA_INACCESSIBLE",
            Self::IntermediateReplicaAccess => "INTERMEDIATE_REPLICA_ACCESS",
            Self::LockedDataObjectAccess => "LOCKED_DATA_OBJECT_ACCESS",
            Self::CatNoAccessPermission => "CAT_NO_ACCESS_PERMISSION",
            Self::CatInsufficientPrivilegeLevel => "CAT_INSUFFICIENT_PRIVILEGE_LEVEL",
            Self::CatNoChecksumForReplica => "CAT_NO_CHECKSUM_FOR_REPLICA",
            Self::CatNameExistsAsDataobj => "CAT_NAME_EXISTS_AS_DATAOBJ",
            Self::SysNotAllowed => "SYS_NOT_ALLOWED",
            Self::SysRescDoesNotExist => "SYS_RESC_DOES_NOT_EXIST",
            Self::SysRescIsDown => "SYS_RESC_IS_DOWN",
            Self::UserIncompatibleParams => "USER_INCOMPATIBLE_PARAMS",
            Self::UserFileSizeMismatch => "USER_FILE_SIZE_MISMATCH",
            Self::UserChksumMismatch => "USER_CHKSUM_MISMATCH",
            Self::SysReplicaChecksumsDiffer => "SYS_REPLICA_CHECKSUMS_DIFFER",
            Self::SysCatalogWriteConflict => "SYS_CATALOG_WRITE_CONFLICT",
            Self::SysCopyLenErr => "SYS_COPY_LEN_ERR",
            Self::CheckVerificationResults => "CHECK_VERIFICATION_RESULTS",
            Self::BadInputDescIndex => "BAD_INPUT_DESC_INDEX",
            Self::SysInvalidInputParam => "SYS_INVALID_INPUT_PARAM",
            Self::UnixFileOpenErr => "UNIX_FILE_OPEN_ERR",
            Self::UnixFileReadErr => "UNIX_FILE_READ_ERR",
            Self::UnixFileWriteErr => "UNIX_FILE_WRITE_ERR",
            Self::UnixFileStatErr => "UNIX_FILE_STAT_ERR",
            Self::CatSqlErr => "CAT_SQL_ERR",
            Self::SysInternalErr => "SYS_INTERNAL_ERR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Principals and configuration
// ---------------------------------------------------------------------------

/// The authenticated user behind a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub user: String,
}

impl Principal {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }
}

/// Kind of a leaf resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    /// Ordinary storage; replicas may be created, written and checksummed.
    #[default]
    Storage,
    /// Archive/bundle storage; never created on or checksummed.
    Bundle,
}

/// Declaration of one resource in the topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub name: String,
    /// Parent resource for composite trees; `None` for a root.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub class: ResourceClass,
}

impl ResourceSpec {
    pub fn storage(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            class: ResourceClass::Storage,
        }
    }

    pub fn bundle(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            class: ResourceClass::Bundle,
        }
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }
}

/// Engine-wide knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Leaf resource new replicas land on when no resource is named.
    pub default_resource: String,
    /// Scheme used for freshly computed checksums.
    pub checksum_scheme: ChecksumScheme,
    /// Reject replications whose copied length differs from the source size.
    pub verify_copy_length: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_resource: "demoResc".to_string(),
            checksum_scheme: ChecksumScheme::Sha256,
            verify_copy_length: true,
        }
    }
}

/// Current Unix time in seconds.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

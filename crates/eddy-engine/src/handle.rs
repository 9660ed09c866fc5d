//! Connection-scoped open handles.

use std::fmt;

use eddy_types::{DataId, ReplicaNumber, ReplicaToken, ResourceHierarchy};
use serde::{Deserialize, Serialize};

/// Index of an open handle within its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(u32);

impl HandleId {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an open handle may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenMode {
    Read,
    /// Write to an existing replica.
    Write,
    /// Write to a replica created by this open.
    Create,
}

impl OpenMode {
    pub fn is_write(self) -> bool {
        !matches!(self, Self::Read)
    }
}

/// One open replica.
#[derive(Debug, Clone)]
pub struct OpenHandle {
    pub path: String,
    pub data_id: DataId,
    pub replica: ReplicaNumber,
    pub hierarchy: ResourceHierarchy,
    pub physical_path: String,
    pub mode: OpenMode,
    /// Lock token, present for write handles.
    pub token: Option<ReplicaToken>,
    /// This open joined a lock taken by an earlier open.
    pub joined: bool,
    pub bytes_written: u64,
    /// Next write position.
    pub offset: u64,
    /// The catalog checksum has been erased for this handle's writes.
    pub checksum_erased: bool,
}

impl OpenHandle {
    /// The replica was created by this open.
    pub fn created(&self) -> bool {
        self.mode == OpenMode::Create
    }
}

//! Checksum request flags and their validation.

use eddy_types::ReplicaNumber;
use serde::{Deserialize, Serialize};

use crate::error::ChecksumError;

/// A checksum request as received from a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksumRequest {
    pub path: String,
    /// Recompute and re-register even when a checksum exists.
    pub force: bool,
    /// Verify instead of registering.
    pub verify: bool,
    /// Operate on every good replica.
    pub all: bool,
    /// With `verify`: only compare catalog facts, never read replica bytes.
    pub no_compute: bool,
    pub replica_number: Option<ReplicaNumber>,
    pub resource: Option<String>,
    /// Administrative override of the ownership check.
    pub admin: bool,
}

impl ChecksumRequest {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Self::default()
        }
    }

    /// Validate the flag combination and derive what to do.
    ///
    /// Runs before any catalog access.
    pub fn plan(&self) -> Result<ChecksumPlan, ChecksumError> {
        let reject = |reason: &str| {
            Err(ChecksumError::IncompatibleParams {
                reason: reason.to_string(),
            })
        };
        if self.verify && self.force {
            return reject("verification cannot be forced");
        }
        if self.replica_number.is_some() && self.resource.is_some() {
            return reject("replica number and resource name are mutually exclusive");
        }
        if self.all && self.replica_number.is_some() {
            return reject("all replicas and a replica number are mutually exclusive");
        }
        if self.all && self.resource.is_some() {
            return reject("all replicas and a resource name are mutually exclusive");
        }
        if self.no_compute && !self.verify {
            return reject("no-compute requires verification");
        }
        if self.no_compute && self.force {
            return reject("no-compute cannot be forced");
        }

        let mode = if self.verify {
            ChecksumMode::Verify {
                no_compute: self.no_compute,
            }
        } else {
            ChecksumMode::LookupOrUpdate { force: self.force }
        };
        let target = if self.all {
            Target::All
        } else if let Some(n) = self.replica_number {
            Target::Number(n)
        } else if let Some(name) = &self.resource {
            Target::Resource(name.clone())
        } else {
            Target::FirstGood
        };
        Ok(ChecksumPlan {
            mode,
            target,
            admin: self.admin,
        })
    }
}

/// Validated form of a [`ChecksumRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumPlan {
    pub mode: ChecksumMode,
    pub target: Target,
    pub admin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumMode {
    LookupOrUpdate { force: bool },
    Verify { no_compute: bool },
}

/// Which replicas a request operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every good, non-bundle replica.
    All,
    Number(ReplicaNumber),
    Resource(String),
    /// The first good replica by number.
    FirstGood,
}

impl Target {
    /// Whether the replica was named explicitly by the caller.
    pub fn is_explicit(&self) -> bool {
        matches!(self, Self::Number(_) | Self::Resource(_))
    }
}

//! Checksum engine: target resolution and lookup-or-update.

use std::collections::BTreeSet;
use std::sync::Arc;

use eddy_catalog::{AccessControl, Catalog, Permission, ReplicaUpdate, UpdateAuth};
use eddy_storage::{PhysicalStorage, ResourceTopology};
use eddy_types::{
    ChecksumScheme, DataObject, ErrorCode, Principal, Replica, ReplicaNumber, ReplicaStatus,
    Severity, VerificationResult,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ChecksumError;
use crate::request::{ChecksumMode, ChecksumPlan, ChecksumRequest, Target};

/// Outcome of a checksum request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumResponse {
    /// The (registered) checksum, with informational notes such as skipped
    /// replicas or a sibling-difference warning.
    Checksum {
        checksum: String,
        notes: VerificationResult,
    },
    /// Verification found warnings or errors.
    Findings(VerificationResult),
}

impl ChecksumResponse {
    /// Error code the agent reports alongside the response, if any.
    pub fn status_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Checksum { .. } => None,
            Self::Findings(_) => Some(ErrorCode::CheckVerificationResults),
        }
    }

    pub fn checksum(&self) -> Option<&str> {
        match self {
            Self::Checksum { checksum, .. } => Some(checksum),
            Self::Findings(_) => None,
        }
    }
}

/// Computes, registers and verifies replica checksums.
pub struct ChecksumEngine {
    catalog: Arc<Catalog>,
    storage: Arc<dyn PhysicalStorage>,
    topology: Arc<dyn ResourceTopology>,
    access: Arc<dyn AccessControl>,
    scheme: ChecksumScheme,
}

impl ChecksumEngine {
    pub fn new(
        catalog: Arc<Catalog>,
        storage: Arc<dyn PhysicalStorage>,
        topology: Arc<dyn ResourceTopology>,
        access: Arc<dyn AccessControl>,
        scheme: ChecksumScheme,
    ) -> Self {
        Self {
            catalog,
            storage,
            topology,
            access,
            scheme,
        }
    }

    /// Scheme used for freshly computed checksums.
    pub fn scheme(&self) -> ChecksumScheme {
        self.scheme
    }

    /// Digest the first `byte_count` bytes of a replica with the configured scheme.
    pub async fn digest(&self, replica: &Replica, byte_count: i64) -> Result<String, ChecksumError> {
        self.digest_with(replica, byte_count, self.scheme).await
    }

    pub(crate) async fn digest_with(
        &self,
        replica: &Replica,
        byte_count: i64,
        scheme: ChecksumScheme,
    ) -> Result<String, ChecksumError> {
        let digest = self
            .storage
            .compute_digest(
                &replica.resource_hierarchy,
                &replica.physical_path,
                byte_count,
                scheme,
            )
            .await?;
        Ok(digest)
    }

    pub(crate) async fn physical_size(&self, replica: &Replica) -> Result<i64, ChecksumError> {
        Ok(self
            .storage
            .stat(&replica.resource_hierarchy, &replica.physical_path)
            .await?)
    }

    /// Handle a checksum request for `principal`.
    pub async fn checksum(
        &self,
        principal: &Principal,
        request: &ChecksumRequest,
    ) -> Result<ChecksumResponse, ChecksumError> {
        let plan = request.plan()?;
        if plan.admin && !self.access.is_privileged(&principal.user) {
            return Err(ChecksumError::InsufficientPrivilege {
                user: principal.user.clone(),
            });
        }

        let object = self
            .catalog
            .get(&request.path)?
            .ok_or_else(|| eddy_catalog::CatalogError::NotFound {
                path: request.path.clone(),
            })?;
        if !plan.admin && !self.access.permits(&principal.user, &object, Permission::Read) {
            return Err(ChecksumError::NoAccess {
                user: principal.user.clone(),
                path: request.path.clone(),
            });
        }

        let mut notes = VerificationResult::default();
        let targets = self.resolve_targets(&object, &plan.target, &mut notes)?;
        debug!(
            path = %request.path,
            targets = targets.len(),
            mode = ?plan.mode,
            "resolved checksum targets"
        );

        match plan.mode {
            ChecksumMode::LookupOrUpdate { force } => {
                let auth = if plan.admin {
                    UpdateAuth::admin(&principal.user)
                } else {
                    UpdateAuth::user(&principal.user)
                };
                self.lookup_or_update_all(&request.path, &targets, force, &auth, &plan, notes)
                    .await
            }
            ChecksumMode::Verify { no_compute } => {
                Ok(self
                    .verify_all(&request.path, &targets, no_compute, &plan, notes)
                    .await)
            }
        }
    }

    /// Pick the replicas a plan operates on.
    ///
    /// Replicas skipped by an `All` sweep are reported as informational notes.
    fn resolve_targets(
        &self,
        object: &DataObject,
        target: &Target,
        notes: &mut VerificationResult,
    ) -> Result<Vec<Replica>, ChecksumError> {
        let path = &object.logical_path;
        match target {
            Target::All => {
                let mut eligible = Vec::new();
                for replica in &object.replicas {
                    if self.topology.is_bundle(&replica.resource_hierarchy) {
                        notes.push(
                            Severity::Info,
                            ErrorCode::SysNotAllowed,
                            Some(replica.replica_number),
                            format!(
                                "skipping replica {} on bundle resource {}",
                                replica.replica_number,
                                replica.leaf()
                            ),
                        );
                    } else if replica.status != ReplicaStatus::Good {
                        notes.push(
                            Severity::Info,
                            ErrorCode::SysNotAllowed,
                            Some(replica.replica_number),
                            format!(
                                "skipping {} replica {}",
                                replica.status, replica.replica_number
                            ),
                        );
                    } else {
                        eligible.push(replica.clone());
                    }
                }
                if eligible.is_empty() {
                    return Err(ChecksumError::NoGoodReplica { path: path.clone() });
                }
                Ok(eligible)
            }
            Target::Number(number) => {
                let replica =
                    object
                        .replica(*number)
                        .ok_or_else(|| ChecksumError::ReplicaNotFound {
                            path: path.clone(),
                            target: format!("replica number {number}"),
                        })?;
                self.check_explicit(path, replica)?;
                Ok(vec![replica.clone()])
            }
            Target::Resource(name) => {
                let replica = object.replica_on_resource(name).ok_or_else(|| {
                    ChecksumError::ReplicaNotFound {
                        path: path.clone(),
                        target: format!("resource {name}"),
                    }
                })?;
                self.check_explicit(path, replica)?;
                Ok(vec![replica.clone()])
            }
            Target::FirstGood => {
                let replica = object
                    .first_with_status(ReplicaStatus::Good)
                    .ok_or_else(|| ChecksumError::NoGoodReplica { path: path.clone() })?;
                if self.topology.is_bundle(&replica.resource_hierarchy) {
                    return Err(ChecksumError::BundleResource {
                        path: path.clone(),
                        replica: replica.replica_number,
                    });
                }
                Ok(vec![replica.clone()])
            }
        }
    }

    /// Explicitly named replicas may be good or stale, and never bundle.
    fn check_explicit(&self, path: &str, replica: &Replica) -> Result<(), ChecksumError> {
        let number = replica.replica_number;
        match replica.status {
            ReplicaStatus::Intermediate => {
                return Err(ChecksumError::Intermediate {
                    path: path.to_string(),
                    replica: number,
                });
            }
            ReplicaStatus::WriteLocked | ReplicaStatus::ReadLocked => {
                return Err(ChecksumError::Locked {
                    path: path.to_string(),
                    replica: number,
                });
            }
            ReplicaStatus::Good | ReplicaStatus::Stale => {}
        }
        if self.topology.is_bundle(&replica.resource_hierarchy) {
            return Err(ChecksumError::BundleResource {
                path: path.to_string(),
                replica: number,
            });
        }
        Ok(())
    }

    async fn lookup_or_update_all(
        &self,
        path: &str,
        targets: &[Replica],
        force: bool,
        auth: &UpdateAuth,
        plan: &ChecksumPlan,
        mut notes: VerificationResult,
    ) -> Result<ChecksumResponse, ChecksumError> {
        let mut first_error = None;
        let mut results: Vec<(ReplicaNumber, String)> = Vec::new();

        for replica in targets {
            match self.lookup_or_update(path, replica, force, auth).await {
                Ok(checksum) => results.push((replica.replica_number, checksum)),
                Err(e) => {
                    warn!(path, replica = %replica.replica_number, error = %e, "checksum failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        if plan.target == Target::All {
            note_sibling_differences(&results, &mut notes);
        }
        let checksum = results
            .into_iter()
            .next()
            .map(|(_, c)| c)
            .unwrap_or_default();
        Ok(ChecksumResponse::Checksum { checksum, notes })
    }

    /// Return the registered checksum, computing and registering it first
    /// when absent or when forced.
    async fn lookup_or_update(
        &self,
        path: &str,
        replica: &Replica,
        force: bool,
        auth: &UpdateAuth,
    ) -> Result<String, ChecksumError> {
        let number = replica.replica_number;
        if !force && replica.has_checksum() {
            debug!(path, replica = %number, "checksum already registered");
            return Ok(replica.checksum.clone());
        }

        let physical = self.physical_size(replica).await?;
        if physical != replica.size {
            return Err(ChecksumError::SizeMismatch {
                path: path.to_string(),
                replica: number,
                catalog: replica.size,
                physical,
            });
        }

        let checksum = self.digest(replica, replica.size).await?;
        let update = ReplicaUpdate::default()
            .with_checksum(checksum.clone())
            .expecting_unchanged(replica);
        self.catalog.update_replica(auth, path, number, &update)?;
        info!(path, replica = %number, %checksum, "registered checksum");
        Ok(checksum)
    }
}

/// Add a warning when the replicas in `results` carry more than one distinct checksum.
pub(crate) fn note_sibling_differences(
    results: &[(ReplicaNumber, String)],
    notes: &mut VerificationResult,
) {
    let distinct: BTreeSet<&str> = results.iter().map(|(_, c)| c.as_str()).collect();
    if distinct.len() > 1 {
        let listing = results
            .iter()
            .map(|(n, c)| format!("{n}={c}"))
            .collect::<Vec<_>>()
            .join(", ");
        notes.push(
            Severity::Warning,
            ErrorCode::SysReplicaChecksumsDiffer,
            None,
            format!("replica checksums differ: {listing}"),
        );
    }
}

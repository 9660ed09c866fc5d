//! Replication: copy a good replica onto another resource.
//!
//! A replication is an ordinary write open of the destination (which write
//! locks the source along with every other sibling), a copy of the source
//! bytes, and a close that computes or verifies the destination checksum.

use eddy_catalog::CatalogError;
use eddy_types::{DataObject, Replica, ReplicaNumber, ReplicaStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::coordinator::{CloseRequest, Coordinator, OpenRequest};
use crate::error::EngineError;
use crate::handle::HandleId;
use crate::session::Session;

/// A replication request as received from a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicateRequest {
    pub path: String,
    pub source_replica: Option<ReplicaNumber>,
    pub source_resource: Option<String>,
    /// Destination resource; the configured default when absent.
    pub destination: Option<String>,
    /// Compute and register the destination checksum.
    pub reg_checksum: bool,
    /// Require the destination digest to equal the source checksum.
    pub verify_checksum: bool,
    /// Leave the destination checksum empty.
    pub no_compute: bool,
    /// A good replica already on the destination is success.
    pub backup: bool,
    /// Update every stale replica from the source.
    pub all: bool,
    /// Administrative override of the access checks.
    pub admin: bool,
}

impl ReplicateRequest {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Self::default()
        }
    }

    pub fn with_destination(mut self, resource: &str) -> Self {
        self.destination = Some(resource.to_string());
        self
    }

    fn validate(&self) -> Result<(), EngineError> {
        let reject = |reason: &str| {
            Err(EngineError::IncompatibleParams {
                reason: reason.to_string(),
            })
        };
        if self.no_compute && (self.reg_checksum || self.verify_checksum) {
            return reject("no-compute excludes checksum registration and verification");
        }
        if self.reg_checksum && self.verify_checksum {
            return reject("checksum registration and verification are mutually exclusive");
        }
        if self.source_replica.is_some() && self.source_resource.is_some() {
            return reject("source replica number and source resource are mutually exclusive");
        }
        if self.all && self.destination.is_some() {
            return reject("all replicas and a destination resource are mutually exclusive");
        }
        Ok(())
    }
}

/// Outcome of a replication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicateOutcome {
    /// Bytes were copied to each destination.
    Replicated {
        source: ReplicaNumber,
        destinations: Vec<(ReplicaNumber, ReplicaStatus)>,
    },
    /// Backup mode found a good replica on the destination already.
    AlreadyGood { replica: ReplicaNumber },
}

/// Where one copy goes.
pub(crate) enum Destination {
    Existing(ReplicaNumber),
    New(String),
}

impl Coordinator {
    /// Replicate a data object according to `request`.
    pub async fn replicate(
        &self,
        session: &mut Session,
        request: &ReplicateRequest,
    ) -> Result<ReplicateOutcome, EngineError> {
        request.validate()?;
        let user = session.principal().user.clone();
        if request.admin && !self.access().is_privileged(&user) {
            return Err(EngineError::InsufficientPrivilege { user });
        }

        let object = self
            .catalog()
            .get(&request.path)?
            .ok_or_else(|| CatalogError::NotFound {
                path: request.path.clone(),
            })?;
        let source = self.select_source(&object, request)?;
        if request.verify_checksum && !source.has_checksum() {
            return Err(EngineError::NoChecksum {
                path: request.path.clone(),
                replica: source.replica_number,
            });
        }

        let destinations: Vec<Destination> = if request.all {
            object
                .replicas
                .iter()
                .filter(|r| {
                    r.status == ReplicaStatus::Stale
                        && !self.topology().is_bundle(&r.resource_hierarchy)
                })
                .map(|r| Destination::Existing(r.replica_number))
                .collect()
        } else {
            let name = request
                .destination
                .clone()
                .unwrap_or_else(|| self.config().default_resource.clone());
            let hierarchy =
                self.topology()
                    .resolve(&name)
                    .ok_or_else(|| EngineError::ResourceNotFound {
                        resource: name.clone(),
                    })?;
            if self.topology().is_bundle(&hierarchy) {
                return Err(EngineError::NotAllowed {
                    reason: format!("cannot replicate onto bundle resource {}", hierarchy.leaf()),
                });
            }
            match object.replica_on_resource(hierarchy.leaf()) {
                Some(existing) if existing.status == ReplicaStatus::Good => {
                    if request.backup {
                        info!(path = %request.path, replica = %existing.replica_number, "good replica already on destination");
                        return Ok(ReplicateOutcome::AlreadyGood {
                            replica: existing.replica_number,
                        });
                    }
                    return Err(EngineError::NotAllowed {
                        reason: format!(
                            "replica {} of {} on {} is already good",
                            existing.replica_number,
                            request.path,
                            hierarchy.leaf()
                        ),
                    });
                }
                Some(existing) => vec![Destination::Existing(existing.replica_number)],
                None => vec![Destination::New(name)],
            }
        };

        let mut copied = Vec::new();
        for destination in destinations {
            copied.push(self.copy_replica(session, request, &source, destination).await?);
        }
        info!(
            path = %request.path,
            source = %source.replica_number,
            destinations = copied.len(),
            "replicated data object"
        );
        Ok(ReplicateOutcome::Replicated {
            source: source.replica_number,
            destinations: copied,
        })
    }

    fn select_source(
        &self,
        object: &DataObject,
        request: &ReplicateRequest,
    ) -> Result<Replica, EngineError> {
        let path = &object.logical_path;
        let source = if let Some(number) = request.source_replica {
            object
                .replica(number)
                .ok_or_else(|| EngineError::ReplicaNotFound {
                    path: path.clone(),
                    target: format!("replica number {number}"),
                })?
        } else if let Some(resource) = &request.source_resource {
            object
                .replica_on_resource(resource)
                .ok_or_else(|| EngineError::ReplicaNotFound {
                    path: path.clone(),
                    target: format!("resource {resource}"),
                })?
        } else {
            object
                .first_with_status(ReplicaStatus::Good)
                .ok_or_else(|| EngineError::NoGoodReplica { path: path.clone() })?
        };
        if source.status != ReplicaStatus::Good {
            return Err(EngineError::SourceInaccessible {
                path: path.clone(),
                replica: source.replica_number,
                status: source.status,
            });
        }
        Ok(source.clone())
    }

    pub(crate) async fn copy_replica(
        &self,
        session: &mut Session,
        request: &ReplicateRequest,
        source: &Replica,
        destination: Destination,
    ) -> Result<(ReplicaNumber, ReplicaStatus), EngineError> {
        let open = match destination {
            Destination::Existing(number) => OpenRequest::write(&request.path)
                .replica(number)
                .truncating(),
            Destination::New(resource) => OpenRequest::create(&request.path).on_resource(&resource),
        };
        let handle = self.open_as(session, &open, request.admin).await?;
        let target = session.handle(handle)?.replica;

        // The open write locked the source; nothing changes it until close.
        if let Err(e) = self.confirm_source(&request.path, source) {
            if let Err(ce) = self.close(session, &CloseRequest::new(handle).failed()).await {
                warn!(path = %request.path, error = %ce, "close after source check failed");
            }
            return Err(e);
        }
        let copied = match self.copy_bytes(session, handle, source).await {
            Ok(copied) => copied,
            Err(e) => {
                if let Err(ce) = self.close(session, &CloseRequest::new(handle).failed()).await {
                    warn!(path = %request.path, error = %ce, "close after failed copy failed");
                }
                return Err(e);
            }
        };
        if self.config().verify_copy_length && copied != source.size {
            self.close(session, &CloseRequest::new(handle).failed())
                .await?;
            return Err(EngineError::CopyLength {
                path: request.path.clone(),
                expected: source.size,
                copied,
            });
        }

        let mut close = CloseRequest::new(handle).with_final_size(copied);
        if request.reg_checksum {
            close = close.computing_checksum();
        } else if !request.no_compute && source.has_checksum() {
            close = close.expecting_checksum(source.checksum.clone());
        }
        let status = self.close(session, &close).await?;
        debug!(path = %request.path, replica = %target, %status, copied, "copied replica");
        Ok((target, status))
    }

    /// Check that `source` was still good, with the content it was selected
    /// with, when the destination's write lock was taken.
    fn confirm_source(&self, path: &str, source: &Replica) -> Result<(), EngineError> {
        let object = self
            .catalog()
            .get(path)?
            .ok_or_else(|| CatalogError::NotFound {
                path: path.to_string(),
            })?;
        let number = source.replica_number;
        let locked_from = object
            .lock
            .as_ref()
            .and_then(|lock| lock.original_status(number));
        let current = object.replica(number);
        let unchanged = current.is_some_and(|r| {
            r.generation == source.generation
                && r.size == source.size
                && r.checksum == source.checksum
        });
        if locked_from == Some(ReplicaStatus::Good) && unchanged {
            return Ok(());
        }
        warn!(path, source = %number, ?locked_from, unchanged, "source changed before the copy started");
        Err(EngineError::SourceInaccessible {
            path: path.to_string(),
            replica: number,
            status: locked_from
                .or(current.map(|r| r.status))
                .unwrap_or(ReplicaStatus::Stale),
        })
    }

    async fn copy_bytes(
        &self,
        session: &mut Session,
        handle: HandleId,
        source: &Replica,
    ) -> Result<i64, EngineError> {
        let data = self
            .storage()
            .read(&source.resource_hierarchy, &source.physical_path)
            .await?;
        let written = self.write(session, handle, data).await?;
        Ok(written as i64)
    }
}

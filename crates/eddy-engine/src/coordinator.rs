//! [`Coordinator`]: open, write, read and close of replicas.
//!
//! Every open and close is one atomic read-modify-write of the data object
//! record in the catalog. Bytes only move after the catalog update that
//! admits them, and the first write through a handle erases the replica's
//! checksum before any byte reaches storage.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use eddy_catalog::{AccessControl, Catalog, CatalogError, Permission};
use eddy_checksum::ChecksumEngine;
use eddy_storage::{PhysicalStorage, ResourceTopology};
use eddy_types::{
    ChecksumScheme, DataObject, EngineConfig, Principal, Replica, ReplicaNumber, ReplicaStatus,
    ReplicaToken, SessionId, now_secs,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::handle::{HandleId, OpenHandle, OpenMode};
use crate::recovery;
use crate::session::Session;
use crate::statemach::{self, Admission, Denial, Finish, Intent, SiblingDisposition};

/// Attempts at a close whose lock holders change while the digest is computed.
const CLOSE_ATTEMPTS: usize = 3;

/// Parameters of an open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenRequest {
    pub path: String,
    pub write: bool,
    /// Create the data object, or a new replica, when none is selected.
    /// Implies `write`.
    pub create: bool,
    /// Empty the replica after locking it. Requires write intent.
    pub truncate: bool,
    pub replica_number: Option<ReplicaNumber>,
    /// Leaf (or composite) resource to open or create the replica on.
    pub resource: Option<String>,
    /// Token of an existing write open to join.
    pub token: Option<ReplicaToken>,
}

impl OpenRequest {
    pub fn read(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Self::default()
        }
    }

    pub fn write(path: &str) -> Self {
        Self {
            write: true,
            ..Self::read(path)
        }
    }

    pub fn create(path: &str) -> Self {
        Self {
            create: true,
            ..Self::write(path)
        }
    }

    pub fn on_resource(mut self, resource: &str) -> Self {
        self.resource = Some(resource.to_string());
        self
    }

    pub fn replica(mut self, number: ReplicaNumber) -> Self {
        self.replica_number = Some(number);
        self
    }

    pub fn with_token(mut self, token: ReplicaToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn truncating(mut self) -> Self {
        self.truncate = true;
        self
    }

    fn intent(&self) -> Intent {
        if self.write || self.create {
            Intent::Write
        } else {
            Intent::Read
        }
    }
}

/// Parameters of a close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloseRequest {
    pub handle: HandleId,
    /// Bytes the client reports having written outside this handle.
    pub bytes_written: u64,
    /// The client failed; the replica becomes stale.
    pub had_error: bool,
    /// Size to record instead of asking storage.
    pub final_size: Option<i64>,
    /// Compute and register a checksum of the final content.
    pub compute_checksum: bool,
    /// Digest the final content must match.
    pub expected_checksum: Option<String>,
    pub siblings: SiblingDisposition,
    /// Record the physical size.
    pub update_size: bool,
    /// Move the replica out of the intermediate state by its outcome.
    pub update_status: bool,
}

impl Default for CloseRequest {
    fn default() -> Self {
        Self {
            handle: HandleId::new(0),
            bytes_written: 0,
            had_error: false,
            final_size: None,
            compute_checksum: false,
            expected_checksum: None,
            siblings: SiblingDisposition::Restore,
            update_size: true,
            update_status: true,
        }
    }
}

impl CloseRequest {
    pub fn new(handle: HandleId) -> Self {
        Self {
            handle,
            ..Self::default()
        }
    }

    pub fn failed(mut self) -> Self {
        self.had_error = true;
        self
    }

    pub fn with_final_size(mut self, size: i64) -> Self {
        self.final_size = Some(size);
        self
    }

    pub fn computing_checksum(mut self) -> Self {
        self.compute_checksum = true;
        self
    }

    pub fn expecting_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.expected_checksum = Some(checksum.into());
        self
    }

    pub fn invalidating_siblings(mut self) -> Self {
        self.siblings = SiblingDisposition::Stale;
        self
    }

    fn wants_digest(&self) -> bool {
        self.compute_checksum || self.expected_checksum.is_some()
    }
}

/// Result of releasing one holder of a lock.
enum Release {
    /// The lock holders changed since the digest decision was made.
    Retry,
    /// Other holders remain; the replica stays intermediate.
    Released,
    Finalized {
        status: ReplicaStatus,
        mismatch: Option<(String, String)>,
    },
}

/// Ties the catalog, storage, topology, access control and checksum engine
/// together and drives the replica lifecycle.
pub struct Coordinator {
    catalog: Arc<Catalog>,
    storage: Arc<dyn PhysicalStorage>,
    topology: Arc<dyn ResourceTopology>,
    access: Arc<dyn AccessControl>,
    checksums: ChecksumEngine,
    config: EngineConfig,
    /// Sessions currently alive against this coordinator.
    live_sessions: Mutex<HashSet<SessionId>>,
}

impl Coordinator {
    pub fn new(
        config: EngineConfig,
        catalog: Arc<Catalog>,
        storage: Arc<dyn PhysicalStorage>,
        topology: Arc<dyn ResourceTopology>,
        access: Arc<dyn AccessControl>,
    ) -> Self {
        let checksums = ChecksumEngine::new(
            catalog.clone(),
            storage.clone(),
            topology.clone(),
            access.clone(),
            config.checksum_scheme,
        );
        Self {
            catalog,
            storage,
            topology,
            access,
            checksums,
            config,
            live_sessions: Mutex::new(HashSet::new()),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn storage(&self) -> &Arc<dyn PhysicalStorage> {
        &self.storage
    }

    pub fn topology(&self) -> &Arc<dyn ResourceTopology> {
        &self.topology
    }

    pub fn access(&self) -> &Arc<dyn AccessControl> {
        &self.access
    }

    pub fn checksums(&self) -> &ChecksumEngine {
        &self.checksums
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A poisoned registry is still a consistent set.
    fn sessions(&self) -> MutexGuard<'_, HashSet<SessionId>> {
        self.live_sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn register_session(&self, id: SessionId) {
        self.sessions().insert(id);
    }

    pub(crate) fn unregister_session(&self, id: SessionId) {
        self.sessions().remove(&id);
    }

    /// Whether a session is alive against this coordinator.
    pub fn is_live(&self, id: SessionId) -> bool {
        self.sessions().contains(&id)
    }

    #[cfg(test)]
    pub(crate) fn poison_session_registry(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = self.live_sessions.lock();
            panic!("poisoning the session registry");
        }));
    }

    /// Finalize locks none of whose holders is a live session.
    pub fn recover_orphaned_locks(&self) -> Result<Vec<String>, EngineError> {
        recovery::recover_orphaned_locks(&self.catalog, |id| self.is_live(id))
    }

    // ------------------------------------------------------------------
    // Open
    // ------------------------------------------------------------------

    /// Open a replica and register the handle in `session`.
    pub async fn open(
        &self,
        session: &mut Session,
        request: &OpenRequest,
    ) -> Result<HandleId, EngineError> {
        self.open_as(session, request, false).await
    }

    /// Open with the access checks skipped when `admin` is set. Callers
    /// verify privilege first.
    pub(crate) async fn open_as(
        &self,
        session: &mut Session,
        request: &OpenRequest,
        admin: bool,
    ) -> Result<HandleId, EngineError> {
        if request.truncate && request.intent() == Intent::Read {
            return Err(EngineError::IncompatibleParams {
                reason: "truncate requires write intent".to_string(),
            });
        }
        if request.replica_number.is_some() && request.resource.is_some() {
            return Err(EngineError::IncompatibleParams {
                reason: "replica number and resource name are mutually exclusive".to_string(),
            });
        }

        let principal = session.principal().clone();
        let sid = session.id();
        let handle = match self.catalog.get(&request.path)? {
            Some(object) => {
                self.check_access(&principal, &object, request.intent(), admin)?;
                self.open_existing(sid, &principal, request)?
            }
            None if request.create => match self.open_new(sid, &principal, request, admin) {
                Err(EngineError::Catalog(CatalogError::AlreadyExists { .. })) => {
                    debug!(path = %request.path, "lost creation race, opening existing object");
                    let object = self.require_object(&request.path)?;
                    self.check_access(&principal, &object, request.intent(), admin)?;
                    self.open_existing(sid, &principal, request)?
                }
                other => other?,
            },
            None => {
                return Err(CatalogError::NotFound {
                    path: request.path.clone(),
                }
                .into());
            }
        };

        let prepared = if handle.created() && !handle.joined {
            self.storage
                .create(&handle.hierarchy, &handle.physical_path)
                .await
        } else if request.truncate {
            self.storage
                .truncate(&handle.hierarchy, &handle.physical_path, 0)
                .await
        } else {
            Ok(())
        };
        if let Err(e) = prepared {
            warn!(path = %handle.path, replica = %handle.replica, error = %e, "cannot prepare replica, recovering");
            if let Err(re) = recovery::recover_handle(&self.catalog, sid, &handle) {
                warn!(path = %handle.path, error = %re, "recovery after failed open failed");
            }
            return Err(e.into());
        }

        info!(
            path = %handle.path,
            replica = %handle.replica,
            mode = ?handle.mode,
            joined = handle.joined,
            session = %sid,
            "opened replica"
        );
        Ok(session.insert(handle))
    }

    fn check_access(
        &self,
        principal: &Principal,
        object: &DataObject,
        intent: Intent,
        admin: bool,
    ) -> Result<(), EngineError> {
        let permission = match intent {
            Intent::Read => Permission::Read,
            Intent::Write => Permission::Write,
        };
        if admin || self.access.permits(&principal.user, object, permission) {
            return Ok(());
        }
        Err(EngineError::NoAccess {
            user: principal.user.clone(),
            path: object.logical_path.clone(),
        })
    }

    /// Register a new data object with one created replica.
    fn open_new(
        &self,
        sid: SessionId,
        principal: &Principal,
        request: &OpenRequest,
        admin: bool,
    ) -> Result<OpenHandle, EngineError> {
        if !admin && !self.access.may_create(&principal.user, &request.path) {
            return Err(EngineError::NoAccess {
                user: principal.user.clone(),
                path: request.path.clone(),
            });
        }
        if let Some(number) = request.replica_number {
            return Err(EngineError::ReplicaNotFound {
                path: request.path.clone(),
                target: format!("replica number {number}"),
            });
        }
        let hierarchy = self.creation_hierarchy(request.resource.as_deref())?;
        self.catalog
            .create_with(&request.path, &principal.user, |object| {
                self.place_new_replica(object, sid, principal, hierarchy, request.truncate)
            })
    }

    /// Select the target replica of an existing object and admit the open,
    /// in one catalog update.
    fn open_existing(
        &self,
        sid: SessionId,
        principal: &Principal,
        request: &OpenRequest,
    ) -> Result<OpenHandle, EngineError> {
        self.catalog.transact(&request.path, |object| {
            let intent = request.intent();
            let token_target = match (&request.token, &object.lock) {
                (Some(token), Some(lock)) if *token == lock.token => Some(lock.target),
                _ => None,
            };

            let target = match self.select_target(object, request, token_target)? {
                Some(number) => number,
                None => {
                    let hierarchy = self.creation_hierarchy(request.resource.as_deref())?;
                    match object.replica_on_resource(hierarchy.leaf()) {
                        Some(existing) => existing.replica_number,
                        None => {
                            return self.place_new_replica(
                                object,
                                sid,
                                principal,
                                hierarchy,
                                request.truncate,
                            );
                        }
                    }
                }
            };
            self.admit_existing(object, sid, target, intent, token_target == Some(target), request)
        })
    }

    /// `Ok(None)` asks for a new replica.
    fn select_target(
        &self,
        object: &DataObject,
        request: &OpenRequest,
        token_target: Option<ReplicaNumber>,
    ) -> Result<Option<ReplicaNumber>, EngineError> {
        let path = &object.logical_path;
        let intent = request.intent();

        if let Some(number) = request.replica_number {
            return match object.replica(number) {
                Some(replica) => Ok(Some(replica.replica_number)),
                None => Err(EngineError::ReplicaNotFound {
                    path: path.clone(),
                    target: format!("replica number {number}"),
                }),
            };
        }
        if let Some(resource) = &request.resource {
            return match object.replica_on_resource(resource) {
                Some(replica) => Ok(Some(replica.replica_number)),
                None if request.create => Ok(None),
                None if !self.topology.exists(resource) => Err(EngineError::ResourceNotFound {
                    resource: resource.clone(),
                }),
                None => Err(EngineError::ReplicaNotFound {
                    path: path.clone(),
                    target: format!("resource {resource}"),
                }),
            };
        }
        if token_target.is_some() {
            return Ok(token_target);
        }

        if let Some(good) = object.first_with_status(ReplicaStatus::Good) {
            return Ok(Some(good.replica_number));
        }
        if intent == Intent::Write {
            if request.create {
                return Ok(None);
            }
            if let Some(stale) = object.first_with_status(ReplicaStatus::Stale) {
                return Ok(Some(stale.replica_number));
            }
        }
        if object.is_write_locked() {
            return Err(EngineError::Locked { path: path.clone() });
        }
        Err(EngineError::NoGoodReplica { path: path.clone() })
    }

    fn admit_existing(
        &self,
        object: &mut DataObject,
        sid: SessionId,
        target: ReplicaNumber,
        intent: Intent,
        token_matches: bool,
        request: &OpenRequest,
    ) -> Result<OpenHandle, EngineError> {
        let path = object.logical_path.clone();
        let replica = object
            .replica(target)
            .ok_or_else(|| EngineError::ReplicaNotFound {
                path: path.clone(),
                target: format!("replica number {target}"),
            })?
            .clone();

        let admission = statemach::admit(replica.status, intent, token_matches).map_err(|denial| {
            match denial {
                Denial::Intermediate => EngineError::Intermediate {
                    path: path.clone(),
                    replica: target,
                },
                Denial::Locked => EngineError::Locked { path: path.clone() },
            }
        })?;

        let (mode, token, joined) = match admission {
            Admission::Read => (OpenMode::Read, None, false),
            Admission::Lock => {
                let token =
                    statemach::lock_for_write(object, target, sid, false, request.truncate)?;
                (OpenMode::Write, Some(token), false)
            }
            Admission::Join => {
                let lock = object.lock.as_mut().ok_or_else(|| EngineError::LockLost {
                    path: path.clone(),
                    replica: target,
                })?;
                lock.holders.push(sid);
                lock.content_written |= request.truncate;
                let mode = if lock.created {
                    OpenMode::Create
                } else {
                    OpenMode::Write
                };
                (mode, Some(lock.token.clone()), true)
            }
        };
        if request.truncate
            && let Some(replica) = object.replica_mut(target)
        {
            replica.checksum.clear();
            replica.bump_generation();
        }

        Ok(OpenHandle {
            path,
            data_id: object.data_id,
            replica: target,
            hierarchy: replica.resource_hierarchy,
            physical_path: replica.physical_path,
            mode,
            token,
            joined,
            bytes_written: 0,
            offset: 0,
            checksum_erased: request.truncate,
        })
    }

    /// Resolve where a new replica goes.
    fn creation_hierarchy(
        &self,
        resource: Option<&str>,
    ) -> Result<eddy_types::ResourceHierarchy, EngineError> {
        let name = resource.unwrap_or(&self.config.default_resource);
        let hierarchy =
            self.topology
                .resolve(name)
                .ok_or_else(|| EngineError::ResourceNotFound {
                    resource: name.to_string(),
                })?;
        if self.topology.is_bundle(&hierarchy) {
            return Err(EngineError::NotAllowed {
                reason: format!("cannot create a replica on bundle resource {}", hierarchy.leaf()),
            });
        }
        Ok(hierarchy)
    }

    fn place_new_replica(
        &self,
        object: &mut DataObject,
        sid: SessionId,
        principal: &Principal,
        hierarchy: eddy_types::ResourceHierarchy,
        truncate: bool,
    ) -> Result<OpenHandle, EngineError> {
        statemach::admit_create(object).map_err(|_| EngineError::Locked {
            path: object.logical_path.clone(),
        })?;

        let number = object.allocate_replica_number();
        let physical_path = physical_path_for(&object.logical_path);
        let now = now_secs();
        object.replicas.push(Replica {
            data_id: object.data_id,
            replica_number: number,
            resource_hierarchy: hierarchy.clone(),
            physical_path: physical_path.clone(),
            size: -1,
            checksum: String::new(),
            status: statemach::CREATED_STATUS,
            owner: principal.user.clone(),
            create_time: now,
            modify_time: now,
            version: String::new(),
            generation: 0,
        });
        let token = statemach::lock_for_write(object, number, sid, true, truncate)?;
        debug!(path = %object.logical_path, replica = %number, leaf = hierarchy.leaf(), "placed new replica");

        Ok(OpenHandle {
            path: object.logical_path.clone(),
            data_id: object.data_id,
            replica: number,
            hierarchy,
            physical_path,
            mode: OpenMode::Create,
            token: Some(token),
            joined: false,
            bytes_written: 0,
            offset: 0,
            checksum_erased: truncate,
        })
    }

    fn require_object(&self, path: &str) -> Result<DataObject, EngineError> {
        self.catalog.get(path)?.ok_or_else(|| {
            CatalogError::NotFound {
                path: path.to_string(),
            }
            .into()
        })
    }

    // ------------------------------------------------------------------
    // Write / read
    // ------------------------------------------------------------------

    /// Write `data` at the handle's offset. Returns the bytes written.
    pub async fn write(
        &self,
        session: &mut Session,
        handle: HandleId,
        data: Bytes,
    ) -> Result<usize, EngineError> {
        let open = session.handle_mut(handle)?;
        if !open.mode.is_write() {
            return Err(EngineError::NotWritable { handle });
        }
        if !open.checksum_erased {
            self.erase_checksum(open)?;
            open.checksum_erased = true;
        }

        let written = self
            .storage
            .write(&open.hierarchy, &open.physical_path, open.offset, data)
            .await?;
        open.offset += written as u64;
        open.bytes_written += written as u64;
        debug!(path = %open.path, replica = %open.replica, written, offset = open.offset, "wrote replica bytes");
        Ok(written)
    }

    /// Drop the registered checksum and flag the lock as written, in one
    /// update, before the first byte of a handle reaches storage.
    fn erase_checksum(&self, open: &OpenHandle) -> Result<(), EngineError> {
        self.catalog.transact(&open.path, |object| {
            let lock = object
                .lock
                .as_mut()
                .filter(|l| l.target == open.replica && Some(&l.token) == open.token.as_ref())
                .ok_or_else(|| EngineError::LockLost {
                    path: open.path.clone(),
                    replica: open.replica,
                })?;
            lock.content_written = true;
            if let Some(replica) = object.replica_mut(open.replica) {
                replica.checksum.clear();
                replica.bump_generation();
            }
            Ok(())
        })
    }

    /// Read the whole replica behind a handle.
    pub async fn read(&self, session: &Session, handle: HandleId) -> Result<Bytes, EngineError> {
        let open = session.handle(handle)?;
        Ok(self
            .storage
            .read(&open.hierarchy, &open.physical_path)
            .await?)
    }

    // ------------------------------------------------------------------
    // Close
    // ------------------------------------------------------------------

    /// Close a handle and finalize its replica.
    ///
    /// Returns the replica's status after the close. A failed close
    /// recovers the handle, so no lock outlives it.
    pub async fn close(
        &self,
        session: &mut Session,
        request: &CloseRequest,
    ) -> Result<ReplicaStatus, EngineError> {
        let open = session.take(request.handle)?;
        let sid = session.id();

        if !open.mode.is_write() {
            let object = self.require_object(&open.path)?;
            let status = object
                .replica(open.replica)
                .map(|r| r.status)
                .unwrap_or(ReplicaStatus::Stale);
            debug!(path = %open.path, replica = %open.replica, "closed read handle");
            return Ok(status);
        }

        match self.close_write(sid, &open, request).await {
            Ok(status) => Ok(status),
            Err(e @ EngineError::ChecksumMismatch { .. }) => Err(e),
            Err(e) => {
                warn!(path = %open.path, replica = %open.replica, error = %e, "close failed, recovering replica");
                if let Err(re) = recovery::recover_handle(&self.catalog, sid, &open) {
                    warn!(path = %open.path, error = %re, "recovery after failed close failed");
                }
                Err(e)
            }
        }
    }

    async fn close_write(
        &self,
        sid: SessionId,
        open: &OpenHandle,
        request: &CloseRequest,
    ) -> Result<ReplicaStatus, EngineError> {
        if request.had_error {
            let status = recovery::recover_handle(&self.catalog, sid, open)?;
            info!(path = %open.path, replica = %open.replica, %status, "closed replica after client error");
            return Ok(status);
        }

        let size = if request.update_size {
            match request.final_size {
                Some(size) => size,
                None => self.storage.stat(&open.hierarchy, &open.physical_path).await?,
            }
        } else {
            self.require_object(&open.path)?
                .replica(open.replica)
                .map(|r| r.size)
                .unwrap_or(-1)
        };
        let wrote_here = open.checksum_erased || request.bytes_written > 0;

        for attempt in 0..CLOSE_ATTEMPTS {
            let object = self.require_object(&open.path)?;
            let lock = object
                .lock
                .as_ref()
                .filter(|l| l.target == open.replica && Some(&l.token) == open.token.as_ref())
                .ok_or_else(|| EngineError::LockLost {
                    path: open.path.clone(),
                    replica: open.replica,
                })?;
            let digest = if needs_digest(lock, sid, wrote_here, request, size) {
                let scheme = request
                    .expected_checksum
                    .as_deref()
                    .and_then(ChecksumScheme::of_checksum)
                    .unwrap_or(self.config.checksum_scheme);
                Some(
                    self.storage
                        .compute_digest(&open.hierarchy, &open.physical_path, size, scheme)
                        .await?,
                )
            } else {
                None
            };

            let release = self.catalog.transact(&open.path, |object| {
                release_holder(object, sid, open, request, size, wrote_here, digest.as_deref())
            })?;
            match release {
                Release::Retry => {
                    debug!(path = %open.path, attempt, "lock holders changed during close, retrying");
                }
                Release::Released => {
                    info!(path = %open.path, replica = %open.replica, session = %sid, "released joined handle");
                    return Ok(ReplicaStatus::Intermediate);
                }
                Release::Finalized { status, mismatch } => {
                    if let Some((expected, actual)) = mismatch {
                        warn!(path = %open.path, replica = %open.replica, %expected, %actual, "checksum mismatch at close");
                        return Err(EngineError::ChecksumMismatch {
                            path: open.path.clone(),
                            replica: open.replica,
                            expected,
                            actual,
                        });
                    }
                    info!(path = %open.path, replica = %open.replica, %status, size, "closed replica");
                    return Ok(status);
                }
            }
        }
        Err(CatalogError::WriteConflict {
            path: open.path.clone(),
            replica: open.replica,
            reason: "lock holders kept changing during close".to_string(),
        }
        .into())
    }

    /// Status of one replica as the catalog has it now.
    pub fn replica_status(
        &self,
        path: &str,
        number: ReplicaNumber,
    ) -> Result<ReplicaStatus, EngineError> {
        self.require_object(path)?
            .replica(number)
            .map(|r| r.status)
            .ok_or_else(|| EngineError::ReplicaNotFound {
                path: path.to_string(),
                target: format!("replica number {number}"),
            })
    }
}

/// Whether the closing session finalizes with a digest of the content.
fn needs_digest(
    lock: &eddy_types::ObjectLock,
    sid: SessionId,
    wrote_here: bool,
    request: &CloseRequest,
    size: i64,
) -> bool {
    let last = lock.holders.len() == 1 && lock.holders[0] == sid;
    let written = lock.content_written || wrote_here;
    last && written && !lock.failed && request.update_status && request.wants_digest() && size >= 0
}

/// Remove `sid` from the lock holders and, when it was the last one,
/// finalize the target and its siblings.
fn release_holder(
    object: &mut DataObject,
    sid: SessionId,
    open: &OpenHandle,
    request: &CloseRequest,
    size: i64,
    wrote_here: bool,
    digest: Option<&str>,
) -> Result<Release, EngineError> {
    let lock_lost = || EngineError::LockLost {
        path: open.path.clone(),
        replica: open.replica,
    };
    let lock = object
        .lock
        .as_mut()
        .filter(|l| l.target == open.replica && Some(&l.token) == open.token.as_ref())
        .ok_or_else(lock_lost)?;
    if needs_digest(lock, sid, wrote_here, request, size) != digest.is_some() {
        return Ok(Release::Retry);
    }
    let position = lock
        .holders
        .iter()
        .position(|h| *h == sid)
        .ok_or_else(lock_lost)?;
    lock.holders.remove(position);
    lock.content_written |= wrote_here;
    if !lock.holders.is_empty() {
        return Ok(Release::Released);
    }

    let written = lock.content_written;
    let failed = lock.failed;
    let created = lock.created;
    let mut mismatch = None;
    let (finish, record) = if failed {
        (Finish::Failed, false)
    } else if !request.update_status {
        (Finish::Unchanged, written)
    } else if let (Some(expected), Some(actual)) = (&request.expected_checksum, digest)
        && expected != actual
    {
        mismatch = Some((expected.clone(), actual.to_string()));
        (Finish::Failed, true)
    } else if written {
        (Finish::Content, true)
    } else {
        (Finish::Unchanged, created)
    };

    if record && let Some(replica) = object.replica_mut(open.replica) {
        if request.update_size {
            replica.size = size;
        }
        replica.modify_time = now_secs();
        replica.bump_generation();
        replica.checksum = match (finish, digest) {
            (Finish::Content, Some(digest)) => digest.to_string(),
            _ => String::new(),
        };
    }
    let status = statemach::unlock(object, finish, request.siblings)?;
    Ok(Release::Finalized { status, mismatch })
}

/// Physical path of a replica inside its leaf resource.
fn physical_path_for(logical_path: &str) -> String {
    logical_path.trim_start_matches('/').to_string()
}

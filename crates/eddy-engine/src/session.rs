//! [`Session`]: one client connection and the handles it owns.
//!
//! Dropping a session with open handles recovers each of them, so a
//! connection that goes away without closing never leaves a lock behind.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use eddy_checksum::{ChecksumRequest, ChecksumResponse};
use eddy_types::{Principal, ReplicaStatus, SessionId};
use tracing::{debug, warn};

use crate::coordinator::{CloseRequest, Coordinator, OpenRequest};
use crate::error::EngineError;
use crate::handle::{HandleId, OpenHandle};
use crate::recovery;
use crate::replicate::{ReplicateOutcome, ReplicateRequest};

/// First handle id handed out by a session.
const FIRST_HANDLE: u32 = 3;

/// A client connection.
pub struct Session {
    id: SessionId,
    principal: Principal,
    coordinator: Arc<Coordinator>,
    handles: HashMap<HandleId, OpenHandle>,
    next_handle: u32,
}

impl Session {
    pub fn new(coordinator: Arc<Coordinator>, principal: Principal) -> Self {
        let id = SessionId::random();
        coordinator.register_session(id);
        debug!(session = %id, user = %principal.user, "session started");
        Self {
            id,
            principal,
            coordinator,
            handles: HashMap::new(),
            next_handle: FIRST_HANDLE,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Number of handles not yet closed.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    pub fn handle(&self, id: HandleId) -> Result<&OpenHandle, EngineError> {
        self.handles
            .get(&id)
            .ok_or(EngineError::BadHandle { handle: id })
    }

    pub(crate) fn handle_mut(&mut self, id: HandleId) -> Result<&mut OpenHandle, EngineError> {
        self.handles
            .get_mut(&id)
            .ok_or(EngineError::BadHandle { handle: id })
    }

    pub(crate) fn insert(&mut self, handle: OpenHandle) -> HandleId {
        let id = HandleId::new(self.next_handle);
        self.next_handle += 1;
        self.handles.insert(id, handle);
        id
    }

    pub(crate) fn take(&mut self, id: HandleId) -> Result<OpenHandle, EngineError> {
        self.handles
            .remove(&id)
            .ok_or(EngineError::BadHandle { handle: id })
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    pub async fn open(&mut self, request: &OpenRequest) -> Result<HandleId, EngineError> {
        let coordinator = Arc::clone(&self.coordinator);
        coordinator.open(self, request).await
    }

    pub async fn write(&mut self, handle: HandleId, data: Bytes) -> Result<usize, EngineError> {
        let coordinator = Arc::clone(&self.coordinator);
        coordinator.write(self, handle, data).await
    }

    pub async fn read(&self, handle: HandleId) -> Result<Bytes, EngineError> {
        self.coordinator.read(self, handle).await
    }

    pub async fn close(&mut self, request: &CloseRequest) -> Result<ReplicaStatus, EngineError> {
        let coordinator = Arc::clone(&self.coordinator);
        coordinator.close(self, request).await
    }

    pub async fn checksum(
        &self,
        request: &ChecksumRequest,
    ) -> Result<ChecksumResponse, EngineError> {
        Ok(self
            .coordinator
            .checksums()
            .checksum(&self.principal, request)
            .await?)
    }

    pub async fn replicate(
        &mut self,
        request: &ReplicateRequest,
    ) -> Result<ReplicateOutcome, EngineError> {
        let coordinator = Arc::clone(&self.coordinator);
        coordinator.replicate(self, request).await
    }

    /// End the session, recovering every handle still open.
    ///
    /// Returns the number of handles recovered.
    pub fn teardown(mut self) -> usize {
        self.recover_all()
    }

    fn recover_all(&mut self) -> usize {
        let handles: Vec<(HandleId, OpenHandle)> = self.handles.drain().collect();
        let count = handles.len();
        for (id, handle) in handles {
            match recovery::recover_handle(self.coordinator.catalog(), self.id, &handle) {
                Ok(status) => {
                    warn!(session = %self.id, handle = %id, path = %handle.path, replica = %handle.replica, %status, "recovered unclosed handle");
                }
                Err(e) => {
                    warn!(session = %self.id, handle = %id, path = %handle.path, error = %e, "failed to recover unclosed handle");
                }
            }
        }
        count
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.recover_all();
        self.coordinator.unregister_session(self.id);
        debug!(session = %self.id, "session ended");
    }
}

//! Crash and disconnect recovery.
//!
//! Recovery only touches the catalog, so it can run from `Drop` and at agent
//! start without a runtime. A recovered holder marks the lock failed: when
//! the last holder leaves, the target becomes stale and every sibling gets
//! its prior status back.

use eddy_catalog::Catalog;
use eddy_types::{ReplicaStatus, SessionId};
use tracing::{info, warn};

use crate::error::EngineError;
use crate::handle::OpenHandle;
use crate::statemach::{self, Finish, SiblingDisposition};

/// Release `handle` as if it was closed with an error.
///
/// Returns the replica's status afterwards. A handle whose lock is already
/// gone is left alone.
pub fn recover_handle(
    catalog: &Catalog,
    session: SessionId,
    handle: &OpenHandle,
) -> Result<ReplicaStatus, EngineError> {
    catalog.transact(&handle.path, |object| {
        let current = object
            .replica(handle.replica)
            .map(|r| r.status)
            .unwrap_or(ReplicaStatus::Stale);
        if !handle.mode.is_write() {
            return Ok(current);
        }
        let Some(lock) = object
            .lock
            .as_mut()
            .filter(|l| l.target == handle.replica && Some(&l.token) == handle.token.as_ref())
        else {
            return Ok(current);
        };
        let Some(position) = lock.holders.iter().position(|h| *h == session) else {
            return Ok(current);
        };
        lock.holders.remove(position);
        lock.failed = true;
        if !lock.holders.is_empty() {
            return Ok(current);
        }
        statemach::unlock(object, Finish::Failed, SiblingDisposition::Restore)
    })
}

/// Finalize every lock none of whose holders is alive.
///
/// Dead holders are dropped from locks that still have live ones, and those
/// locks are marked failed. Returns the paths whose locks were finalized.
pub fn recover_orphaned_locks(
    catalog: &Catalog,
    is_live: impl Fn(SessionId) -> bool,
) -> Result<Vec<String>, EngineError> {
    let mut recovered = Vec::new();
    for object in catalog.locked_objects()? {
        let path = object.logical_path;
        let finalized = catalog.transact(&path, |object| {
            let Some(lock) = object.lock.as_mut() else {
                return Ok::<_, EngineError>(None);
            };
            let before = lock.holders.len();
            lock.holders.retain(|h| is_live(*h));
            if lock.holders.len() < before {
                lock.failed = true;
            }
            if !lock.holders.is_empty() {
                return Ok(None);
            }
            let target = lock.target;
            let status = statemach::unlock(object, Finish::Failed, SiblingDisposition::Restore)?;
            Ok(Some((target, status)))
        });
        match finalized {
            Ok(Some((replica, status))) => {
                info!(%path, %replica, %status, "recovered orphaned lock");
                recovered.push(path);
            }
            Ok(None) => {}
            Err(e) => warn!(%path, error = %e, "failed to recover orphaned lock"),
        }
    }
    Ok(recovered)
}

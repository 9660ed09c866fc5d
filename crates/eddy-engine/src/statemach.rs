//! Replica status state machine.
//!
//! [`transition`] is the only place a replica status is computed. The
//! object-level helpers [`lock_for_write`] and [`unlock`] apply it to every
//! replica of a [`DataObject`] at once, so that taking and releasing a write
//! lock are each a single catalog update.
//!
//! ```text
//!   GOOD|STALE ──open for write──▶ INTERMEDIATE ──close with content──▶ GOOD
//!        ▲                              │
//!        └──────close, no change────────┤──close failed / recovery──▶ STALE
//!
//!   GOOD|STALE|READ_LOCKED ──sibling opened──▶ WRITE_LOCKED ──unlock──▶ prior
//!                                                   └──invalidate──▶ STALE
//! ```

use std::collections::BTreeMap;

use eddy_types::{
    DataObject, ObjectLock, ReplicaNumber, ReplicaStatus, ReplicaToken, SessionId,
};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Status of a replica created by an open or a replication.
pub const CREATED_STATUS: ReplicaStatus = ReplicaStatus::Intermediate;

/// Something that happens to a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The replica is opened for write.
    OpenTarget,
    /// A sibling of the replica is opened for write.
    LockSibling,
    /// Close after content was written.
    CloseWithContent,
    /// Close with an error or a failed verification, empty creation, recovery.
    CloseFailed,
    /// Close without net change: back to the status held before the open.
    CloseUnchanged(ReplicaStatus),
    /// The intermediate sibling was finalized.
    Unlock(ReplicaStatus),
    /// The intermediate sibling was finalized and siblings are invalidated.
    Invalidate,
}

/// The transition table.
pub fn transition(from: ReplicaStatus, event: Event) -> Result<ReplicaStatus, EngineError> {
    use ReplicaStatus::{Good, Intermediate, ReadLocked, Stale, WriteLocked};

    let to = match (from, event) {
        (Good | Stale, Event::OpenTarget) => Some(Intermediate),
        (Good | Stale | ReadLocked, Event::LockSibling) => Some(WriteLocked),
        (Intermediate, Event::CloseWithContent) => Some(Good),
        (Intermediate, Event::CloseFailed) => Some(Stale),
        (Intermediate, Event::CloseUnchanged(prior)) if prior.at_rest() => Some(prior),
        (WriteLocked, Event::Unlock(prior @ (Good | Stale | ReadLocked))) => Some(prior),
        (WriteLocked, Event::Invalidate) => Some(Stale),
        _ => None,
    };
    to.ok_or_else(|| EngineError::IllegalTransition {
        from,
        event: format!("{event:?}"),
    })
}

/// What an opener wants to do with a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Read,
    Write,
}

/// How an open of an existing replica proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Read without touching the catalog.
    Read,
    /// Take the write lock.
    Lock,
    /// Join the write lock already held on the replica.
    Join,
}

/// Why an open was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// The replica is intermediate and no matching token was presented.
    Intermediate,
    /// The replica is locked.
    Locked,
}

/// Decide whether a replica in `status` can be opened with `intent`.
///
/// `token_matches` is true when the opener presented the token of the lock
/// that made the replica intermediate.
pub fn admit(status: ReplicaStatus, intent: Intent, token_matches: bool) -> Result<Admission, Denial> {
    match (status, intent) {
        (ReplicaStatus::Intermediate, Intent::Read) if token_matches => Ok(Admission::Read),
        (ReplicaStatus::Intermediate, Intent::Write) if token_matches => Ok(Admission::Join),
        (ReplicaStatus::Intermediate, _) => Err(Denial::Intermediate),
        (ReplicaStatus::WriteLocked, _) => Err(Denial::Locked),
        (ReplicaStatus::ReadLocked, Intent::Write) => Err(Denial::Locked),
        (ReplicaStatus::ReadLocked | ReplicaStatus::Good | ReplicaStatus::Stale, Intent::Read) => {
            Ok(Admission::Read)
        }
        (ReplicaStatus::Good | ReplicaStatus::Stale, Intent::Write) => Ok(Admission::Lock),
    }
}

/// Refuse the creation of a new replica while the object is locked.
pub fn admit_create(object: &DataObject) -> Result<(), Denial> {
    if object.lock.is_some() || object.is_write_locked() {
        return Err(Denial::Locked);
    }
    Ok(())
}

/// What happens to the siblings when the intermediate replica is finalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiblingDisposition {
    /// Back to the status each held before the lock.
    #[default]
    Restore,
    /// Stale, when the target became good. Used after an overwrite.
    Stale,
}

/// How the intermediate replica leaves the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    Content,
    Failed,
    /// Prior status, or stale when the replica was created by the open.
    Unchanged,
}

/// Lock `target` for write on behalf of `session`.
///
/// A `created` target must already be in the replica list with
/// [`CREATED_STATUS`]; every other replica is write locked. Returns the
/// token joiners must present.
pub fn lock_for_write(
    object: &mut DataObject,
    target: ReplicaNumber,
    session: SessionId,
    created: bool,
    content_written: bool,
) -> Result<ReplicaToken, EngineError> {
    let original_statuses: BTreeMap<ReplicaNumber, ReplicaStatus> = object
        .replicas
        .iter()
        .filter(|r| !(created && r.replica_number == target))
        .map(|r| (r.replica_number, r.status))
        .collect();

    for replica in &mut object.replicas {
        if replica.replica_number != target {
            replica.status = transition(replica.status, Event::LockSibling)?;
        } else if !created {
            replica.status = transition(replica.status, Event::OpenTarget)?;
        }
    }

    let token = ReplicaToken::generate();
    object.lock = Some(ObjectLock {
        target,
        token: token.clone(),
        holders: vec![session],
        created,
        content_written,
        failed: false,
        original_statuses,
    });
    Ok(token)
}

/// Finalize the lock on `object`: move the target out of the intermediate
/// state and release every sibling. Returns the target's final status.
pub fn unlock(
    object: &mut DataObject,
    finish: Finish,
    siblings: SiblingDisposition,
) -> Result<ReplicaStatus, EngineError> {
    let path = object.logical_path.clone();
    let lock = object.lock.take().ok_or_else(|| EngineError::LockLost {
        path: path.clone(),
        replica: ReplicaNumber::new(0),
    })?;

    let target_event = match finish {
        Finish::Content => Event::CloseWithContent,
        Finish::Failed => Event::CloseFailed,
        Finish::Unchanged => match lock.original_status(lock.target) {
            Some(prior) => Event::CloseUnchanged(prior),
            None => Event::CloseFailed,
        },
    };
    let target = object
        .replica_mut(lock.target)
        .ok_or(EngineError::LockLost {
            path,
            replica: lock.target,
        })?;
    target.status = transition(target.status, target_event)?;
    let final_status = target.status;

    let invalidate =
        siblings == SiblingDisposition::Stale && final_status == ReplicaStatus::Good;
    for replica in &mut object.replicas {
        if replica.replica_number == lock.target {
            continue;
        }
        let event = if invalidate {
            Event::Invalidate
        } else {
            let prior = lock
                .original_status(replica.replica_number)
                .unwrap_or(ReplicaStatus::Stale);
            Event::Unlock(prior)
        };
        replica.status = transition(replica.status, event)?;
    }
    Ok(final_status)
}

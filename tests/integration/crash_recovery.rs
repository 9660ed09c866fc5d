//! Integration test: recovery after failed closes, lost connections and
//! agent restarts.

use bytes::Bytes;
use eddy_engine::{CloseRequest, OpenRequest, recover_orphaned_locks, statemach};
use eddy_types::{ErrorCode, ReplicaNumber, ReplicaStatus, SessionId};

use eddy_integration_tests::{TestGrid, home_path, test_data_seeded};

/// A connection that drops mid-write leaves its target STALE and every
/// sibling back in its prior state.
#[tokio::test]
async fn test_lost_connection_mid_write() {
    let grid = TestGrid::new();
    let path = home_path("alice", "dropped.dat");
    let data = test_data_seeded(2048, 7);
    grid.put("alice", &path, "resc0", &data).await;
    grid.replicate("alice", &path, "resc1").await;
    grid.replicate("alice", &path, "resc2").await;

    {
        let mut session = grid.session("alice");
        let handle = session
            .open(&OpenRequest::write(&path).replica(ReplicaNumber::new(2)))
            .await
            .unwrap();
        session
            .write(handle, Bytes::from_static(b"half a bl"))
            .await
            .unwrap();
        // Dropped here without a close.
    }

    let object = grid.object(&path);
    assert!(object.lock.is_none());
    object.check_invariants().unwrap();
    assert_eq!(
        grid.statuses(&path),
        vec![
            ReplicaStatus::Good,
            ReplicaStatus::Good,
            ReplicaStatus::Stale
        ]
    );
    assert_eq!(grid.get("alice", &path).await, data);
}

/// A close that cannot reach storage still releases the lock; the stale
/// replica is repaired by replicating from a good sibling.
#[tokio::test]
async fn test_failed_close_then_repair() {
    let grid = TestGrid::new();
    let path = home_path("alice", "flaky.dat");
    grid.put("alice", &path, "resc0", b"stable").await;
    grid.replicate("alice", &path, "resc1").await;

    let mut session = grid.session("alice");
    let handle = session
        .open(&OpenRequest::write(&path).on_resource("resc1"))
        .await
        .unwrap();
    session
        .write(handle, Bytes::from_static(b"STABLE"))
        .await
        .unwrap();
    grid.memory().set_unreachable("resc1", true);

    let err = session.close(&CloseRequest::new(handle)).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::SysRescIsDown);
    assert_eq!(session.open_handles(), 0);
    assert_eq!(
        grid.statuses(&path),
        vec![ReplicaStatus::Good, ReplicaStatus::Stale]
    );

    grid.memory().set_unreachable("resc1", false);
    grid.replicate("alice", &path, "resc1").await;
    assert_eq!(
        grid.statuses(&path),
        vec![ReplicaStatus::Good, ReplicaStatus::Good]
    );
}

/// Locks written by an agent that died survive in the catalog; the next
/// agent on the same catalog sweeps them.
#[tokio::test]
async fn test_restart_sweeps_orphaned_locks() {
    let dir = tempfile::tempdir().unwrap();
    let path = home_path("alice", "persisted.dat");
    let data = test_data_seeded(5000, 42);

    {
        let grid = TestGrid::on_disk(dir.path());
        grid.put("alice", &path, "resc0", &data).await;
        grid.replicate("alice", &path, "resc1").await;

        // What a crashed agent leaves behind: a lock with a holder that
        // will never close.
        grid.catalog()
            .transact(&path, |object| {
                statemach::lock_for_write(
                    object,
                    ReplicaNumber::new(1),
                    SessionId::new(9_999),
                    false,
                    true,
                )
                .map(|_| ())
            })
            .unwrap();
    }

    let grid = TestGrid::on_disk(dir.path());
    assert_eq!(
        grid.statuses(&path),
        vec![ReplicaStatus::WriteLocked, ReplicaStatus::Intermediate]
    );
    let err = grid
        .session("alice")
        .open(&OpenRequest::read(&path))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::LockedDataObjectAccess);

    let recovered = recover_orphaned_locks(grid.catalog(), |_| false).unwrap();
    assert_eq!(recovered, vec![path.clone()]);
    assert_eq!(
        grid.statuses(&path),
        vec![ReplicaStatus::Good, ReplicaStatus::Stale]
    );
    assert_eq!(grid.get("alice", &path).await, data);

    // A second sweep finds nothing.
    assert!(grid.coordinator().recover_orphaned_locks().unwrap().is_empty());
}

//! Integration test: replication between resources.

use eddy_checksum::ChecksumRequest;
use eddy_engine::{ReplicateOutcome, ReplicateRequest};
use eddy_types::{ErrorCode, ReplicaNumber, ReplicaStatus};

use eddy_integration_tests::{TestGrid, home_path, physical_path, sha256, test_data};

/// R0 GOOD without a checksum, replicated with no checksum flags: R1 is a
/// GOOD copy with an empty checksum.
#[tokio::test]
async fn test_plain_replication_leaves_checksum_empty() {
    let grid = TestGrid::new();
    let path = home_path("alice", "plain.dat");
    let data = test_data(64 * 1024);
    grid.put("alice", &path, "resc0", &data).await;

    let outcome = grid.replicate("alice", &path, "resc1").await;
    assert_eq!(
        outcome,
        ReplicateOutcome::Replicated {
            source: ReplicaNumber::new(0),
            destinations: vec![(ReplicaNumber::new(1), ReplicaStatus::Good)],
        }
    );

    let object = grid.object(&path);
    assert_eq!(object.replicas[1].status, ReplicaStatus::Good);
    assert!(object.replicas[1].checksum.is_empty());
    assert_eq!(object.replicas[1].size, data.len() as i64);
    assert!(object.lock.is_none());
    assert_eq!(
        grid.memory().contents("resc1", &physical_path(&path)).unwrap(),
        data
    );
}

fn verifying(path: &str, destination: &str) -> ReplicateRequest {
    ReplicateRequest {
        verify_checksum: true,
        ..ReplicateRequest::new(path).with_destination(destination)
    }
}

/// R0 GOOD with checksum C, replicated with verification: the copy is
/// GOOD and carries C when its digest matches.
#[tokio::test]
async fn test_verified_replication_succeeds_on_match() {
    let grid = TestGrid::new();
    let path = home_path("alice", "verified.dat");
    let data = test_data(10_000);
    grid.put("alice", &path, "resc0", &data).await;

    let mut session = grid.session("alice");
    session.checksum(&ChecksumRequest::new(&path)).await.unwrap();
    session.replicate(&verifying(&path, "resc1")).await.unwrap();

    let object = grid.object(&path);
    assert_eq!(object.replicas[1].status, ReplicaStatus::Good);
    assert_eq!(object.replicas[1].checksum, sha256(&data));
}

/// ...and a checksum mismatch with R1 left STALE when it does not.
#[tokio::test]
async fn test_verified_replication_fails_on_mismatch() {
    let grid = TestGrid::new();
    let path = home_path("alice", "rotten.dat");
    let data = test_data(10_000);
    grid.put("alice", &path, "resc0", &data).await;

    let mut session = grid.session("alice");
    session.checksum(&ChecksumRequest::new(&path)).await.unwrap();

    // Silent corruption of the source after its checksum was registered.
    let mut rotten = data.clone();
    rotten[5_000] ^= 0x01;
    grid.memory()
        .overwrite("resc0", &physical_path(&path), &rotten);

    let err = session
        .replicate(&verifying(&path, "resc1"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UserChksumMismatch);

    let object = grid.object(&path);
    assert_eq!(object.replicas[0].status, ReplicaStatus::Good);
    assert_eq!(object.replicas[1].status, ReplicaStatus::Stale);
    assert!(object.replicas[1].checksum.is_empty());
    assert!(object.lock.is_none());
}

/// Copies onto composite resources, backup mode and ALL.
#[tokio::test]
async fn test_replication_modes() {
    let grid = TestGrid::new();
    let path = home_path("alice", "modes.dat");
    grid.put("alice", &path, "resc0", b"first").await;
    grid.replicate("alice", &path, "repl").await;
    grid.replicate("alice", &path, "resc2").await;
    assert_eq!(
        grid.object(&path).replicas[1].resource_hierarchy.to_string(),
        "repl;ufs0"
    );

    let mut session = grid.session("alice");
    let backup = ReplicateRequest {
        backup: true,
        ..ReplicateRequest::new(&path).with_destination("repl")
    };
    assert_eq!(
        session.replicate(&backup).await.unwrap(),
        ReplicateOutcome::AlreadyGood {
            replica: ReplicaNumber::new(1)
        }
    );

    // Overwrite R0 and leave the others stale.
    let handle = session
        .open(&eddy_engine::OpenRequest::write(&path).truncating())
        .await
        .unwrap();
    session
        .write(handle, bytes::Bytes::from_static(b"second"))
        .await
        .unwrap();
    session
        .close(&eddy_engine::CloseRequest::new(handle).invalidating_siblings())
        .await
        .unwrap();
    assert_eq!(
        grid.statuses(&path),
        vec![
            ReplicaStatus::Good,
            ReplicaStatus::Stale,
            ReplicaStatus::Stale
        ]
    );

    let all = ReplicateRequest {
        all: true,
        reg_checksum: true,
        ..ReplicateRequest::new(&path)
    };
    session.replicate(&all).await.unwrap();
    let object = grid.object(&path);
    assert!(object.replicas.iter().all(|r| r.status == ReplicaStatus::Good));
    assert_eq!(object.replicas[2].checksum, sha256(b"second"));
    assert_eq!(
        grid.memory().contents("ufs0", &physical_path(&path)).unwrap(),
        b"second"
    );
}

/// Bundle resources and unknown resources never receive replicas.
#[tokio::test]
async fn test_replication_refusals() {
    let grid = TestGrid::new();
    let path = home_path("alice", "refused.dat");
    grid.put("alice", &path, "resc0", b"data").await;
    let mut session = grid.session("alice");

    let err = session
        .replicate(&ReplicateRequest::new(&path).with_destination("bundleResc"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::SysNotAllowed);

    let err = session
        .replicate(&ReplicateRequest::new(&path).with_destination("nowhere"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::SysRescDoesNotExist);

    let err = session
        .replicate(&ReplicateRequest::new(&home_path("alice", "missing.dat")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ObjPathDoesNotExist);
    assert_eq!(grid.object(&path).replicas.len(), 1);
}

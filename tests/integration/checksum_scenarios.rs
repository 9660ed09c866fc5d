//! Integration test: checksum lookup, registration and verification.
//!
//! Drives the checksum engine through client sessions against replicas
//! written by the open/close path.

use bytes::Bytes;
use eddy_catalog::{ReplicaUpdate, UpdateAuth};
use eddy_checksum::{ChecksumRequest, ChecksumResponse};
use eddy_engine::{CloseRequest, OpenRequest};
use eddy_types::{ErrorCode, ReplicaNumber, ReplicaStatus, Severity};

use eddy_integration_tests::{TestGrid, home_path, physical_path, sha256, test_data};

/// One GOOD replica without a checksum: the first lookup computes and
/// registers it, the second returns the registered string without reading
/// the replica again.
#[tokio::test]
async fn test_lookup_registers_once() {
    let grid = TestGrid::new();
    let path = home_path("alice", "a.dat");
    let data = test_data(10_000);
    grid.put("alice", &path, "resc0", &data).await;
    assert!(grid.object(&path).replicas[0].checksum.is_empty());

    let mut session = grid.session("alice");
    let before = grid.memory().digest_calls();
    let response = session.checksum(&ChecksumRequest::new(&path)).await.unwrap();
    assert_eq!(response.checksum(), Some(sha256(&data).as_str()));
    assert_eq!(grid.object(&path).replicas[0].checksum, sha256(&data));
    assert_eq!(grid.memory().digest_calls(), before + 1);

    // Same length, different bytes: a recomputation would notice.
    let mut corrupted = data.clone();
    corrupted[0] ^= 0xff;
    grid.memory()
        .overwrite("resc0", &physical_path(&path), &corrupted);

    let response = session.checksum(&ChecksumRequest::new(&path)).await.unwrap();
    assert_eq!(response.checksum(), Some(sha256(&data).as_str()));
    assert_eq!(grid.memory().digest_calls(), before + 1);

    // Forcing recomputes and registers the digest of what is on disk now.
    let forced = ChecksumRequest {
        force: true,
        ..ChecksumRequest::new(&path)
    };
    let response = session.checksum(&forced).await.unwrap();
    assert_eq!(response.checksum(), Some(sha256(&corrupted).as_str()));
}

/// Two GOOD replicas registered with different checksums: an ALL lookup
/// succeeds with one of them and warns about the difference.
#[tokio::test]
async fn test_all_lookup_warns_on_differing_replicas() {
    let grid = TestGrid::new();
    let path = home_path("alice", "b.dat");
    grid.put("alice", &path, "resc0", b"payload").await;
    grid.replicate("alice", &path, "resc1").await;

    let auth = UpdateAuth::admin("rods");
    for (number, checksum) in [(0, "abc"), (1, "xyz")] {
        grid.catalog()
            .update_replica(
                &auth,
                &path,
                ReplicaNumber::new(number),
                &ReplicaUpdate::default().with_checksum(checksum),
            )
            .unwrap();
    }

    let mut session = grid.session("alice");
    let request = ChecksumRequest {
        all: true,
        ..ChecksumRequest::new(&path)
    };
    let ChecksumResponse::Checksum { checksum, notes } = session.checksum(&request).await.unwrap()
    else {
        panic!("differing checksums are a warning, not a failure");
    };
    assert!(checksum == "abc" || checksum == "xyz", "got {checksum}");
    assert!(notes.findings.iter().any(|f| {
        f.severity == Severity::Warning && f.code == ErrorCode::SysReplicaChecksumsDiffer
    }));
    assert_eq!(notes.errors().count(), 0);
}

/// write → close with checksum → verify finds nothing; corrupting the
/// bytes afterwards makes verification report a mismatch without touching
/// the catalog.
#[tokio::test]
async fn test_registered_checksum_verifies_until_corrupted() {
    let grid = TestGrid::new();
    let path = home_path("alice", "c.dat");
    let data = test_data(4096);
    grid.put("alice", &path, "resc0", &data).await;
    grid.replicate("alice", &path, "resc1").await;

    let mut session = grid.session("alice");
    let register = ChecksumRequest {
        all: true,
        ..ChecksumRequest::new(&path)
    };
    session.checksum(&register).await.unwrap();

    let verify = ChecksumRequest {
        verify: true,
        all: true,
        ..ChecksumRequest::new(&path)
    };
    let response = session.checksum(&verify).await.unwrap();
    assert_eq!(response.status_code(), None);

    let mut corrupted = data.clone();
    corrupted[100] = corrupted[100].wrapping_add(1);
    grid.memory()
        .overwrite("resc1", &physical_path(&path), &corrupted);
    let before = grid.object(&path);

    let response = session.checksum(&verify).await.unwrap();
    assert_eq!(
        response.status_code(),
        Some(ErrorCode::CheckVerificationResults)
    );
    let ChecksumResponse::Findings(result) = response else {
        panic!("expected findings");
    };
    assert!(result.errors().any(|f| {
        f.code == ErrorCode::UserChksumMismatch && f.replica == Some(ReplicaNumber::new(1))
    }));
    assert_eq!(grid.object(&path), before);
}

/// Verification without compute only compares catalog facts.
#[tokio::test]
async fn test_verify_no_compute_skips_reading() {
    let grid = TestGrid::new();
    let path = home_path("alice", "d.dat");
    grid.put("alice", &path, "resc0", b"catalog only").await;

    let mut session = grid.session("alice");
    let before = grid.memory().digest_calls();
    let request = ChecksumRequest {
        verify: true,
        no_compute: true,
        ..ChecksumRequest::new(&path)
    };
    session.checksum(&request).await.unwrap();
    assert_eq!(grid.memory().digest_calls(), before);
}

/// Other users need at least read access; admins may override.
#[tokio::test]
async fn test_checksum_access_checks() {
    let grid = TestGrid::new();
    let path = home_path("alice", "e.dat");
    grid.put("alice", &path, "resc0", b"private").await;

    let mut carol = grid.session("carol");
    let err = carol
        .checksum(&ChecksumRequest::new(&path))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::CatNoAccessPermission);

    let admin = ChecksumRequest {
        admin: true,
        ..ChecksumRequest::new(&path)
    };
    let err = carol.checksum(&admin).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::CatInsufficientPrivilegeLevel);

    let mut rods = grid.session("rods");
    let response = rods.checksum(&admin).await.unwrap();
    assert_eq!(response.checksum(), Some(sha256(b"private").as_str()));
}

/// A replica rewritten with same-sized bytes while its digest is being
/// computed never ends up registered with the digest of the old bytes.
#[tokio::test]
async fn test_overwrite_during_digest_is_not_registered() {
    let grid = TestGrid::new();
    let path = home_path("alice", "racing.dat");
    grid.put("alice", &path, "resc0", b"aaaa").await;

    let gate = grid.memory().hold_next_digest();
    let lookup = {
        let session = grid.session("alice");
        let request = ChecksumRequest::new(&path);
        tokio::spawn(async move { session.checksum(&request).await })
    };
    gate.reached().await;

    let mut writer = grid.session("alice");
    let handle = writer.open(&OpenRequest::write(&path)).await.unwrap();
    writer
        .write(handle, Bytes::from_static(b"bbbb"))
        .await
        .unwrap();
    let status = writer.close(&CloseRequest::new(handle)).await.unwrap();
    assert_eq!(status, ReplicaStatus::Good);
    gate.release();

    let err = lookup.await.unwrap().unwrap_err();
    assert_eq!(err.code(), ErrorCode::SysCatalogWriteConflict);
    let replica = grid.object(&path).replicas[0].clone();
    assert_eq!(replica.size, 4);
    assert!(replica.checksum.is_empty(), "registered {}", replica.checksum);

    // A fresh lookup registers the digest of what is stored now.
    let response = grid
        .session("alice")
        .checksum(&ChecksumRequest::new(&path))
        .await
        .unwrap();
    assert_eq!(response.checksum(), Some(sha256(b"bbbb").as_str()));
    assert_eq!(grid.object(&path).replicas[0].checksum, sha256(b"bbbb"));
}

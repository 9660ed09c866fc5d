//! Integration test: open/write/close lifecycle across connections.

use bytes::Bytes;
use eddy_engine::{CloseRequest, OpenRequest};
use eddy_types::{ErrorCode, ReplicaNumber, ReplicaStatus};

use eddy_integration_tests::{TestGrid, home_path, physical_path, sha256, test_data_seeded};

/// A write open of R0 makes it INTERMEDIATE and R1 WRITE_LOCKED; a second
/// connection reading R1 is told the object is locked.
#[tokio::test]
async fn test_write_open_locks_siblings_for_other_connections() {
    let grid = TestGrid::new();
    let path = home_path("alice", "locked.dat");
    grid.put("alice", &path, "resc0", b"version one").await;
    grid.replicate("alice", &path, "resc1").await;

    let mut writer = grid.session("alice");
    let handle = writer
        .open(&OpenRequest::write(&path).replica(ReplicaNumber::new(0)))
        .await
        .unwrap();
    assert_eq!(
        grid.statuses(&path),
        vec![ReplicaStatus::Intermediate, ReplicaStatus::WriteLocked]
    );

    let mut reader = grid.session("alice");
    let err = reader
        .open(&OpenRequest::read(&path).replica(ReplicaNumber::new(1)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::LockedDataObjectAccess);
    assert!(err.to_string().contains("locked"), "{err}");

    writer.close(&CloseRequest::new(handle)).await.unwrap();
    let read = reader
        .open(&OpenRequest::read(&path).replica(ReplicaNumber::new(1)))
        .await
        .unwrap();
    assert_eq!(reader.read(read).await.unwrap().as_ref(), b"version one");
    reader.close(&CloseRequest::new(read)).await.unwrap();
}

/// Overwriting erases the registered checksum before any byte lands, and
/// the close leaves it empty unless asked to compute one.
#[tokio::test]
async fn test_overwrite_clears_checksum() {
    let grid = TestGrid::new();
    let path = home_path("alice", "sums.dat");
    let mut session = grid.session("alice");

    let handle = session.open(&OpenRequest::create(&path)).await.unwrap();
    session
        .write(handle, Bytes::from_static(b"original"))
        .await
        .unwrap();
    session
        .close(&CloseRequest::new(handle).computing_checksum())
        .await
        .unwrap();
    assert_eq!(grid.object(&path).replicas[0].checksum, sha256(b"original"));

    let handle = session
        .open(&OpenRequest::write(&path).truncating())
        .await
        .unwrap();
    assert!(grid.object(&path).replicas[0].checksum.is_empty());
    session
        .write(handle, Bytes::from_static(b"replaced"))
        .await
        .unwrap();
    let status = session.close(&CloseRequest::new(handle)).await.unwrap();

    assert_eq!(status, ReplicaStatus::Good);
    let replica = grid.object(&path).replicas[0].clone();
    assert!(replica.checksum.is_empty());
    assert_eq!(replica.size, 8);
    assert_eq!(grid.get("alice", &path).await, b"replaced");
}

/// Opening for write and closing without writing changes nothing.
#[tokio::test]
async fn test_untouched_write_open_is_a_no_op() {
    let grid = TestGrid::new();
    let path = home_path("alice", "noop.dat");
    grid.put("alice", &path, "resc0", b"steady").await;
    grid.replicate("alice", &path, "resc1").await;
    let mut session = grid.session("alice");
    session
        .checksum(&eddy_checksum::ChecksumRequest::new(&path))
        .await
        .unwrap();
    let before = grid.object(&path);

    let handle = session.open(&OpenRequest::write(&path)).await.unwrap();
    let status = session.close(&CloseRequest::new(handle)).await.unwrap();

    assert_eq!(status, ReplicaStatus::Good);
    assert_eq!(grid.object(&path), before);
}

/// Replicas land on the leaf of a composite resource.
#[tokio::test]
async fn test_create_on_composite_resource() {
    let grid = TestGrid::new();
    let path = home_path("alice", "tree.dat");
    grid.put("alice", &path, "repl", b"leafy").await;

    let replica = grid.object(&path).replicas[0].clone();
    assert_eq!(replica.resource_hierarchy.to_string(), "repl;ufs0");
    assert_eq!(
        grid.memory().contents("ufs0", &physical_path(&path)).unwrap(),
        b"leafy"
    );
}

/// Grants decide who may open what.
#[tokio::test]
async fn test_grants_gate_opens() {
    let grid = TestGrid::new();
    let path = home_path("alice", "shared.dat");
    grid.put("alice", &path, "resc0", b"shared").await;

    // bob holds a write grant on alice's home.
    grid.put("bob", &path, "resc0", b"bob was here").await;
    assert_eq!(grid.get("bob", &path).await, b"bob was here");

    let mut carol = grid.session("carol");
    let err = carol.open(&OpenRequest::read(&path)).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::CatNoAccessPermission);
    let err = carol
        .open(&OpenRequest::create(&home_path("alice", "new.dat")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::CatNoAccessPermission);
}

/// Many objects written and read back through separate sessions.
#[tokio::test]
async fn test_many_objects_round_trip() {
    let grid = TestGrid::new();

    let mut objects = Vec::new();
    for i in 0..40u32 {
        let data = test_data_seeded(100 + i as usize * 37, i + 1);
        let path = home_path("alice", &format!("obj-{i:03}"));
        let resource = ["resc0", "resc1", "resc2"][i as usize % 3];
        assert_eq!(
            grid.put("alice", &path, resource, &data).await,
            ReplicaStatus::Good
        );
        objects.push((path, data));
    }

    for (path, expected) in &objects {
        assert_eq!(&grid.get("alice", path).await, expected, "{path}");
    }
    let listed = grid.catalog().list("/tempZone/home/alice/obj-").unwrap();
    assert_eq!(listed.len(), 40);
}

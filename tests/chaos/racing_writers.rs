//! Chaos test: many connections racing to write the same data object.
//!
//! Writers repeatedly try to open a replica for write, write their own
//! pattern and close; some abandon their session mid-write. A watcher
//! checks the catalog invariants the whole time. Afterwards every attempt
//! is accounted for and no lock is left behind.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use eddy_engine::{CloseRequest, OpenRequest};
use eddy_types::{ErrorCode, ReplicaStatus};
use tokio::time;

use eddy_integration_tests::{TestGrid, home_path, test_data_seeded};

const WRITERS: u32 = 8;
const ROUNDS: u32 = 25;
const SIZE: usize = 4096;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_writers_keep_one_lock() {
    let grid = Arc::new(TestGrid::new());
    let path = home_path("alice", "contended.dat");
    grid.put("alice", &path, "resc0", &test_data_seeded(SIZE, 0)).await;
    grid.replicate("alice", &path, "resc1").await;
    grid.replicate("alice", &path, "resc2").await;

    let stop = Arc::new(AtomicBool::new(false));
    let committed = Arc::new(AtomicUsize::new(0));
    let abandoned = Arc::new(AtomicUsize::new(0));
    let refused = Arc::new(AtomicUsize::new(0));

    // --- Invariant watcher ---
    let watcher = {
        let grid = grid.clone();
        let path = path.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            let mut checks = 0usize;
            while !stop.load(Ordering::Relaxed) {
                let object = grid.object(&path);
                object
                    .check_invariants()
                    .unwrap_or_else(|e| panic!("invariant broken: {e}"));
                checks += 1;
                time::sleep(Duration::from_millis(1)).await;
            }
            checks
        })
    };

    // --- Writers ---
    let mut handles = Vec::new();
    for writer in 1..=WRITERS {
        let grid = grid.clone();
        let path = path.clone();
        let committed = committed.clone();
        let abandoned = abandoned.clone();
        let refused = refused.clone();
        handles.push(tokio::spawn(async move {
            for round in 0..ROUNDS {
                let mut session = grid.session("alice");
                let handle = match session.open(&OpenRequest::write(&path)).await {
                    Ok(handle) => handle,
                    Err(e) => {
                        assert!(
                            matches!(
                                e.code(),
                                ErrorCode::LockedDataObjectAccess
                                    | ErrorCode::IntermediateReplicaAccess
                            ),
                            "unexpected open failure: {e}"
                        );
                        refused.fetch_add(1, Ordering::Relaxed);
                        time::sleep(Duration::from_millis(2)).await;
                        continue;
                    }
                };
                let data = test_data_seeded(SIZE, writer * 1_000 + round);
                session.write(handle, Bytes::from(data)).await.unwrap();
                tokio::task::yield_now().await;

                if round % 5 == 4 {
                    // Connection lost before the close.
                    drop(session);
                    abandoned.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                let status = session
                    .close(&CloseRequest::new(handle).invalidating_siblings())
                    .await
                    .unwrap();
                assert_eq!(status, ReplicaStatus::Good);
                committed.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    let checks = watcher.await.unwrap();

    let committed = committed.load(Ordering::Relaxed);
    let abandoned = abandoned.load(Ordering::Relaxed);
    let refused = refused.load(Ordering::Relaxed);
    assert!(checks > 0);
    assert!(committed > 0, "no writer ever won the lock");
    assert_eq!(
        committed + abandoned + refused,
        (WRITERS * ROUNDS) as usize
    );

    let object = grid.object(&path);
    assert!(object.lock.is_none());
    object.check_invariants().unwrap();
    assert!(
        object
            .replicas
            .iter()
            .all(|r| matches!(r.status, ReplicaStatus::Good | ReplicaStatus::Stale))
    );
}

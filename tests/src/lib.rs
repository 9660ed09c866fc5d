//! Shared test harness for Eddy integration tests.
//!
//! Provides [`TestGrid`]: a coordinator over a catalog, physical storage and
//! a small resource topology, with helpers that drive whole client sessions
//! (put, replicate, checksum) the way an agent connection would.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use eddy_catalog::{Catalog, Permission, StaticAccessControl};
use eddy_engine::{CloseRequest, Coordinator, OpenRequest, ReplicateOutcome, ReplicateRequest, Session};
use eddy_storage::{FileStorage, MemoryStorage, PhysicalStorage, StaticTopology};
use eddy_types::{
    ChecksumScheme, DataObject, EngineConfig, Principal, ReplicaStatus, ResourceSpec,
};

/// Resources every grid knows about.
///
/// `repl` is a composite with two leaves; `bundleResc` is archive storage.
pub fn resources() -> Vec<ResourceSpec> {
    vec![
        ResourceSpec::storage("resc0"),
        ResourceSpec::storage("resc1"),
        ResourceSpec::storage("resc2"),
        ResourceSpec::storage("repl"),
        ResourceSpec::storage("ufs0").with_parent("repl"),
        ResourceSpec::storage("ufs1").with_parent("repl"),
        ResourceSpec::bundle("bundleResc"),
    ]
}

/// Engine config with `resc0` as the default resource.
pub fn default_config() -> EngineConfig {
    EngineConfig {
        default_resource: "resc0".to_string(),
        ..EngineConfig::default()
    }
}

/// A coordinator wired to a catalog and storage, memory- or disk-backed.
pub struct TestGrid {
    coordinator: Arc<Coordinator>,
    memory: Option<Arc<MemoryStorage>>,
}

impl TestGrid {
    /// In-memory storage and a temporary catalog.
    pub fn new() -> Self {
        Self::with_config(default_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let catalog = Catalog::open_temporary().expect("temporary catalog");
        let memory = Arc::new(MemoryStorage::new());
        let coordinator = build(config, catalog, memory.clone());
        Self {
            coordinator,
            memory: Some(memory),
        }
    }

    /// Catalog and vault under `dir`; reopening the same directory sees the
    /// same data objects and replica bytes.
    pub fn on_disk(dir: &Path) -> Self {
        let catalog = Catalog::open(dir.join("catalog")).expect("catalog");
        let storage = Arc::new(FileStorage::new(dir.join("vault")).expect("vault"));
        Self {
            coordinator: build(default_config(), catalog, storage),
            memory: None,
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        self.coordinator.catalog()
    }

    /// The in-memory backend, for fault injection.
    ///
    /// Panics on a disk-backed grid.
    pub fn memory(&self) -> &MemoryStorage {
        self.memory.as_deref().expect("grid is disk-backed")
    }

    pub fn session(&self, user: &str) -> Session {
        Session::new(self.coordinator.clone(), Principal::new(user))
    }

    pub fn object(&self, path: &str) -> DataObject {
        self.catalog()
            .get(path)
            .expect("catalog read")
            .unwrap_or_else(|| panic!("no data object at {path}"))
    }

    pub fn statuses(&self, path: &str) -> Vec<ReplicaStatus> {
        self.object(path).replicas.iter().map(|r| r.status).collect()
    }

    /// Create (or overwrite) `path` on `resource` with `data` in its own session.
    pub async fn put(&self, user: &str, path: &str, resource: &str, data: &[u8]) -> ReplicaStatus {
        let mut session = self.session(user);
        let handle = session
            .open(&OpenRequest::create(path).on_resource(resource).truncating())
            .await
            .unwrap_or_else(|e| panic!("open {path} on {resource}: {e}"));
        session
            .write(handle, Bytes::copy_from_slice(data))
            .await
            .unwrap_or_else(|e| panic!("write {path}: {e}"));
        session
            .close(&CloseRequest::new(handle))
            .await
            .unwrap_or_else(|e| panic!("close {path}: {e}"))
    }

    /// Replicate `path` onto `destination` in its own session.
    pub async fn replicate(&self, user: &str, path: &str, destination: &str) -> ReplicateOutcome {
        let mut session = self.session(user);
        session
            .replicate(&ReplicateRequest::new(path).with_destination(destination))
            .await
            .unwrap_or_else(|e| panic!("replicate {path} to {destination}: {e}"))
    }

    /// Read the bytes of the replica an ordinary read open selects.
    pub async fn get(&self, user: &str, path: &str) -> Vec<u8> {
        let mut session = self.session(user);
        let handle = session
            .open(&OpenRequest::read(path))
            .await
            .unwrap_or_else(|e| panic!("open {path} for read: {e}"));
        let data = session.read(handle).await.expect("read");
        session.close(&CloseRequest::new(handle)).await.expect("close");
        data.to_vec()
    }
}

impl Default for TestGrid {
    fn default() -> Self {
        Self::new()
    }
}

fn build(
    config: EngineConfig,
    catalog: Catalog,
    storage: Arc<dyn PhysicalStorage>,
) -> Arc<Coordinator> {
    let access = StaticAccessControl::new()
        .with_admin("rods")
        .with_grant("bob", "/tempZone/home/alice/", Permission::Write);
    Arc::new(Coordinator::new(
        config,
        Arc::new(catalog),
        storage,
        Arc::new(StaticTopology::new(resources())),
        Arc::new(access),
    ))
}

/// Logical path of `name` in `user`'s home collection.
pub fn home_path(user: &str, name: &str) -> String {
    format!("/tempZone/home/{user}/{name}")
}

/// Physical path the engine derives for a logical path.
pub fn physical_path(logical: &str) -> String {
    logical.trim_start_matches('/').to_string()
}

/// Checksum string the default scheme produces for `data`.
pub fn sha256(data: &[u8]) -> String {
    ChecksumScheme::Sha256.digest(data)
}

/// Generate deterministic pseudo-random test data.
pub fn test_data(size: usize) -> Vec<u8> {
    test_data_seeded(size, 0xDEAD_BEEF)
}

/// Generate test data with a specific seed (for distinct contents).
pub fn test_data_seeded(size: usize, seed: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = seed;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

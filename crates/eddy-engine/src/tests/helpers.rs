//! Shared test utilities for eddy-engine tests.

use std::sync::Arc;

use bytes::Bytes;
use eddy_catalog::{Catalog, Permission, StaticAccessControl};
use eddy_storage::{MemoryStorage, StaticTopology};
use eddy_types::{
    ChecksumScheme, DataObject, EngineConfig, Principal, ReplicaNumber, ReplicaStatus,
    ResourceSpec,
};

use crate::{CloseRequest, Coordinator, HandleId, OpenRequest, Session};

pub const PATH: &str = "/tempZone/home/alice/file.txt";
pub const PHYSICAL: &str = "tempZone/home/alice/file.txt";

/// Coordinator over an in-memory catalog and storage.
pub struct Harness {
    pub coordinator: Arc<Coordinator>,
    pub catalog: Arc<Catalog>,
    pub storage: Arc<MemoryStorage>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig {
            default_resource: "resc0".to_string(),
            ..EngineConfig::default()
        })
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let catalog = Arc::new(Catalog::open_temporary().unwrap());
        let storage = Arc::new(MemoryStorage::new());
        let topology = Arc::new(StaticTopology::new([
            ResourceSpec::storage("resc0"),
            ResourceSpec::storage("resc1"),
            ResourceSpec::storage("resc2"),
            ResourceSpec::bundle("bundleResc"),
            ResourceSpec::storage("repl"),
            ResourceSpec::storage("ufs0").with_parent("repl"),
        ]));
        let access = Arc::new(
            StaticAccessControl::new()
                .with_admin("rods")
                .with_grant("bob", "/tempZone/home/alice/", Permission::Read),
        );
        let coordinator = Arc::new(Coordinator::new(
            config,
            catalog.clone(),
            storage.clone(),
            topology,
            access,
        ));
        Self {
            coordinator,
            catalog,
            storage,
        }
    }

    pub fn session(&self, user: &str) -> Session {
        Session::new(self.coordinator.clone(), Principal::new(user))
    }

    pub fn object(&self) -> DataObject {
        self.catalog.get(PATH).unwrap().unwrap()
    }

    pub fn statuses(&self) -> Vec<ReplicaStatus> {
        self.object().replicas.iter().map(|r| r.status).collect()
    }

    pub fn status(&self, number: u32) -> ReplicaStatus {
        self.object()
            .replica(ReplicaNumber::new(number))
            .unwrap()
            .status
    }

    /// Write `data` through a fresh create open on `resource` and close it.
    pub async fn put(&self, session: &mut Session, resource: &str, data: &[u8]) -> ReplicaStatus {
        let handle = session
            .open(&OpenRequest::create(PATH).on_resource(resource))
            .await
            .unwrap();
        session
            .write(handle, Bytes::copy_from_slice(data))
            .await
            .unwrap();
        session.close(&CloseRequest::new(handle)).await.unwrap()
    }

    /// `PATH` with a good replica holding `data` on each of `resources`.
    pub async fn seeded(resources: &[&str], data: &[u8]) -> Self {
        let harness = Self::new();
        let mut session = harness.session("alice");
        harness.put(&mut session, resources[0], data).await;
        for resource in &resources[1..] {
            let outcome = session
                .replicate(&crate::ReplicateRequest::new(PATH).with_destination(resource))
                .await
                .unwrap();
            assert!(matches!(outcome, crate::ReplicateOutcome::Replicated { .. }));
        }
        harness
    }
}

pub fn sha(data: &[u8]) -> String {
    ChecksumScheme::Sha256.digest(data)
}

/// Open `PATH` for write and return the handle with its lock token.
pub async fn open_for_write(
    session: &mut Session,
    request: &OpenRequest,
) -> (HandleId, eddy_types::ReplicaToken) {
    let handle = session.open(request).await.unwrap();
    let token = session.handle(handle).unwrap().token.clone().unwrap();
    (handle, token)
}

//! [`Catalog`] implementation wrapping Fjall keyspaces.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use eddy_types::{DataId, DataObject, Replica, ReplicaNumber, ReplicaStatus};
use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::CatalogError;

type Result<T> = std::result::Result<T, CatalogError>;

const DATA_ID_SEQUENCE: &[u8] = b"data_id";

/// Which replicas of a data object a query returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaSelector {
    All,
    Number(ReplicaNumber),
    /// Replicas whose hierarchy ends at, or passes through, the named resource.
    Resource(String),
}

/// Identity an update is performed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateAuth {
    pub user: String,
    /// Skip the ownership check. Callers verify privilege first.
    pub admin: bool,
}

impl UpdateAuth {
    pub fn user(name: &str) -> Self {
        Self {
            user: name.to_string(),
            admin: false,
        }
    }

    pub fn admin(name: &str) -> Self {
        Self {
            user: name.to_string(),
            admin: true,
        }
    }
}

/// Partial update of one replica row.
///
/// The `expect_*` fields are compare-and-swap preconditions: the update is
/// refused when the stored replica no longer matches them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaUpdate {
    pub size: Option<i64>,
    pub checksum: Option<String>,
    pub status: Option<ReplicaStatus>,
    pub modify_time: Option<u64>,
    pub physical_path: Option<String>,
    pub version: Option<String>,
    pub expect_status: Option<ReplicaStatus>,
    pub expect_size: Option<i64>,
    pub expect_generation: Option<u64>,
    pub expect_checksum: Option<String>,
}

impl ReplicaUpdate {
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn with_status(mut self, status: ReplicaStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = Some(size);
        self
    }

    /// Require the stored replica to still have this status and size.
    pub fn expecting(mut self, status: ReplicaStatus, size: i64) -> Self {
        self.expect_status = Some(status);
        self.expect_size = Some(size);
        self
    }

    /// Require the stored replica to be exactly as `seen`: same status, size,
    /// checksum and content generation.
    pub fn expecting_unchanged(mut self, seen: &Replica) -> Self {
        self.expect_status = Some(seen.status);
        self.expect_size = Some(seen.size);
        self.expect_generation = Some(seen.generation);
        self.expect_checksum = Some(seen.checksum.clone());
        self
    }

    fn check_preconditions(&self, replica: &Replica) -> std::result::Result<(), String> {
        if let Some(status) = self.expect_status
            && replica.status != status
        {
            return Err(format!("status is {} (expected {status})", replica.status));
        }
        if let Some(size) = self.expect_size
            && replica.size != size
        {
            return Err(format!("size is {} (expected {size})", replica.size));
        }
        if let Some(generation) = self.expect_generation
            && replica.generation != generation
        {
            return Err(format!(
                "content generation is {} (expected {generation})",
                replica.generation
            ));
        }
        if let Some(checksum) = &self.expect_checksum
            && replica.checksum != *checksum
        {
            return Err("checksum changed".to_string());
        }
        Ok(())
    }

    fn apply(&self, replica: &mut Replica) {
        if let Some(size) = self.size {
            replica.size = size;
        }
        if let Some(checksum) = &self.checksum {
            replica.checksum.clone_from(checksum);
        }
        if let Some(status) = self.status {
            replica.status = status;
        }
        if let Some(mtime) = self.modify_time {
            replica.modify_time = mtime;
        }
        if let Some(path) = &self.physical_path {
            replica.physical_path.clone_from(path);
        }
        if let Some(version) = &self.version {
            replica.version.clone_from(version);
        }
    }
}

/// Replica catalog backed by Fjall.
///
/// Mutations go through [`transact`](Self::transact),
/// [`create_with`](Self::create_with) or
/// [`update_replica`](Self::update_replica). Each runs under a process-wide
/// commit guard, so read-modify-write cycles never interleave and two racing
/// transitions cannot both succeed.
pub struct Catalog {
    /// The underlying Fjall database handle.
    db: Database,
    /// Logical path → serialized DataObject.
    objects: Keyspace,
    /// DataId (8 bytes BE) → logical path.
    ids: Keyspace,
    /// Counter name → u64 (8 bytes BE).
    sequences: Keyspace,
    commit: Mutex<()>,
    /// Keeps the backing directory of a temporary catalog alive.
    _tmp: Option<TempDir>,
}

impl Catalog {
    /// Open a persistent catalog at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::builder(path).open()?;
        Self::init_keyspaces(db, None)
    }

    /// Open a temporary catalog that is cleaned up on drop.
    ///
    /// Useful for tests.
    pub fn open_temporary() -> Result<Self> {
        let tmp = tempfile::tempdir()?;
        let db = Database::builder(tmp.path()).temporary(true).open()?;
        Self::init_keyspaces(db, Some(tmp))
    }

    fn init_keyspaces(db: Database, tmp: Option<TempDir>) -> Result<Self> {
        let objects = db.keyspace("objects", KeyspaceCreateOptions::default)?;
        let ids = db.keyspace("ids", KeyspaceCreateOptions::default)?;
        let sequences = db.keyspace("sequences", KeyspaceCreateOptions::default)?;
        Ok(Self {
            db,
            objects,
            ids,
            sequences,
            commit: Mutex::new(()),
            _tmp: tmp,
        })
    }

    // ----- Queries -----

    /// Fetch a data object by logical path.
    pub fn get(&self, path: &str) -> Result<Option<DataObject>> {
        match self.objects.get(path.as_bytes())? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Fetch a data object by its catalog id.
    pub fn get_by_id(&self, id: DataId) -> Result<Option<DataObject>> {
        match self.ids.get(id.get().to_be_bytes().as_slice())? {
            Some(path) => {
                let path = String::from_utf8_lossy(&path).into_owned();
                self.get(&path)
            }
            None => Ok(None),
        }
    }

    /// List logical paths starting with `prefix`, in lexicographic order.
    pub fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        for guard in self.objects.prefix(prefix.as_bytes()) {
            let k = guard.key()?;
            paths.push(String::from_utf8_lossy(&k).into_owned());
        }
        Ok(paths)
    }

    /// Replicas of the object at `path` matching the selector, by replica number.
    pub fn replicas(&self, path: &str, selector: &ReplicaSelector) -> Result<Vec<Replica>> {
        let object = self.require(path)?;
        let replicas = object
            .replicas
            .into_iter()
            .filter(|r| match selector {
                ReplicaSelector::All => true,
                ReplicaSelector::Number(n) => r.replica_number == *n,
                ReplicaSelector::Resource(name) => r.resource_hierarchy.contains(name),
            })
            .collect();
        Ok(replicas)
    }

    /// Data objects carrying a lock record or a locked replica.
    pub fn locked_objects(&self) -> Result<Vec<DataObject>> {
        let mut locked = Vec::new();
        for guard in self.objects.iter() {
            let v = guard.value()?;
            let object: DataObject = postcard::from_bytes(&v)?;
            if object.lock.is_some() || object.is_write_locked() {
                locked.push(object);
            }
        }
        Ok(locked)
    }

    // ----- Mutations -----

    /// Run `f` against the stored record of `path` and persist the result.
    ///
    /// Nothing is written when `f` fails or leaves the record unchanged.
    pub fn transact<T, E>(
        &self,
        path: &str,
        f: impl FnOnce(&mut DataObject) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<CatalogError>,
    {
        let _guard = self.commit.lock().unwrap_or_else(PoisonError::into_inner);
        let mut object = self.require(path)?;
        let before = object.clone();
        let out = f(&mut object)?;
        if object != before {
            self.persist(&object)?;
        }
        Ok(out)
    }

    /// Register a new data object at `path` and let `f` populate it.
    ///
    /// Fails with [`CatalogError::AlreadyExists`] when the path is taken.
    pub fn create_with<T, E>(
        &self,
        path: &str,
        owner: &str,
        f: impl FnOnce(&mut DataObject) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<CatalogError>,
    {
        let _guard = self.commit.lock().unwrap_or_else(PoisonError::into_inner);
        if self.objects.get(path.as_bytes()).map_err(CatalogError::from)?.is_some() {
            return Err(CatalogError::AlreadyExists {
                path: path.to_string(),
            }
            .into());
        }
        let data_id = self.peek_next_data_id()?;
        let mut object = DataObject::new(data_id, path, owner);
        let out = f(&mut object)?;

        // Record, id index and id counter land together or not at all.
        let value = encode(&object)?;
        let id_key = data_id.get().to_be_bytes();
        let next_id = (data_id.get() + 1).to_be_bytes();
        let mut batch = self.db.batch();
        batch.insert(&self.objects, path.as_bytes(), value.as_slice());
        batch.insert(&self.ids, id_key.as_slice(), path.as_bytes());
        batch.insert(&self.sequences, DATA_ID_SEQUENCE, next_id.as_slice());
        batch.commit().map_err(CatalogError::from)?;
        debug!(path, %data_id, "registered data object");
        Ok(out)
    }

    /// Update one replica row atomically.
    ///
    /// Non-admin updates require the user to own the replica or the data
    /// object. Returns the replica as stored after the update.
    pub fn update_replica(
        &self,
        auth: &UpdateAuth,
        path: &str,
        number: ReplicaNumber,
        update: &ReplicaUpdate,
    ) -> Result<Replica> {
        self.transact(path, |object| {
            let object_owner = object.owner.clone();
            let replica = object
                .replica_mut(number)
                .ok_or_else(|| CatalogError::ReplicaNotFound {
                    path: path.to_string(),
                    replica: number,
                })?;
            if !auth.admin && replica.owner != auth.user && object_owner != auth.user {
                return Err(CatalogError::PermissionDenied {
                    user: auth.user.clone(),
                    path: path.to_string(),
                });
            }
            update
                .check_preconditions(replica)
                .map_err(|reason| CatalogError::WriteConflict {
                    path: path.to_string(),
                    replica: number,
                    reason,
                })?;
            update.apply(replica);
            debug!(path, replica = %number, admin = auth.admin, "updated replica");
            Ok(replica.clone())
        })
    }

    fn require(&self, path: &str) -> Result<DataObject> {
        self.get(path)?.ok_or_else(|| CatalogError::NotFound {
            path: path.to_string(),
        })
    }

    fn persist(&self, object: &DataObject) -> Result<()> {
        let value = encode(object)?;
        self.objects
            .insert(object.logical_path.as_bytes(), value.as_slice())?;
        Ok(())
    }

    fn peek_next_data_id(&self) -> Result<DataId> {
        let next = match self.sequences.get(DATA_ID_SEQUENCE)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes[..8].try_into().unwrap_or([0; 8]);
                u64::from_be_bytes(arr)
            }
            None => 1,
        };
        Ok(DataId::new(next))
    }
}

/// Serialize a record, refusing any that breaks the catalog invariants.
fn encode(object: &DataObject) -> Result<Vec<u8>> {
    if let Err(reason) = object.check_invariants() {
        warn!(path = %object.logical_path, %reason, "refusing to persist invalid record");
        return Err(CatalogError::Invariant {
            path: object.logical_path.clone(),
            reason,
        });
    }
    Ok(postcard::to_allocvec(object)?)
}

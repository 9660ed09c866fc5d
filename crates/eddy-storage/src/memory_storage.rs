//! In-memory physical storage backend.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use bytes::Bytes;
use eddy_types::{ChecksumScheme, ResourceHierarchy};
use tokio::sync::Notify;
use tracing::debug;

use crate::error::StorageError;
use crate::traits::PhysicalStorage;

type Key = (String, String);

/// In-memory replica storage backed by a `RwLock<HashMap>`.
///
/// Keys are `(leaf resource, physical path)`. Leaves can be marked
/// unreachable to exercise failure paths, and digest requests are counted
/// so callers can assert that cached checksums were not recomputed.
#[derive(Default)]
pub struct MemoryStorage {
    files: RwLock<HashMap<Key, Vec<u8>>>,
    down: RwLock<HashSet<String>>,
    digest_calls: AtomicUsize,
    digest_gate: Mutex<Option<Arc<DigestGate>>>,
}

/// Holds one digest after its bytes were hashed and before the result is
/// returned.
#[derive(Debug, Default)]
pub struct DigestGate {
    reached: Notify,
    release: Notify,
}

impl DigestGate {
    /// Wait until the held digest has hashed its bytes.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    /// Let the held digest return.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a leaf resource as (un)reachable.
    pub fn set_unreachable(&self, leaf: &str, unreachable: bool) {
        let mut down = self.down.write().expect("lock poisoned");
        if unreachable {
            down.insert(leaf.to_string());
        } else {
            down.remove(leaf);
        }
    }

    /// Number of `compute_digest` calls served so far.
    pub fn digest_calls(&self) -> usize {
        self.digest_calls.load(Ordering::Relaxed)
    }

    /// Hold the next `compute_digest` call at the returned gate.
    pub fn hold_next_digest(&self) -> Arc<DigestGate> {
        let gate = Arc::new(DigestGate::default());
        *self.digest_gate.lock().expect("lock poisoned") = Some(gate.clone());
        gate
    }

    /// Replace a replica's bytes behind the catalog's back.
    pub fn overwrite(&self, leaf: &str, path: &str, data: &[u8]) {
        let mut files = self.files.write().expect("lock poisoned");
        files.insert((leaf.to_string(), path.to_string()), data.to_vec());
    }

    /// Raw bytes of a replica, if present.
    pub fn contents(&self, leaf: &str, path: &str) -> Option<Vec<u8>> {
        let files = self.files.read().expect("lock poisoned");
        files.get(&(leaf.to_string(), path.to_string())).cloned()
    }

    fn key(&self, hier: &ResourceHierarchy, path: &str) -> Result<Key, StorageError> {
        let leaf = hier.leaf();
        if self.down.read().expect("lock poisoned").contains(leaf) {
            return Err(StorageError::Unreachable {
                resource: leaf.to_string(),
            });
        }
        Ok((leaf.to_string(), path.to_string()))
    }

    fn not_found(key: Key) -> StorageError {
        StorageError::NotFound {
            resource: key.0,
            path: key.1,
        }
    }
}

#[async_trait::async_trait]
impl PhysicalStorage for MemoryStorage {
    async fn create(&self, hier: &ResourceHierarchy, path: &str) -> Result<(), StorageError> {
        let key = self.key(hier, path)?;
        debug!(resource = %key.0, path, "creating replica in memory");
        self.files
            .write()
            .expect("lock poisoned")
            .insert(key, Vec::new());
        Ok(())
    }

    async fn write(
        &self,
        hier: &ResourceHierarchy,
        path: &str,
        offset: u64,
        data: Bytes,
    ) -> Result<usize, StorageError> {
        let key = self.key(hier, path)?;
        let mut files = self.files.write().expect("lock poisoned");
        let Some(file) = files.get_mut(&key) else {
            return Err(Self::not_found(key));
        };
        let start = offset as usize;
        let end = start + data.len();
        if file.len() < end {
            file.resize(end, 0);
        }
        file[start..end].copy_from_slice(&data);
        Ok(data.len())
    }

    async fn read(&self, hier: &ResourceHierarchy, path: &str) -> Result<Bytes, StorageError> {
        let key = self.key(hier, path)?;
        let files = self.files.read().expect("lock poisoned");
        match files.get(&key) {
            Some(data) => Ok(Bytes::copy_from_slice(data)),
            None => Err(Self::not_found(key)),
        }
    }

    async fn stat(&self, hier: &ResourceHierarchy, path: &str) -> Result<i64, StorageError> {
        let key = self.key(hier, path)?;
        let files = self.files.read().expect("lock poisoned");
        match files.get(&key) {
            Some(data) => Ok(data.len() as i64),
            None => Err(Self::not_found(key)),
        }
    }

    async fn compute_digest(
        &self,
        hier: &ResourceHierarchy,
        path: &str,
        byte_count: i64,
        scheme: ChecksumScheme,
    ) -> Result<String, StorageError> {
        let key = self.key(hier, path)?;
        self.digest_calls.fetch_add(1, Ordering::Relaxed);
        let digest = {
            let files = self.files.read().expect("lock poisoned");
            let Some(data) = files.get(&key) else {
                return Err(Self::not_found(key));
            };
            let len = if byte_count < 0 {
                data.len()
            } else {
                data.len().min(byte_count as usize)
            };
            scheme.digest(&data[..len])
        };

        let gate = self.digest_gate.lock().expect("lock poisoned").take();
        if let Some(gate) = gate {
            debug!(resource = %key.0, path, "holding digest at gate");
            gate.reached.notify_one();
            gate.release.notified().await;
        }
        Ok(digest)
    }

    async fn truncate(
        &self,
        hier: &ResourceHierarchy,
        path: &str,
        size: u64,
    ) -> Result<(), StorageError> {
        let key = self.key(hier, path)?;
        let mut files = self.files.write().expect("lock poisoned");
        let Some(file) = files.get_mut(&key) else {
            return Err(Self::not_found(key));
        };
        file.resize(size as usize, 0);
        Ok(())
    }

    async fn remove(&self, hier: &ResourceHierarchy, path: &str) -> Result<(), StorageError> {
        let key = self.key(hier, path)?;
        self.files.write().expect("lock poisoned").remove(&key);
        debug!(resource = %hier.leaf(), path, "removed replica from memory");
        Ok(())
    }
}

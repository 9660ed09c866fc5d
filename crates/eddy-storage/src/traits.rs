//! Core trait for physical replica storage.

use bytes::Bytes;
use eddy_types::{ChecksumScheme, ResourceHierarchy};

use crate::error::StorageError;

/// Driver for the bytes of physical replicas.
///
/// A replica is addressed by its resource hierarchy (only the leaf selects
/// the storage location) and its physical path inside that leaf.
/// All implementations must be `Send + Sync` for use across async tasks.
#[async_trait::async_trait]
pub trait PhysicalStorage: Send + Sync {
    /// Create an empty physical replica, replacing any previous content.
    async fn create(&self, hier: &ResourceHierarchy, path: &str) -> Result<(), StorageError>;

    /// Write `data` at `offset`, extending the replica as needed.
    async fn write(
        &self,
        hier: &ResourceHierarchy,
        path: &str,
        offset: u64,
        data: Bytes,
    ) -> Result<usize, StorageError>;

    /// Read the whole replica.
    async fn read(&self, hier: &ResourceHierarchy, path: &str) -> Result<Bytes, StorageError>;

    /// Current physical size in bytes.
    async fn stat(&self, hier: &ResourceHierarchy, path: &str) -> Result<i64, StorageError>;

    /// Digest the first `byte_count` bytes of the replica (all of it when negative).
    async fn compute_digest(
        &self,
        hier: &ResourceHierarchy,
        path: &str,
        byte_count: i64,
        scheme: ChecksumScheme,
    ) -> Result<String, StorageError>;

    /// Cut the replica down (or extend it with zeros) to `size` bytes.
    async fn truncate(
        &self,
        hier: &ResourceHierarchy,
        path: &str,
        size: u64,
    ) -> Result<(), StorageError>;

    /// Remove the replica. Missing replicas are not an error.
    async fn remove(&self, hier: &ResourceHierarchy, path: &str) -> Result<(), StorageError>;
}

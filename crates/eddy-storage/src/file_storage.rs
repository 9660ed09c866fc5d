//! File-based physical storage backend.
//!
//! Each leaf resource owns a vault directory `{base_dir}/{leaf}` and a
//! replica lives at `{base_dir}/{leaf}/{physical_path}`.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use eddy_types::{ChecksumScheme, ResourceHierarchy};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

use crate::error::StorageError;
use crate::traits::PhysicalStorage;

const DIGEST_BUFFER: usize = 64 * 1024;

/// Replica storage on the local filesystem, one vault directory per leaf.
pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    /// Create a new file storage rooted at the given directory.
    ///
    /// The directory is created if it does not exist.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Full filesystem path of a replica.
    ///
    /// Physical paths are relative to the vault and may not climb out of it.
    pub fn replica_path(&self, hier: &ResourceHierarchy, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(StorageError::InvalidPath {
                path: path.to_string(),
            });
        }
        Ok(self.base_dir.join(hier.leaf()).join(relative))
    }

    fn not_found(hier: &ResourceHierarchy, path: &str) -> StorageError {
        StorageError::NotFound {
            resource: hier.leaf().to_string(),
            path: path.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl PhysicalStorage for FileStorage {
    async fn create(&self, hier: &ResourceHierarchy, path: &str) -> Result<(), StorageError> {
        let full = self.replica_path(hier, path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::File::create(&full)
            .await
            .map_err(StorageError::Write)?;
        debug!(resource = %hier.leaf(), path = %full.display(), "created replica file");
        Ok(())
    }

    async fn write(
        &self,
        hier: &ResourceHierarchy,
        path: &str,
        offset: u64,
        data: Bytes,
    ) -> Result<usize, StorageError> {
        let full = self.replica_path(hier, path)?;
        let mut file = match tokio::fs::OpenOptions::new().write(true).open(&full).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Self::not_found(hier, path));
            }
            Err(e) => return Err(StorageError::Write(e)),
        };
        file.seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(StorageError::Write)?;
        file.write_all(&data).await.map_err(StorageError::Write)?;
        file.flush().await.map_err(StorageError::Write)?;
        Ok(data.len())
    }

    async fn read(&self, hier: &ResourceHierarchy, path: &str) -> Result<Bytes, StorageError> {
        let full = self.replica_path(hier, path)?;
        match tokio::fs::read(&full).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Self::not_found(hier, path)),
            Err(e) => Err(StorageError::Read(e)),
        }
    }

    async fn stat(&self, hier: &ResourceHierarchy, path: &str) -> Result<i64, StorageError> {
        let full = self.replica_path(hier, path)?;
        match tokio::fs::metadata(&full).await {
            Ok(meta) => Ok(meta.len() as i64),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Self::not_found(hier, path)),
            Err(e) => Err(StorageError::Stat(e)),
        }
    }

    async fn compute_digest(
        &self,
        hier: &ResourceHierarchy,
        path: &str,
        byte_count: i64,
        scheme: ChecksumScheme,
    ) -> Result<String, StorageError> {
        let full = self.replica_path(hier, path)?;
        let file = match tokio::fs::File::open(&full).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Self::not_found(hier, path));
            }
            Err(e) => return Err(StorageError::Read(e)),
        };
        let limit = if byte_count < 0 {
            u64::MAX
        } else {
            byte_count as u64
        };
        let mut reader = file.take(limit);
        let mut hasher = scheme.hasher();
        let mut buf = vec![0u8; DIGEST_BUFFER];
        loop {
            let n = reader.read(&mut buf).await.map_err(StorageError::Read)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize())
    }

    async fn truncate(
        &self,
        hier: &ResourceHierarchy,
        path: &str,
        size: u64,
    ) -> Result<(), StorageError> {
        let full = self.replica_path(hier, path)?;
        let file = match tokio::fs::OpenOptions::new().write(true).open(&full).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Self::not_found(hier, path));
            }
            Err(e) => return Err(StorageError::Write(e)),
        };
        file.set_len(size).await.map_err(StorageError::Write)?;
        Ok(())
    }

    async fn remove(&self, hier: &ResourceHierarchy, path: &str) -> Result<(), StorageError> {
        let full = self.replica_path(hier, path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => {
                debug!(resource = %hier.leaf(), path, "removed replica file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

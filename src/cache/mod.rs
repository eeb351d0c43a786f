use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

mod entry;
mod key;

pub use entry::{CacheEntry, DecodeError};
pub use key::{canonical_host, compute_key};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("corrupt cache record for key {key}")]
    Corrupt {
        key: String,
        #[source]
        source: DecodeError,
    },
    #[error("cache I/O failure at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Disk-backed response store: one record file per cache key, named by the
/// hex key string, under an injected base directory. The store owns the
/// on-disk representation; nothing else interprets the files.
///
/// There is no expiration, no size bound, and no per-key locking. Two
/// connections missing on the same key both fetch and both write; the last
/// rename wins, and a concurrent reader sees one of the complete records,
/// never a partial one.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    pub async fn ensure_dir(&self) -> Result<(), StoreError> {
        async_fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })
    }

    /// Fetches the entry stored under `key`, or `None` when the key has
    /// never been written. A present-but-undecodable record is a hard error.
    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let path = self.entry_path(key);
        let data = match async_fs::read(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        CacheEntry::decode(&data)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                key: key.to_string(),
                source,
            })
    }

    /// Persists `entry` under `key`. The record is written to a temp file in
    /// the cache directory and renamed into place, so a concurrent reader
    /// observes either no entry or a whole one.
    pub async fn put(&self, key: &str, entry: &CacheEntry) -> Result<(), StoreError> {
        self.ensure_dir().await?;
        let temp_path = self.dir.join(format!("tmp_{}", Uuid::new_v4()));

        let mut file = async_fs::File::create(&temp_path)
            .await
            .map_err(|source| StoreError::Io {
                path: temp_path.clone(),
                source,
            })?;
        let write_result = async {
            file.write_all(&entry.encode()).await?;
            file.flush().await
        }
        .await;
        drop(file);
        if let Err(source) = write_result {
            let _ = async_fs::remove_file(&temp_path).await;
            return Err(StoreError::Io {
                path: temp_path,
                source,
            });
        }

        let final_path = self.entry_path(key);
        if let Err(source) = async_fs::rename(&temp_path, &final_path).await {
            let _ = async_fs::remove_file(&temp_path).await;
            return Err(StoreError::Io {
                path: final_path,
                source,
            });
        }
        debug!(key, "cache entry persisted");
        Ok(())
    }

    /// Removes every persisted entry. Idempotent; a missing directory is a
    /// no-op rather than an error.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let mut entries = match async_fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };
        loop {
            let entry = entries.next_entry().await.map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let Some(entry) = entry else { break };
            let path = entry.path();
            if path.is_file() {
                match async_fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(source) => return Err(StoreError::Io { path, source }),
                }
            }
        }
        Ok(())
    }
}

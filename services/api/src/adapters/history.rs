//! services/api/src/adapters/history.rs
//!
//! This module contains the file-backed implementation of the `HistoryStore`
//! port from the `core` crate: one JSON blob in one fixed slot on disk,
//! overwritten after every session mutation and read back once at startup.

use async_trait::async_trait;
use skin_consult_core::ports::{HistoryStore, PortError, PortResult};
use std::path::PathBuf;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that persists the session collection to a single file.
#[derive(Clone)]
pub struct FileHistoryStore {
    path: PathBuf,
}

impl FileHistoryStore {
    /// Creates a new `FileHistoryStore` writing to the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

//=========================================================================================
// `HistoryStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl HistoryStore for FileHistoryStore {
    /// Reads the stored blob; a missing file means nothing was saved yet.
    async fn load(&self) -> PortResult<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PortError::Storage(e.to_string())),
        }
    }

    /// Overwrites the slot, creating parent directories on first use.
    async fn save(&self, bytes: &[u8]) -> PortResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| PortError::Storage(e.to_string()))?;
            }
        }
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| PortError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path().join("sessions.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn saved_blob_loads_back_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path().join("nested").join("sessions.json"));

        store.save(b"[{\"id\":1}]").await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, b"[{\"id\":1}]");

        store.save(b"[]").await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap(), b"[]");
    }
}

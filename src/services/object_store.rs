//! The object store seam the backup job talks to.
//!
//! `StorageService` is the production implementation. Tests use the
//! in-memory store from [`memory`].

use crate::{models::object::RemoteObject, services::storage_service::StorageResult};
use async_trait::async_trait;
use std::path::Path;

/// Maximum number of keys a single `delete_objects` request may carry.
/// Mirrors the S3 `DeleteObjects` limit; not tunable.
pub const MAX_DELETE_BATCH: usize = 1000;

/// Per-key result of a batched delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub key: String,
    /// `None` when the key is gone (deleting an absent key succeeds).
    pub error: Option<String>,
}

impl DeleteOutcome {
    pub fn deleted(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            error: None,
        }
    }

    pub fn failed(key: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            error: Some(error.into()),
        }
    }
}

/// Operations the mirror and the pruner need from remote storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object whose key starts with `prefix`, in key order.
    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<RemoteObject>>;

    /// Return an object's metadata, or `None` if the key is absent.
    async fn head_object(&self, key: &str) -> StorageResult<Option<RemoteObject>>;

    /// Upload a local file to `key`, overwriting any existing object.
    async fn put_object_from_file(&self, key: &str, path: &Path) -> StorageResult<RemoteObject>;

    /// Delete up to [`MAX_DELETE_BATCH`] keys in one request.
    ///
    /// An `Err` means the request as a whole failed and nothing can be
    /// assumed about its keys.
    async fn delete_objects(&self, keys: &[String]) -> StorageResult<Vec<DeleteOutcome>>;
}

#[cfg(test)]
pub mod memory {
    use super::*;
    use crate::services::storage_service::StorageError;
    use chrono::Utc;
    use std::{
        collections::{BTreeMap, HashSet},
        io,
        sync::Mutex,
    };

    /// In-memory store that records delete requests and can inject
    /// failures.
    #[derive(Default)]
    pub struct MemoryStore {
        objects: Mutex<BTreeMap<String, RemoteObject>>,
        delete_requests: Mutex<Vec<usize>>,
        failing_requests: Mutex<HashSet<usize>>,
        failing_keys: Mutex<HashSet<String>>,
        fail_listing: Mutex<bool>,
    }

    impl MemoryStore {
        pub fn with_objects(objects: impl IntoIterator<Item = RemoteObject>) -> Self {
            let store = Self::default();
            store.insert_all(objects);
            store
        }

        pub fn insert_all(&self, objects: impl IntoIterator<Item = RemoteObject>) {
            let mut map = self.objects.lock().unwrap();
            for obj in objects {
                map.insert(obj.key.clone(), obj);
            }
        }

        pub fn keys(&self) -> Vec<String> {
            self.objects.lock().unwrap().keys().cloned().collect()
        }

        pub fn get(&self, key: &str) -> Option<RemoteObject> {
            self.objects.lock().unwrap().get(key).cloned()
        }

        /// Sizes of every delete request issued so far.
        pub fn delete_requests(&self) -> Vec<usize> {
            self.delete_requests.lock().unwrap().clone()
        }

        /// Make the n-th (zero-based) delete request fail as a whole.
        pub fn fail_request(&self, index: usize) {
            self.failing_requests.lock().unwrap().insert(index);
        }

        pub fn fail_key(&self, key: &str) {
            self.failing_keys.lock().unwrap().insert(key.to_string());
        }

        pub fn fail_listing(&self) {
            *self.fail_listing.lock().unwrap() = true;
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<RemoteObject>> {
            if *self.fail_listing.lock().unwrap() {
                return Err(StorageError::Io(io::Error::other("listing unavailable")));
            }
            Ok(self
                .objects
                .lock()
                .unwrap()
                .values()
                .filter(|obj| obj.key.starts_with(prefix))
                .cloned()
                .collect())
        }

        async fn head_object(&self, key: &str) -> StorageResult<Option<RemoteObject>> {
            Ok(self.get(key))
        }

        async fn put_object_from_file(
            &self,
            key: &str,
            path: &Path,
        ) -> StorageResult<RemoteObject> {
            let bytes = tokio::fs::read(path).await?;
            let obj = RemoteObject {
                key: key.to_string(),
                last_modified: Utc::now(),
                size_bytes: bytes.len() as i64,
                etag: Some(format!("{:x}", md5::compute(&bytes))),
            };
            self.insert_all([obj.clone()]);
            Ok(obj)
        }

        async fn delete_objects(&self, keys: &[String]) -> StorageResult<Vec<DeleteOutcome>> {
            assert!(keys.len() <= MAX_DELETE_BATCH, "delete request too large");
            let index = {
                let mut requests = self.delete_requests.lock().unwrap();
                requests.push(keys.len());
                requests.len() - 1
            };
            if self.failing_requests.lock().unwrap().contains(&index) {
                return Err(StorageError::Io(io::Error::other("delete request rejected")));
            }

            let failing = self.failing_keys.lock().unwrap().clone();
            let mut objects = self.objects.lock().unwrap();
            Ok(keys
                .iter()
                .map(|key| {
                    if failing.contains(key) {
                        DeleteOutcome::failed(key, "access denied")
                    } else {
                        objects.remove(key);
                        DeleteOutcome::deleted(key)
                    }
                })
                .collect())
        }
    }
}

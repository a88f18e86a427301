use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{PipelineError, Result};

pub mod fs;
pub mod http;

pub use fs::FsObjectStore;
pub use http::HttpObjectStore;

/// Object-store boundary used by every stage.
///
/// Implementations are assumed at-least-once durable on a successful `put`;
/// errors they surface are already classified transient vs. permanent.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Idempotent existence check; creates the container when absent.
    async fn ensure_container(&self) -> Result<()>;

    /// Writes one object and returns its addressable location string.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// All keys under `prefix`, in lexicographic order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Deterministic object key for one chunk of a landing dataset.
///
/// The run timestamp keeps re-ingestion runs additive: a second run of the
/// same file lands under fresh keys and never overwrites the first.
pub fn chunk_key(landing_prefix: &str, dataset: &str, run_ts: i64, part: usize) -> String {
    format!("{landing_prefix}{dataset}/{run_ts}_{part}.csv")
}

/// In-memory object store for development and testing.
pub struct InMemoryObjectStore {
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    bucket: String,
}

impl InMemoryObjectStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn ensure_container(&self) -> Result<()> {
        Ok(())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String> {
        let mut objects = self.objects.lock().unwrap();
        objects.insert(key.to_string(), bytes);
        debug!("Stored object {}", key);
        Ok(format!("mem://{}/{}", self.bucket, key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let objects = self.objects.lock().unwrap();
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(format!("object '{key}'")))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        objects.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryObjectStore::new("test-bucket");
        let location = store.put("landing/albums/1_0.csv", b"id\n1\n".to_vec()).await.unwrap();
        assert_eq!(location, "mem://test-bucket/landing/albums/1_0.csv");
        assert_eq!(store.get("landing/albums/1_0.csv").await.unwrap(), b"id\n1\n");
    }

    #[tokio::test]
    async fn get_of_missing_key_is_not_found() {
        let store = InMemoryObjectStore::new("test-bucket");
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_filters_by_prefix_in_order() {
        let store = InMemoryObjectStore::new("test-bucket");
        store.put("landing/bands/1_1.csv", vec![1]).await.unwrap();
        store.put("landing/albums/1_0.csv", vec![2]).await.unwrap();
        store.put("landing/albums/1_1.csv", vec![3]).await.unwrap();

        let keys = store.list("landing/albums/").await.unwrap();
        assert_eq!(keys, vec!["landing/albums/1_0.csv", "landing/albums/1_1.csv"]);
    }

    #[test]
    fn chunk_keys_embed_run_and_part() {
        assert_eq!(
            chunk_key("landing/", "albums", 1700000000123, 2),
            "landing/albums/1700000000123_2.csv"
        );
    }
}

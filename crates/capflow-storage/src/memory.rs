//! In-memory object storage for tests and local runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::client::ObjectStorage;
use crate::error::{StorageError, StorageResult};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
}

/// Object storage kept in process memory.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    base_url: String,
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new("memory://capflow")
    }
}

impl MemoryStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Stored bytes for `key`.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).map(|o| o.data.clone())
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects.read().await.get(key).map(|o| o.content_type.clone())
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put(&self, data: Vec<u8>, key: &str, content_type: &str) -> StorageResult<String> {
        if key.is_empty() {
            return Err(StorageError::upload_failed("empty object key"));
        }
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(self.url_for(key))
    }

    /// Presigning never touches the object, like the R2 client.
    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        Ok(format!("{}?expires={}", self.url_for(key), ttl.as_secs()))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn remove(&self, keys: &[String]) -> StorageResult<u32> {
        let mut objects = self.objects.write().await;
        let removed = keys.iter().filter(|k| objects.remove(k.as_str()).is_some()).count();
        Ok(removed as u32)
    }
}

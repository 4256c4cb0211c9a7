use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use super::{content_type_for, BlobStore, StorageError};

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
}

/// Process-local blob store for tests and local runs.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    fail_gets: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `get` fail with a backend error.
    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().ok()?.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StorageError {
    StorageError::Backend("memory store lock poisoned".to_string())
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<String, StorageError> {
        let content_type = content_type.map(str::to_string).unwrap_or_else(|| content_type_for(key));
        self.objects
            .lock()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), StoredObject { data, content_type });
        Ok(self.url_for(key))
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!("get '{}' refused", key)));
        }
        self.objects
            .lock()
            .map_err(|_| poisoned())?
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn url_for(&self, key: &str) -> String {
        format!("memory://{}", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get() {
        let store = MemoryBlobStore::new();
        let url = store.put("originals/a.png", Bytes::from_static(b"abc"), None).await.unwrap();
        assert_eq!(url, "memory://originals/a.png");
        assert_eq!(store.get("originals/a.png").await.unwrap(), Bytes::from_static(b"abc"));
        assert_eq!(store.object("originals/a.png").unwrap().content_type, "image/png");
    }

    #[tokio::test]
    async fn explicit_content_type_wins() {
        let store = MemoryBlobStore::new();
        store.put("processed/a.png", Bytes::from_static(b"x"), Some("image/jpeg")).await.unwrap();
        assert_eq!(store.object("processed/a.png").unwrap().content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn missing_and_failing_gets() {
        let store = MemoryBlobStore::new();
        assert!(matches!(store.get("nope").await, Err(StorageError::NotFound(_))));

        store.put("k", Bytes::from_static(b"x"), None).await.unwrap();
        store.fail_gets(true);
        assert!(matches!(store.get("k").await, Err(StorageError::Backend(_))));
    }
}

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use super::{BlobError, BlobStore, RemoveReport, UploadOptions};

/// In-process blob store for embedding and tests.
///
/// Uploads and downloads can be switched to fail, which simulates an
/// unreachable object store.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Bytes>>,
    fail_uploads: AtomicBool,
    fail_downloads: AtomicBool,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> std::sync::MutexGuard<'_, HashMap<String, Bytes>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_downloads(&self, fail: bool) {
        self.fail_downloads.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.objects().contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, key: &str, data: Bytes, options: UploadOptions) -> Result<(), BlobError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(BlobError::Unavailable("uploads disabled".to_string()));
        }

        let mut objects = self.objects();
        if !options.upsert && objects.contains_key(key) {
            return Err(BlobError::AlreadyExists);
        }
        objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Bytes, BlobError> {
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(BlobError::Unavailable("downloads disabled".to_string()));
        }

        self.objects().get(key).cloned().ok_or(BlobError::NotFound)
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        Ok(self.contains(key))
    }

    async fn remove(&self, keys: &[String]) -> RemoveReport {
        let mut objects = self.objects();
        let mut report = RemoveReport::default();
        for key in keys {
            objects.remove(key);
            report.removed.push(key.clone());
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryBlobStore::new();
        store
            .upload("p/a", Bytes::from_static(b"a"), UploadOptions::default())
            .await
            .unwrap();

        store.set_fail_uploads(true);
        let result = store
            .upload("p/b", Bytes::from_static(b"b"), UploadOptions::default())
            .await;
        assert!(matches!(result, Err(BlobError::Unavailable(_))));
        assert!(!store.contains("p/b"));

        store.set_fail_downloads(true);
        assert!(store.download("p/a").await.is_err());
        store.set_fail_downloads(false);
        assert_eq!(store.download("p/a").await.unwrap(), Bytes::from_static(b"a"));
    }
}

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{BlobError, BlobStore, RemoveReport, UploadOptions};

impl BlobError {
    fn from_io(e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(e)
        }
    }
}

/// Blob store backed by a local directory tree.
pub struct FsBlobStore {
    base_path: PathBuf,
}

impl FsBlobStore {
    pub fn new(blob_dir: &Path) -> Self {
        Self {
            base_path: blob_dir.to_path_buf(),
        }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, BlobError> {
        let segments = validate_key(key)?;
        let (name, dirs) = segments
            .split_last()
            .ok_or_else(|| BlobError::InvalidKey(key.to_string()))?;

        let mut path = self.base_path.join("objects");
        for dir in dirs {
            path.push(dir);
        }
        if name.len() >= 4 {
            path.push(&name[0..2]);
            path.push(&name[2..4]);
        }
        path.push(name);
        Ok(path)
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path.join("tmp").join(Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, key: &str, data: Bytes, options: UploadOptions) -> Result<(), BlobError> {
        let final_path = self.object_path(key)?;

        if !options.upsert && fs::try_exists(&final_path).await? {
            return Err(BlobError::AlreadyExists);
        }

        let temp_path = self.temp_path();
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(e) = write_then_rename(&temp_path, &final_path, &data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(BlobError::Io(e));
        }

        tracing::debug!(key, content_type = %options.content_type, size = data.len(), "stored blob");
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Bytes, BlobError> {
        let path = self.object_path(key)?;
        let data = fs::read(&path).await.map_err(BlobError::from_io)?;
        Ok(Bytes::from(data))
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        let path = self.object_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn remove(&self, keys: &[String]) -> RemoveReport {
        let mut report = RemoveReport::default();

        for key in keys {
            let path = match self.object_path(key) {
                Ok(path) => path,
                Err(e) => {
                    report.failed.push((key.clone(), e));
                    continue;
                }
            };

            match fs::remove_file(&path).await {
                Ok(()) => report.removed.push(key.clone()),
                Err(e) if e.kind() == ErrorKind::NotFound => report.removed.push(key.clone()),
                Err(e) => report.failed.push((key.clone(), BlobError::Io(e))),
            }
        }

        report
    }
}

async fn write_then_rename(temp_path: &Path, final_path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut temp_file = File::create(temp_path).await?;
    temp_file.write_all(data).await?;
    temp_file.sync_all().await?;
    drop(temp_file);

    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::rename(temp_path, final_path).await
}

fn validate_key(key: &str) -> Result<Vec<&str>, BlobError> {
    let segments: Vec<&str> = key.split('/').collect();

    let valid = segments.iter().all(|s| {
        !s.is_empty()
            && *s != "."
            && *s != ".."
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    });

    if !valid {
        return Err(BlobError::InvalidKey(key.to_string()));
    }

    Ok(segments)
}

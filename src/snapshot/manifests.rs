use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

use super::branches::{head_advance, validate_branch_name};
use super::locks::ProjectLocks;
use super::mime::detect_mime;
use crate::blob::{BlobStore, UploadOptions, blob_key, content_hash, is_valid_hash};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::store::path::normalize_path;
use crate::types::{
    DEFAULT_FILE_MODE, Snapshot, SnapshotCommit, SnapshotFile, SnapshotFilter, SnapshotWithFiles,
};

/// A complete file set submitted in one request, typically by `snapvault push`.
#[derive(Debug, Clone, Default)]
pub struct NewSnapshot {
    pub project_id: String,
    pub user_id: String,
    /// Milliseconds since the Unix epoch; `None` means now.
    pub timestamp: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub external_id: Option<String>,
    /// Branch to point at the new snapshot in the same transaction.
    pub branch: Option<String>,
    pub files: Vec<NewSnapshotFile>,
}

#[derive(Debug, Clone, Default)]
pub struct NewSnapshotFile {
    pub path: String,
    pub hash: String,
    pub size: i64,
    pub mode: Option<String>,
    /// Inline content, verified against `hash` and `size` and uploaded.
    pub content: Option<Bytes>,
}

/// Bulk create, list, get and delete of whole snapshots.
pub struct SnapshotCatalog {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    locks: Arc<ProjectLocks>,
}

impl SnapshotCatalog {
    pub fn new(store: Arc<dyn Store>, blobs: Arc<dyn BlobStore>, locks: Arc<ProjectLocks>) -> Self {
        Self {
            store,
            blobs,
            locks,
        }
    }

    pub async fn create(&self, request: NewSnapshot) -> Result<SnapshotWithFiles> {
        if request.project_id.is_empty() {
            return Err(Error::bad_request("project_id is required"));
        }
        if request.user_id.is_empty() {
            return Err(Error::bad_request("user_id is required"));
        }
        if let Some(branch) = &request.branch {
            validate_branch_name(branch)?;
        }

        self.store
            .get_project(&request.project_id)?
            .ok_or_else(|| Error::not_found("Project not found"))?;
        self.store
            .get_user(&request.user_id)?
            .ok_or_else(|| Error::not_found("User not found"))?;

        let (files, uploads) = validate_files(request.files)?;

        let _gate = self.locks.shared(&request.project_id).await;
        for (file, content) in uploads {
            let key = blob_key(&request.project_id, &file.hash);
            let options = UploadOptions {
                content_type: detect_mime(&file.path, Some(content.as_ref())),
                upsert: true,
            };
            self.blobs.upload(&key, content, options).await.map_err(|e| {
                tracing::error!(project_id = %request.project_id, path = %file.path, error = %e, "content upload failed");
                Error::from(e)
            })?;
        }

        let now = Utc::now();
        let snapshot = Snapshot {
            id: Uuid::new_v4().to_string(),
            project_id: request.project_id,
            user_id: Some(request.user_id),
            title: request.title,
            description: request.description,
            timestamp: request.timestamp.unwrap_or_else(|| now.timestamp_millis()),
            file_count: files.len() as i64,
            external_id: request.external_id,
            created_at: now,
        };

        let commit = SnapshotCommit {
            snapshot: snapshot.clone(),
            files: files.clone(),
            advance: request.branch.as_deref().map(|b| head_advance(b, None)),
        };
        self.store.commit_snapshot(&commit)?;

        tracing::info!(
            project_id = %snapshot.project_id,
            snapshot_id = %snapshot.id,
            file_count = snapshot.file_count,
            "created snapshot"
        );

        Ok(SnapshotWithFiles { snapshot, files })
    }

    /// Snapshots matching the filter, newest first.
    pub fn list(&self, filter: &SnapshotFilter) -> Result<Vec<Snapshot>> {
        self.store.list_snapshots(filter)
    }

    pub fn get(&self, id: &str) -> Result<SnapshotWithFiles> {
        let snapshot = self
            .store
            .get_snapshot(id)?
            .ok_or_else(|| Error::not_found(format!("Snapshot not found: {id}")))?;
        let files = self.store.list_snapshot_files(id)?;
        Ok(SnapshotWithFiles { snapshot, files })
    }

    /// Deletes the snapshot, then removes the blobs no other snapshot of the
    /// project still references. Blob removal is best effort.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let snapshot = self
            .store
            .get_snapshot(id)?
            .ok_or_else(|| Error::not_found(format!("Snapshot not found: {id}")))?;

        // No upload may land between the reference check and the removal.
        let _gate = self.locks.exclusive(&snapshot.project_id).await;
        let files = self.store.list_snapshot_files(id)?;

        if !self.store.delete_snapshot(id)? {
            return Err(Error::not_found(format!("Snapshot not found: {id}")));
        }
        tracing::info!(project_id = %snapshot.project_id, snapshot_id = id, "deleted snapshot");

        let still_referenced: HashSet<String> = self
            .store
            .list_project_hashes(&snapshot.project_id)?
            .into_iter()
            .collect();

        let orphaned: HashSet<&str> = files
            .iter()
            .map(|f| f.hash.as_str())
            .filter(|h| !still_referenced.contains(*h))
            .collect();
        let keys: Vec<String> = orphaned
            .into_iter()
            .map(|h| blob_key(&snapshot.project_id, h))
            .collect();

        self.remove_blobs(&snapshot.project_id, &keys).await;
        Ok(())
    }

    /// Deletes a project with everything below it, then its blobs.
    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        let gate = self.locks.exclusive(project_id).await;
        let hashes = self.store.list_project_hashes(project_id)?;

        if !self.store.delete_project(project_id)? {
            return Err(Error::not_found("Project not found"));
        }
        tracing::info!(project_id, "deleted project");

        let keys: Vec<String> = hashes.iter().map(|h| blob_key(project_id, h)).collect();
        self.remove_blobs(project_id, &keys).await;

        drop(gate);
        self.locks.forget(project_id).await;
        Ok(())
    }

    async fn remove_blobs(&self, project_id: &str, keys: &[String]) {
        if keys.is_empty() {
            return;
        }

        let report = self.blobs.remove(keys).await;
        for (key, error) in &report.failed {
            tracing::warn!(project_id, key = %key, error = %error, "failed to remove blob");
        }
        if !report.removed.is_empty() {
            tracing::debug!(project_id, count = report.removed.len(), "removed blobs");
        }
    }
}

type PendingUpload = (SnapshotFile, Bytes);

/// Normalizes paths, rejects duplicates and paths that are both a file and
/// a folder, and checks inline content against the declared hash and size.
fn validate_files(input: Vec<NewSnapshotFile>) -> Result<(Vec<SnapshotFile>, Vec<PendingUpload>)> {
    let mut seen = HashSet::new();
    let mut files = Vec::with_capacity(input.len());
    let mut uploads = Vec::new();

    for raw in input {
        let path = normalize_path(&raw.path)?;
        if !seen.insert(path.clone()) {
            return Err(Error::bad_request(format!("Duplicate path: {path}")));
        }

        if raw.size < 0 {
            return Err(Error::bad_request(format!("Invalid size for {path}")));
        }

        let hash = raw.hash.to_ascii_lowercase();
        if !is_valid_hash(&hash) {
            return Err(Error::bad_request(format!("Invalid hash for {path}")));
        }

        let file = SnapshotFile {
            path,
            hash,
            size: raw.size,
            mode: raw
                .mode
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_FILE_MODE.to_string()),
        };

        if let Some(content) = raw.content {
            if content_hash(&content) != file.hash {
                return Err(Error::bad_request(format!(
                    "Content of {} does not match its hash",
                    file.path
                )));
            }
            if content.len() as i64 != file.size {
                return Err(Error::bad_request(format!(
                    "Content of {} does not match its size",
                    file.path
                )));
            }
            uploads.push((file.clone(), content));
        }

        files.push(file);
    }

    for file in &files {
        for (idx, _) in file.path.match_indices('/') {
            let ancestor = &file.path[..idx];
            if seen.contains(ancestor) {
                return Err(Error::conflict(format!(
                    "{ancestor} is a file, not a folder"
                )));
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok((files, uploads))
}

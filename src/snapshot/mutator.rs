use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

use super::branches::{head_advance, validate_branch_name};
use super::locks::ProjectLocks;
use super::mime::detect_mime;
use super::tree::TreeResolver;
use crate::blob::{BlobStore, UploadOptions, blob_key, content_hash};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::store::path::{is_descendant, normalize_path};
use crate::types::{DEFAULT_FILE_MODE, Snapshot, SnapshotCommit, SnapshotFile};

/// File that makes an otherwise empty folder visible in tree listings.
pub const FOLDER_PLACEHOLDER: &str = ".gitkeep";

/// What a failed blob upload means for the mutation that needed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobPolicy {
    /// Abort before anything is written to the relational store.
    Hard,
    /// Log and carry on; the file row may point at missing content.
    Soft,
}

/// One logical change to a file set.
#[derive(Debug, Clone)]
pub enum FileChange {
    /// Add the file, replacing any row with the same path.
    Upsert(SnapshotFile),
    RemoveFile(String),
    /// Remove everything below the folder.
    RemoveFolder(String),
}

/// Who is changing which branch of which project.
#[derive(Debug, Clone)]
pub struct MutationContext {
    pub project_id: String,
    pub branch: String,
    pub user_id: String,
    /// Opt-in optimistic concurrency: only commit if the branch head is still this.
    pub expected_head: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub snapshot: Snapshot,
    /// Normalized path the mutation targeted.
    pub path: String,
    /// The row written by create/update operations.
    pub file: Option<SnapshotFile>,
}

/// Applies one change to a file set, producing the next file set sorted by path.
///
/// Paths stay unique, and no path is both a file and a directory.
pub fn apply_change(files: &[SnapshotFile], change: &FileChange) -> Result<Vec<SnapshotFile>> {
    let mut next: Vec<SnapshotFile> = match change {
        FileChange::Upsert(new_file) => {
            check_file_dir_conflicts(files, &new_file.path)?;

            let mut next: Vec<SnapshotFile> = files
                .iter()
                .filter(|f| f.path != new_file.path)
                .cloned()
                .collect();
            next.push(new_file.clone());
            next
        }
        FileChange::RemoveFile(path) => {
            let next: Vec<SnapshotFile> = files.iter().filter(|f| &f.path != path).cloned().collect();
            if next.len() == files.len() {
                return Err(Error::not_found(format!("File not found: {path}")));
            }
            next
        }
        FileChange::RemoveFolder(path) => {
            let next: Vec<SnapshotFile> = files
                .iter()
                .filter(|f| !is_descendant(&f.path, path))
                .cloned()
                .collect();
            if next.len() == files.len() {
                return Err(Error::not_found(format!("Folder not found: {path}")));
            }
            next
        }
    };

    next.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(next)
}

fn check_file_dir_conflicts(files: &[SnapshotFile], path: &str) -> Result<()> {
    if files.iter().any(|f| is_descendant(&f.path, path)) {
        return Err(Error::conflict(format!("A folder already exists at {path}")));
    }

    let existing: HashSet<&str> = files.iter().map(|f| f.path.as_str()).collect();
    for (idx, _) in path.match_indices('/') {
        let ancestor = &path[..idx];
        if existing.contains(ancestor) {
            return Err(Error::conflict(format!("{ancestor} is a file, not a folder")));
        }
    }

    Ok(())
}

/// Derives new snapshots from a branch's current file set.
///
/// Every operation reads the current set, computes the next one, uploads new
/// content, then writes the snapshot, its files and the branch head in one
/// transaction.
pub struct SnapshotMutator {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    locks: Arc<ProjectLocks>,
    resolver: TreeResolver,
}

impl SnapshotMutator {
    pub fn new(store: Arc<dyn Store>, blobs: Arc<dyn BlobStore>, locks: Arc<ProjectLocks>) -> Self {
        let resolver = TreeResolver::new(store.clone(), blobs.clone());
        Self {
            store,
            blobs,
            locks,
            resolver,
        }
    }

    pub async fn create_or_update_file(
        &self,
        ctx: &MutationContext,
        path: &str,
        content: Bytes,
    ) -> Result<MutationOutcome> {
        let path = normalize_path(path)?;
        // Held until the snapshot referencing the upload is committed.
        let _gate = self.locks.shared(&ctx.project_id).await;
        let (_, files) = self.prepare(ctx)?;

        let existed = files.iter().any(|f| f.path == path);
        let new_file = SnapshotFile {
            path: path.clone(),
            hash: content_hash(&content),
            size: content.len() as i64,
            mode: DEFAULT_FILE_MODE.to_string(),
        };
        let next = apply_change(&files, &FileChange::Upsert(new_file.clone()))?;

        // Content first: a failed upload must leave the database untouched.
        self.upload(&ctx.project_id, &new_file, content, BlobPolicy::Hard)
            .await?;

        let title = if existed {
            format!("Update file: {path}")
        } else {
            format!("Create file: {path}")
        };
        let snapshot = self.persist(ctx, next, title)?;

        Ok(MutationOutcome {
            snapshot,
            path,
            file: Some(new_file),
        })
    }

    pub async fn create_folder(&self, ctx: &MutationContext, path: &str) -> Result<MutationOutcome> {
        let path = normalize_path(path)?;
        let _gate = self.locks.shared(&ctx.project_id).await;
        let (_, files) = self.prepare(ctx)?;

        let placeholder = SnapshotFile {
            path: format!("{path}/{FOLDER_PLACEHOLDER}"),
            hash: content_hash(b""),
            size: 0,
            mode: DEFAULT_FILE_MODE.to_string(),
        };
        let next = apply_change(&files, &FileChange::Upsert(placeholder.clone()))?;

        self.upload(&ctx.project_id, &placeholder, Bytes::new(), BlobPolicy::Soft)
            .await?;

        let snapshot = self.persist(ctx, next, format!("Create folder: {path}"))?;

        Ok(MutationOutcome {
            snapshot,
            path,
            file: Some(placeholder),
        })
    }

    pub async fn delete_file(&self, ctx: &MutationContext, path: &str) -> Result<MutationOutcome> {
        let path = normalize_path(path)?;
        let files = self.prepare_existing(ctx)?;

        let next = apply_change(&files, &FileChange::RemoveFile(path.clone()))?;
        let snapshot = self.persist(ctx, next, format!("Delete file: {path}"))?;

        Ok(MutationOutcome {
            snapshot,
            path,
            file: None,
        })
    }

    pub async fn delete_folder(&self, ctx: &MutationContext, path: &str) -> Result<MutationOutcome> {
        let path = normalize_path(path)?;
        let files = self.prepare_existing(ctx)?;

        let next = apply_change(&files, &FileChange::RemoveFolder(path.clone()))?;
        let snapshot = self.persist(ctx, next, format!("Delete folder: {path}"))?;

        Ok(MutationOutcome {
            snapshot,
            path,
            file: None,
        })
    }

    /// Validates the context and reads the branch's current file set.
    fn prepare(&self, ctx: &MutationContext) -> Result<(Option<String>, Vec<SnapshotFile>)> {
        validate_branch_name(&ctx.branch)?;
        if ctx.user_id.is_empty() {
            return Err(Error::bad_request("user_id is required"));
        }

        self.store
            .get_project(&ctx.project_id)?
            .ok_or_else(|| Error::not_found("Project not found"))?;
        self.store
            .get_user(&ctx.user_id)?
            .ok_or_else(|| Error::not_found("User not found"))?;

        self.resolver
            .current_files(&ctx.project_id, Some(&ctx.branch))
    }

    fn prepare_existing(&self, ctx: &MutationContext) -> Result<Vec<SnapshotFile>> {
        match self.prepare(ctx)? {
            (Some(_), files) => Ok(files),
            (None, _) => Err(Error::not_found(format!(
                "Branch '{}' has no snapshot",
                ctx.branch
            ))),
        }
    }

    async fn upload(
        &self,
        project_id: &str,
        file: &SnapshotFile,
        content: Bytes,
        policy: BlobPolicy,
    ) -> Result<()> {
        let key = blob_key(project_id, &file.hash);
        let options = UploadOptions {
            content_type: detect_mime(&file.path, Some(content.as_ref())),
            upsert: true,
        };

        match self.blobs.upload(&key, content, options).await {
            Ok(()) => Ok(()),
            Err(e) if policy == BlobPolicy::Soft => {
                tracing::warn!(project_id, path = %file.path, error = %e, "placeholder upload failed, continuing");
                Ok(())
            }
            Err(e) => {
                tracing::error!(project_id, path = %file.path, error = %e, "content upload failed");
                Err(Error::from(e))
            }
        }
    }

    fn persist(&self, ctx: &MutationContext, files: Vec<SnapshotFile>, title: String) -> Result<Snapshot> {
        let snapshot = Snapshot {
            id: Uuid::new_v4().to_string(),
            project_id: ctx.project_id.clone(),
            user_id: Some(ctx.user_id.clone()),
            title: Some(title),
            description: None,
            timestamp: Utc::now().timestamp_millis(),
            file_count: files.len() as i64,
            external_id: None,
            created_at: Utc::now(),
        };

        let commit = SnapshotCommit {
            snapshot: snapshot.clone(),
            files,
            advance: Some(head_advance(&ctx.branch, ctx.expected_head.as_deref())),
        };
        self.store.commit_snapshot(&commit)?;

        tracing::info!(
            project_id = %snapshot.project_id,
            branch = %ctx.branch,
            snapshot_id = %snapshot.id,
            file_count = snapshot.file_count,
            title = snapshot.title.as_deref().unwrap_or_default(),
            "created snapshot"
        );

        Ok(snapshot)
    }
}

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use super::mime::detect_mime;
use crate::blob::{BlobStore, blob_key};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::store::path::{normalize_base_path, normalize_path};
use crate::types::SnapshotFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Dir,
    File,
}

/// A direct child of a directory, synthesized from flat file paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

/// File metadata plus content, if the blob store could produce it.
#[derive(Debug, Clone)]
pub struct BlobView {
    pub file: SnapshotFile,
    pub content: Option<Bytes>,
    pub mime: String,
    pub message: Option<String>,
}

/// Resolves branches to snapshots and reads trees and files from them.
pub struct TreeResolver {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
}

impl TreeResolver {
    pub fn new(store: Arc<dyn Store>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { store, blobs }
    }

    /// The branch head when the branch exists and points somewhere, otherwise
    /// the project's most recent snapshot, otherwise `None`.
    pub fn resolve_snapshot_id(&self, project_id: &str, branch: Option<&str>) -> Result<Option<String>> {
        if let Some(name) = branch.filter(|b| !b.is_empty()) {
            if let Some(head) = self
                .store
                .get_branch(project_id, name)?
                .and_then(|b| b.head_snapshot_id)
            {
                return Ok(Some(head));
            }
        }

        self.store.latest_snapshot_id(project_id)
    }

    /// The resolved snapshot id together with its file rows, sorted by path.
    pub fn current_files(
        &self,
        project_id: &str,
        branch: Option<&str>,
    ) -> Result<(Option<String>, Vec<SnapshotFile>)> {
        match self.resolve_snapshot_id(project_id, branch)? {
            Some(snapshot_id) => {
                let files = self.store.list_snapshot_files(&snapshot_id)?;
                Ok((Some(snapshot_id), files))
            }
            None => Ok((None, Vec::new())),
        }
    }

    pub fn list_tree(
        &self,
        project_id: &str,
        branch: Option<&str>,
        base_path: &str,
    ) -> Result<Vec<TreeEntry>> {
        let base = normalize_base_path(base_path)?;
        let (_, files) = self.current_files(project_id, branch)?;
        Ok(build_tree(&files, &base))
    }

    pub async fn get_blob(&self, project_id: &str, branch: Option<&str>, path: &str) -> Result<BlobView> {
        let path = normalize_path(path)?;

        let snapshot_id = self
            .resolve_snapshot_id(project_id, branch)?
            .ok_or_else(|| Error::not_found("No snapshot found for project"))?;

        let file = self
            .store
            .get_snapshot_file(&snapshot_id, &path)?
            .ok_or_else(|| Error::not_found(format!("File not found: {path}")))?;

        let key = blob_key(project_id, &file.hash);
        match self.blobs.download(&key).await {
            Ok(content) => {
                let mime = detect_mime(&file.path, Some(content.as_ref()));
                Ok(BlobView {
                    file,
                    content: Some(content),
                    mime,
                    message: None,
                })
            }
            Err(e) => {
                tracing::warn!(project_id, path = %file.path, key = %key, error = %e, "blob content unavailable");
                let mime = detect_mime(&file.path, None);
                Ok(BlobView {
                    file,
                    content: None,
                    mime,
                    message: Some(format!("File content is unavailable: {e}")),
                })
            }
        }
    }
}

/// Lists the direct children of `base` (already normalized, empty for the root).
///
/// Directories are implied by descendant paths and appear once each.
/// Directories sort before files; each group sorts by name.
pub fn build_tree(files: &[SnapshotFile], base: &str) -> Vec<TreeEntry> {
    let prefix = if base.is_empty() {
        String::new()
    } else {
        format!("{base}/")
    };

    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for file in files {
        let Some(rest) = file.path.strip_prefix(prefix.as_str()) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }

        let entry = match rest.split_once('/') {
            None => TreeEntry {
                name: rest.to_string(),
                path: file.path.clone(),
                kind: EntryKind::File,
                size: Some(file.size),
            },
            Some((dir, _)) => TreeEntry {
                name: dir.to_string(),
                path: format!("{prefix}{dir}"),
                kind: EntryKind::Dir,
                size: None,
            },
        };

        if seen.insert(entry.name.clone()) {
            entries.push(entry);
        }
    }

    entries.sort_by(|a, b| match (a.kind, b.kind) {
        (EntryKind::Dir, EntryKind::File) => std::cmp::Ordering::Less,
        (EntryKind::File, EntryKind::Dir) => std::cmp::Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });

    entries
}

use serde::{Deserialize, Serialize};

use crate::snapshot::TreeEntry;
use crate::types::SnapshotFile;

#[derive(Debug, Default, Deserialize)]
pub struct TreeParams {
    pub branch: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BlobParams {
    pub branch: Option<String>,
    pub path: Option<String>,
}

/// Request to create or overwrite a single file
#[derive(Debug, Default, Deserialize)]
pub struct PutFileRequest {
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub path: String,
    /// Base64 encoded; an empty string is an empty file.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub expected_head: Option<String>,
}

/// Request body shared by folder creation and both delete operations
#[derive(Debug, Default, Deserialize)]
pub struct PathRequest {
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub expected_head: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TreeResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    pub path: String,
    pub entries: Vec<TreeEntry>,
}

#[derive(Debug, Serialize)]
pub struct BlobResponse {
    pub path: String,
    pub hash: String,
    pub size: i64,
    pub mode: String,
    /// Base64 encoded, null when the blob store could not deliver it.
    pub content: Option<String>,
    pub mime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NewFileResponse {
    pub snapshot_id: String,
    pub new_file: SnapshotFile,
}

#[derive(Debug, Serialize)]
pub struct NewFolderResponse {
    pub snapshot_id: String,
    pub new_folder: String,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub snapshot_id: String,
    pub deleted_path: String,
}

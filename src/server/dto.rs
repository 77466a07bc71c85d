use serde::Deserialize;

use crate::types::Visibility;

// Required string fields default to empty so handlers can answer 400 with
// the field name instead of the extractor's 422.

#[derive(Debug, Default, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FindUserParams {
    pub external_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateProjectRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProjectRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListProjectsParams {
    pub owner_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateBranchRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub snapshot_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MoveBranchRequest {
    #[serde(default)]
    pub snapshot_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateTagRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub snapshot_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSnapshotRequest {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub user_id: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub files: Vec<SnapshotFileRequest>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotFileRequest {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub mode: Option<String>,
    /// Base64 encoded file content.
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListSnapshotsParams {
    pub project_id: Option<String>,
    pub user_id: Option<String>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Visibility;

/// Mode recorded for regular files created through the content API.
pub const DEFAULT_FILE_MODE: &str = "100644";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStats {
    pub snapshot_count: i64,
    pub file_count: i64,
    pub total_size_bytes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_snapshot_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub visibility: Visibility,
    pub stats: ProjectStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable point-in-time file set of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub file_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One file record of a snapshot. Paths are unique within a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub path: String,
    pub hash: String,
    pub size: i64,
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotWithFiles {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub files: Vec<SnapshotFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub project_id: String,
    pub name: String,
    pub head_snapshot_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub project_id: String,
    pub name: String,
    pub snapshot_id: String,
    pub created_at: DateTime<Utc>,
}

/// Branch pointer update carried by a snapshot commit.
#[derive(Debug, Clone)]
pub struct HeadAdvance {
    pub branch: String,
    /// When set, the commit only applies if the branch head still equals this id.
    pub expected_head: Option<String>,
}

/// Everything a single snapshot-creating transaction writes.
#[derive(Debug, Clone)]
pub struct SnapshotCommit {
    pub snapshot: Snapshot,
    pub files: Vec<SnapshotFile>,
    pub advance: Option<HeadAdvance>,
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotFilter {
    pub project_id: Option<String>,
    pub user_id: Option<String>,
}

pub mod path;
mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the relational database interface.
///
/// Every method that writes more than one row runs inside a single
/// transaction; an error on any statement leaves the database unchanged.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<User>>;

    // Project operations
    fn create_project(&self, project: &Project) -> Result<()>;
    fn get_project(&self, id: &str) -> Result<Option<Project>>;
    fn list_projects(&self, owner_id: Option<&str>) -> Result<Vec<Project>>;
    fn update_project(&self, project: &Project) -> Result<()>;
    fn delete_project(&self, id: &str) -> Result<bool>;
    /// Distinct content hashes referenced by any snapshot of the project.
    fn list_project_hashes(&self, project_id: &str) -> Result<Vec<String>>;

    // Snapshot operations
    /// Writes the snapshot row, its file rows, the optional branch head
    /// advance and the project stats in one transaction.
    fn commit_snapshot(&self, commit: &SnapshotCommit) -> Result<()>;
    fn get_snapshot(&self, id: &str) -> Result<Option<Snapshot>>;
    fn list_snapshots(&self, filter: &SnapshotFilter) -> Result<Vec<Snapshot>>;
    fn list_snapshot_files(&self, snapshot_id: &str) -> Result<Vec<SnapshotFile>>;
    fn get_snapshot_file(&self, snapshot_id: &str, path: &str) -> Result<Option<SnapshotFile>>;
    fn latest_snapshot_id(&self, project_id: &str) -> Result<Option<String>>;
    fn delete_snapshot(&self, id: &str) -> Result<bool>;

    // Branch operations
    fn get_branch(&self, project_id: &str, name: &str) -> Result<Option<Branch>>;
    fn list_branches(&self, project_id: &str) -> Result<Vec<Branch>>;
    /// Creates `name` pointing at the latest snapshot if the project has no
    /// branches at all, then returns every branch of the project.
    fn ensure_default_branch(&self, project_id: &str, name: &str) -> Result<Vec<Branch>>;
    fn create_branch(&self, branch: &Branch) -> Result<()>;
    fn advance_head(&self, project_id: &str, name: &str, snapshot_id: &str) -> Result<()>;

    // Tag operations
    fn create_tag(&self, tag: &Tag) -> Result<()>;
    fn list_tags(&self, project_id: &str) -> Result<Vec<Tag>>;
}

use std::sync::Arc;

use chrono::Utc;

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Branch, HeadAdvance};

/// Branch every project logically has.
pub const DEFAULT_BRANCH: &str = "main";

const MAX_BRANCH_NAME_LEN: usize = 100;

/// Owns the name → head pointer of each branch.
pub struct BranchHeads {
    store: Arc<dyn Store>,
}

impl BranchHeads {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Lists the project's branches, lazily creating the default branch at
    /// the most recent snapshot when none exist yet.
    pub fn ensure_branches(&self, project_id: &str) -> Result<Vec<Branch>> {
        self.store.ensure_default_branch(project_id, DEFAULT_BRANCH)
    }

    /// Unconditionally repoints an existing branch. Last writer wins.
    pub fn advance_head(&self, project_id: &str, branch: &str, snapshot_id: &str) -> Result<()> {
        self.store.advance_head(project_id, branch, snapshot_id)?;
        tracing::info!(project_id, branch, snapshot_id, "advanced branch head");
        Ok(())
    }

    /// Creates a branch at `from_snapshot`, or at whatever the default branch
    /// currently resolves to.
    pub fn create_branch(
        &self,
        project_id: &str,
        name: &str,
        from_snapshot: Option<&str>,
    ) -> Result<Branch> {
        validate_branch_name(name)?;

        let head = match from_snapshot {
            Some(snapshot_id) => {
                let snapshot = self
                    .store
                    .get_snapshot(snapshot_id)?
                    .filter(|s| s.project_id == project_id)
                    .ok_or_else(|| Error::not_found(format!("Snapshot not found: {snapshot_id}")))?;
                Some(snapshot.id)
            }
            None => {
                let default_head = self
                    .store
                    .get_branch(project_id, DEFAULT_BRANCH)?
                    .and_then(|b| b.head_snapshot_id);
                match default_head {
                    Some(id) => Some(id),
                    None => self.store.latest_snapshot_id(project_id)?,
                }
            }
        };

        let now = Utc::now();
        let branch = Branch {
            project_id: project_id.to_string(),
            name: name.to_string(),
            head_snapshot_id: head,
            created_at: now,
            updated_at: now,
        };
        self.store.create_branch(&branch)?;

        Ok(branch)
    }
}

/// The head update a mutation folds into its snapshot transaction.
#[must_use]
pub fn head_advance(branch: &str, expected_head: Option<&str>) -> HeadAdvance {
    HeadAdvance {
        branch: branch.to_string(),
        expected_head: expected_head.map(str::to_string),
    }
}

pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::bad_request("Branch name cannot be empty"));
    }
    if name.len() > MAX_BRANCH_NAME_LEN {
        return Err(Error::bad_request(format!(
            "Branch name cannot exceed {MAX_BRANCH_NAME_LEN} characters"
        )));
    }
    if name.starts_with('/') || name.ends_with('/') || name.contains("//") || name.contains("..") {
        return Err(Error::bad_request("Branch name is not a valid ref name"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
    {
        return Err(Error::bad_request(
            "Branch name can only contain alphanumeric characters, '-', '_', '.', and '/'",
        ));
    }
    Ok(())
}

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Per-project gate between blob writers and blob cleanup.
///
/// An upload and the commit that references it run under the shared side,
/// so writers never wait on each other. Cleanup takes the exclusive side:
/// while it decides which hashes are unreferenced, no uploaded-but-uncommitted
/// content can exist in the project.
#[derive(Default)]
pub struct ProjectLocks {
    projects: RwLock<HashMap<String, Arc<RwLock<()>>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn shared(&self, project_id: &str) -> OwnedRwLockReadGuard<()> {
        self.lock_for(project_id).await.read_owned().await
    }

    pub async fn exclusive(&self, project_id: &str) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(project_id).await.write_owned().await
    }

    /// Drops the gate of a deleted project.
    pub async fn forget(&self, project_id: &str) {
        self.projects.write().await.remove(project_id);
    }

    async fn lock_for(&self, project_id: &str) -> Arc<RwLock<()>> {
        if let Some(lock) = self.projects.read().await.get(project_id) {
            return lock.clone();
        }

        self.projects
            .write()
            .await
            .entry(project_id.to_string())
            .or_default()
            .clone()
    }
}

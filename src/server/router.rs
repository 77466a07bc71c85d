use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::content::content_router;
use super::{projects, refs, snapshots, users};
use crate::blob::BlobStore;
use crate::config::ServerConfig;
use crate::snapshot::{BranchHeads, ProjectLocks, SnapshotCatalog, SnapshotMutator, TreeResolver};
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub blobs: Arc<dyn BlobStore>,
    pub config: ServerConfig,
    pub locks: Arc<ProjectLocks>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, blobs: Arc<dyn BlobStore>, config: ServerConfig) -> Self {
        Self {
            store,
            blobs,
            config,
            locks: Arc::new(ProjectLocks::new()),
        }
    }

    pub fn resolver(&self) -> TreeResolver {
        TreeResolver::new(self.store.clone(), self.blobs.clone())
    }

    pub fn mutator(&self) -> SnapshotMutator {
        SnapshotMutator::new(self.store.clone(), self.blobs.clone(), self.locks.clone())
    }

    pub fn catalog(&self) -> SnapshotCatalog {
        SnapshotCatalog::new(self.store.clone(), self.blobs.clone(), self.locks.clone())
    }

    pub fn branches(&self) -> BranchHeads {
        BranchHeads::new(self.store.clone())
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_body_bytes;

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", users::users_router())
        .nest("/api/v1", projects::projects_router())
        .nest("/api/v1", refs::refs_router())
        .nest("/api/v1", snapshots::snapshots_router())
        .nest("/api/v1", content_router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

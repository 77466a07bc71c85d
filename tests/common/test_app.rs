use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use chrono::Utc;
use serde_json::Value;
use snapvault::blob::MemoryBlobStore;
use snapvault::config::ServerConfig;
use snapvault::server::{AppState, create_router};
use snapvault::snapshot::{MutationContext, SnapshotCatalog, SnapshotMutator, TreeResolver};
use snapvault::store::{SqliteStore, Store};
use snapvault::types::{Project, ProjectStats, User, Visibility};
use tower::ServiceExt;
use uuid::Uuid;

/// The full application over an in-memory database and blob store.
pub struct TestApp {
    pub store: Arc<SqliteStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub state: Arc<AppState>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(SqliteStore::in_memory().expect("open store"));
        store.initialize().expect("initialize store");
        let blobs = Arc::new(MemoryBlobStore::new());

        let state = Arc::new(AppState::new(
            store.clone(),
            blobs.clone(),
            ServerConfig::default(),
        ));

        Self {
            store,
            blobs,
            state,
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    pub fn mutator(&self) -> SnapshotMutator {
        self.state.mutator()
    }

    pub fn resolver(&self) -> TreeResolver {
        self.state.resolver()
    }

    pub fn catalog(&self) -> SnapshotCatalog {
        self.state.catalog()
    }

    pub fn seed_user(&self, external_id: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            external_id: external_id.to_string(),
            display_name: None,
            email: None,
            created_at: now,
            updated_at: now,
        };
        self.store.create_user(&user).expect("create user");
        user
    }

    pub fn seed_project(&self, owner: &User, name: &str) -> Project {
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4().to_string(),
            owner_id: owner.id.clone(),
            name: name.to_string(),
            description: None,
            visibility: Visibility::Private,
            stats: ProjectStats::default(),
            created_at: now,
            updated_at: now,
        };
        self.store.create_project(&project).expect("create project");
        project
    }

    /// A user and an empty project owned by them.
    pub fn seed(&self) -> (User, Project) {
        let user = self.seed_user(&format!("ext-{}", Uuid::new_v4()));
        let project = self.seed_project(&user, "demo");
        (user, project)
    }

    pub fn ctx(&self, project: &Project, user: &User, branch: &str) -> MutationContext {
        MutationContext {
            project_id: project.id.clone(),
            branch: branch.to_string(),
            user_id: user.id.clone(),
            expected_head: None,
        }
    }

    pub fn head(&self, project: &Project, branch: &str) -> Option<String> {
        self.store
            .get_branch(&project.id, branch)
            .expect("get branch")
            .and_then(|b| b.head_snapshot_id)
    }

    /// Sends one request through the router and returns status plus JSON body
    /// (`Value::Null` for empty bodies).
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("send request");

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, body).await
    }
}

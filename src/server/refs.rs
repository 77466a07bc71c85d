use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
};
use chrono::Utc;

use crate::server::AppState;
use crate::server::dto::{CreateBranchRequest, CreateTagRequest, MoveBranchRequest};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::require_fields;
use crate::snapshot::branches::validate_branch_name;
use crate::types::Tag;

pub fn refs_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/projects/{id}/branches",
            get(list_branches).post(create_branch),
        )
        .route("/projects/{id}/branches/{name}", patch(move_branch))
        .route("/projects/{id}/tags", get(list_tags).post(create_tag))
}

fn require_project(state: &AppState, id: &str) -> Result<(), ApiError> {
    state
        .store
        .get_project(id)
        .api_err("Failed to get project")?
        .or_not_found("Project not found")?;
    Ok(())
}

async fn list_branches(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_project(&state, &id)?;

    let branches = state
        .branches()
        .ensure_branches(&id)
        .api_err("Failed to list branches")?;

    Ok(Json(ApiResponse::success(branches)))
}

async fn create_branch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateBranchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_fields(&[("name", req.name.as_str())])?;
    require_project(&state, &id)?;

    let branch = state
        .branches()
        .create_branch(&id, &req.name, req.snapshot_id.as_deref().filter(|s| !s.is_empty()))
        .api_err("Failed to create branch")?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(branch))))
}

/// Repoints an existing branch at any snapshot of the project. Last writer wins.
async fn move_branch(
    State(state): State<Arc<AppState>>,
    Path((id, name)): Path<(String, String)>,
    Json(req): Json<MoveBranchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_fields(&[("snapshot_id", req.snapshot_id.as_str())])?;
    require_project(&state, &id)?;

    state
        .store
        .get_snapshot(&req.snapshot_id)
        .api_err("Failed to get snapshot")?
        .filter(|s| s.project_id == id)
        .or_not_found("Snapshot not found")?;

    state
        .branches()
        .advance_head(&id, &name, &req.snapshot_id)
        .api_err("Failed to move branch")?;

    let branch = state
        .store
        .get_branch(&id, &name)
        .api_err("Failed to get branch")?
        .or_not_found("Branch not found")?;

    Ok(Json(ApiResponse::success(branch)))
}

async fn list_tags(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_project(&state, &id)?;

    let tags = state.store.list_tags(&id).api_err("Failed to list tags")?;
    Ok(Json(ApiResponse::success(tags)))
}

async fn create_tag(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateTagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_fields(&[("name", req.name.as_str()), ("snapshot_id", req.snapshot_id.as_str())])?;
    validate_branch_name(&req.name).map_err(|_| ApiError::bad_request("Invalid tag name"))?;
    require_project(&state, &id)?;

    let snapshot = state
        .store
        .get_snapshot(&req.snapshot_id)
        .api_err("Failed to get snapshot")?
        .filter(|s| s.project_id == id)
        .or_not_found("Snapshot not found")?;

    let tag = Tag {
        project_id: id,
        name: req.name,
        snapshot_id: snapshot.id,
        created_at: Utc::now(),
    };
    state.store.create_tag(&tag).api_err("Failed to create tag")?;
    tracing::info!(project_id = %tag.project_id, tag = %tag.name, snapshot_id = %tag.snapshot_id, "created tag");

    Ok((StatusCode::CREATED, Json(ApiResponse::success(tag))))
}

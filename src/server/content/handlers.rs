use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::server::AppState;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::{decode_base64, require_fields};
use crate::snapshot::MutationContext;
use crate::store::path::normalize_base_path;

use super::dto::{
    BlobParams, BlobResponse, DeletedResponse, NewFileResponse, NewFolderResponse, PathRequest,
    PutFileRequest, TreeParams, TreeResponse,
};

fn require_project(state: &AppState, id: &str) -> Result<(), ApiError> {
    state
        .store
        .get_project(id)
        .api_err("Failed to get project")?
        .or_not_found("Project not found")?;
    Ok(())
}

fn mutation_context(
    project_id: String,
    branch: String,
    user_id: String,
    expected_head: Option<String>,
) -> MutationContext {
    MutationContext {
        project_id,
        branch,
        user_id,
        expected_head: expected_head.filter(|h| !h.is_empty()),
    }
}

pub async fn get_tree(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<TreeParams>,
) -> Result<impl IntoResponse, ApiError> {
    require_project(&state, &id)?;

    let branch = params.branch.as_deref().filter(|b| !b.is_empty());
    let base = normalize_base_path(params.path.as_deref().unwrap_or(""))?;

    let resolver = state.resolver();
    let snapshot_id = resolver
        .resolve_snapshot_id(&id, branch)
        .api_err("Failed to resolve snapshot")?;
    let entries = resolver
        .list_tree(&id, branch, &base)
        .api_err("Failed to list tree")?;

    Ok(Json(ApiResponse::success(TreeResponse {
        snapshot_id,
        path: base,
        entries,
    })))
}

pub async fn get_blob(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<BlobParams>,
) -> Result<impl IntoResponse, ApiError> {
    let path = params.path.unwrap_or_default();
    require_fields(&[("path", path.as_str())])?;
    require_project(&state, &id)?;

    let branch = params.branch.as_deref().filter(|b| !b.is_empty());
    let view = state
        .resolver()
        .get_blob(&id, branch, &path)
        .await
        .api_err("Failed to get file")?;

    Ok(Json(ApiResponse::success(BlobResponse {
        path: view.file.path,
        hash: view.file.hash,
        size: view.file.size,
        mode: view.file.mode,
        content: view.content.map(|c| STANDARD.encode(c)),
        mime: view.mime,
        message: view.message,
    })))
}

pub async fn put_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PutFileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_fields(&[
        ("branch", req.branch.as_str()),
        ("path", req.path.as_str()),
        ("user_id", req.user_id.as_str()),
    ])?;
    let encoded = req
        .content
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("content is required"))?;
    let content = decode_base64("content", encoded)?;

    let ctx = mutation_context(id, req.branch, req.user_id, req.expected_head);
    let outcome = state
        .mutator()
        .create_or_update_file(&ctx, &req.path, content)
        .await
        .api_err("Failed to write file")?;

    let new_file = outcome
        .file
        .ok_or_else(|| ApiError::internal("Failed to write file"))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(NewFileResponse {
            snapshot_id: outcome.snapshot.id,
            new_file,
        })),
    ))
}

pub async fn create_folder(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PathRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (ctx, path) = validated_context(id, req)?;

    let outcome = state
        .mutator()
        .create_folder(&ctx, &path)
        .await
        .api_err("Failed to create folder")?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(NewFolderResponse {
            snapshot_id: outcome.snapshot.id,
            new_folder: outcome.path,
        })),
    ))
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PathRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (ctx, path) = validated_context(id, req)?;

    let outcome = state
        .mutator()
        .delete_file(&ctx, &path)
        .await
        .api_err("Failed to delete file")?;

    Ok(Json(ApiResponse::success(DeletedResponse {
        snapshot_id: outcome.snapshot.id,
        deleted_path: outcome.path,
    })))
}

pub async fn delete_folder(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PathRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (ctx, path) = validated_context(id, req)?;

    let outcome = state
        .mutator()
        .delete_folder(&ctx, &path)
        .await
        .api_err("Failed to delete folder")?;

    Ok(Json(ApiResponse::success(DeletedResponse {
        snapshot_id: outcome.snapshot.id,
        deleted_path: outcome.path,
    })))
}

fn validated_context(id: String, req: PathRequest) -> Result<(MutationContext, String), ApiError> {
    require_fields(&[
        ("branch", req.branch.as_str()),
        ("path", req.path.as_str()),
        ("user_id", req.user_id.as_str()),
    ])?;

    let ctx = mutation_context(id, req.branch, req.user_id, req.expected_head);
    Ok((ctx, req.path))
}

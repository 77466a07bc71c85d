use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use crate::server::AppState;
use crate::server::dto::{CreateSnapshotRequest, ListSnapshotsParams};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::validation::{decode_base64, require_fields};
use crate::snapshot::{NewSnapshot, NewSnapshotFile};
use crate::types::SnapshotFilter;

pub fn snapshots_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/snapshots", get(list_snapshots).post(create_snapshot))
        .route(
            "/snapshots/{id}",
            get(get_snapshot).delete(delete_snapshot),
        )
}

async fn create_snapshot(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSnapshotRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_fields(&[("project_id", req.project_id.as_str()), ("user_id", req.user_id.as_str())])?;

    let mut files = Vec::with_capacity(req.files.len());
    for file in req.files {
        require_fields(&[("files[].path", file.path.as_str()), ("files[].hash", file.hash.as_str())])?;
        let content = match file.content.as_deref() {
            Some(encoded) => Some(decode_base64("files[].content", encoded)?),
            None => None,
        };
        files.push(NewSnapshotFile {
            path: file.path,
            hash: file.hash,
            size: file.size,
            mode: file.mode,
            content,
        });
    }

    let request = NewSnapshot {
        project_id: req.project_id,
        user_id: req.user_id,
        timestamp: req.timestamp,
        title: req.title,
        description: req.description,
        external_id: req.external_id,
        branch: req.branch.filter(|b| !b.is_empty()),
        files,
    };

    let created = state
        .catalog()
        .create(request)
        .await
        .api_err("Failed to create snapshot")?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

async fn list_snapshots(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListSnapshotsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = SnapshotFilter {
        project_id: params.project_id.filter(|s| !s.is_empty()),
        user_id: params.user_id.filter(|s| !s.is_empty()),
    };

    let snapshots = state
        .catalog()
        .list(&filter)
        .api_err("Failed to list snapshots")?;

    Ok(Json(ApiResponse::success(snapshots)))
}

async fn get_snapshot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state
        .catalog()
        .get(&id)
        .api_err("Failed to get snapshot")?;

    Ok(Json(ApiResponse::success(snapshot)))
}

async fn delete_snapshot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .catalog()
        .delete(&id)
        .await
        .api_err("Failed to delete snapshot")?;

    Ok(StatusCode::NO_CONTENT)
}

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use uuid::Uuid;

use crate::server::AppState;
use crate::server::dto::{CreateUserRequest, FindUserParams};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::validate_external_id;
use crate::types::User;

pub fn users_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(find_user).post(create_user))
        .route("/users/{id}", get(get_user))
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_external_id(&req.external_id)?;

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        external_id: req.external_id,
        display_name: req.display_name.filter(|s| !s.is_empty()),
        email: req.email.filter(|s| !s.is_empty()),
        created_at: now,
        updated_at: now,
    };

    state.store.create_user(&user).api_err("Failed to create user")?;
    tracing::info!(user_id = %user.id, "created user");

    Ok((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .store
        .get_user(&id)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    Ok(Json(ApiResponse::success(user)))
}

async fn find_user(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FindUserParams>,
) -> Result<impl IntoResponse, ApiError> {
    let external_id = params
        .external_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("external_id query parameter is required"))?;

    let user = state
        .store
        .get_user_by_external_id(&external_id)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    Ok(Json(ApiResponse::success(user)))
}

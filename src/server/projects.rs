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
use crate::server::dto::{CreateProjectRequest, ListProjectsParams, UpdateProjectRequest};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::{require_fields, validate_project_name};
use crate::types::{Project, ProjectStats};

pub fn projects_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/{id}",
            get(get_project).patch(update_project).delete(delete_project),
        )
}

async fn list_projects(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListProjectsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = params.owner_id.as_deref().filter(|s| !s.is_empty());
    let projects = state
        .store
        .list_projects(owner)
        .api_err("Failed to list projects")?;

    Ok(Json(ApiResponse::success(projects)))
}

async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_fields(&[("name", req.name.as_str()), ("owner_id", req.owner_id.as_str())])?;
    validate_project_name(&req.name)?;

    state
        .store
        .get_user(&req.owner_id)
        .api_err("Failed to get user")?
        .or_not_found("Owner not found")?;

    let now = Utc::now();
    let project = Project {
        id: Uuid::new_v4().to_string(),
        owner_id: req.owner_id,
        name: req.name,
        description: req.description,
        visibility: req.visibility.unwrap_or_default(),
        stats: ProjectStats::default(),
        created_at: now,
        updated_at: now,
    };

    state
        .store
        .create_project(&project)
        .api_err("Failed to create project")?;
    tracing::info!(project_id = %project.id, name = %project.name, "created project");

    Ok((StatusCode::CREATED, Json(ApiResponse::success(project))))
}

async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state
        .store
        .get_project(&id)
        .api_err("Failed to get project")?
        .or_not_found("Project not found")?;

    Ok(Json(ApiResponse::success(project)))
}

async fn update_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut project = state
        .store
        .get_project(&id)
        .api_err("Failed to get project")?
        .or_not_found("Project not found")?;

    if let Some(name) = req.name {
        validate_project_name(&name)?;
        project.name = name;
    }
    if let Some(description) = req.description {
        project.description = Some(description).filter(|d| !d.is_empty());
    }
    if let Some(visibility) = req.visibility {
        project.visibility = visibility;
    }

    state
        .store
        .update_project(&project)
        .api_err("Failed to update project")?;

    let project = state
        .store
        .get_project(&id)
        .api_err("Failed to get project")?
        .or_not_found("Project not found")?;

    Ok(Json(ApiResponse::success(project)))
}

async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .catalog()
        .delete_project(&id)
        .await
        .api_err("Failed to delete project")?;

    Ok(StatusCode::NO_CONTENT)
}

mod dto;
mod handlers;

use std::sync::Arc;

use axum::{Router, routing::{get, post}};

use crate::server::AppState;

pub fn content_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/projects/{id}/tree", get(handlers::get_tree))
        .route("/projects/{id}/blob", get(handlers::get_blob))
        .route(
            "/projects/{id}/files",
            post(handlers::put_file).delete(handlers::delete_file),
        )
        .route(
            "/projects/{id}/folders",
            post(handlers::create_folder).delete(handlers::delete_folder),
        )
}

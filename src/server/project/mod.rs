mod entities;
mod projects;
mod sharing;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
};

use crate::server::AppState;

/// Largest accepted upload body.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub fn project_router() -> Router<Arc<AppState>> {
    Router::new()
        // Projects
        .route("/projects", get(projects::list_projects))
        .route("/projects", post(projects::create_project))
        .route("/projects/{id}", get(projects::get_project))
        .route("/projects/{id}", delete(projects::delete_project))
        .route("/projects/{id}/restore", post(projects::restore_project))
        .route("/projects/{id}/flags", put(projects::set_member_flags))
        .route("/projects/{id}/root-doc", put(projects::set_root_doc))
        // Sharing
        .route("/projects/{id}/authorization", get(sharing::authorization))
        .route("/projects/{id}/members", get(sharing::list_members))
        .route("/projects/{id}/members", post(sharing::add_member))
        .route(
            "/projects/{id}/members/{user_id}",
            delete(sharing::remove_member),
        )
        .route("/projects/{id}/owner", post(sharing::transfer_ownership))
        .route(
            "/projects/{id}/public-access",
            put(sharing::set_public_access),
        )
        .route("/projects/{id}/tokens", get(sharing::access_tokens))
        .route("/tokens/{token}/join", post(sharing::join_by_token))
        // Tree reads
        .route("/projects/{id}/tree", get(entities::get_tree))
        .route("/projects/{id}/tree/lookup", get(entities::lookup))
        .route("/projects/{id}/deleted-docs", get(entities::list_deleted_docs))
        // Entity creation
        .route("/projects/{id}/folders", post(entities::create_folder))
        .route("/projects/{id}/docs", post(entities::create_doc))
        .route("/projects/{id}/docs", put(entities::ensure_doc))
        .route(
            "/projects/{id}/files",
            post(entities::upload_file).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        // Folders
        .route(
            "/projects/{id}/folders/{entity_id}",
            delete(entities::delete_folder),
        )
        .route(
            "/projects/{id}/folders/{entity_id}/move",
            post(entities::move_folder),
        )
        .route(
            "/projects/{id}/folders/{entity_id}/rename",
            post(entities::rename_folder),
        )
        // Docs
        .route(
            "/projects/{id}/docs/{entity_id}",
            delete(entities::delete_doc),
        )
        .route(
            "/projects/{id}/docs/{entity_id}/move",
            post(entities::move_doc),
        )
        .route(
            "/projects/{id}/docs/{entity_id}/rename",
            post(entities::rename_doc),
        )
        .route(
            "/projects/{id}/docs/{entity_id}/restore",
            post(entities::restore_doc),
        )
        // Files
        .route(
            "/projects/{id}/files/{entity_id}",
            get(entities::download_file),
        )
        .route(
            "/projects/{id}/files/{entity_id}",
            delete(entities::delete_file),
        )
        .route(
            "/projects/{id}/files/{entity_id}/move",
            post(entities::move_file),
        )
        .route(
            "/projects/{id}/files/{entity_id}/rename",
            post(entities::rename_file),
        )
}

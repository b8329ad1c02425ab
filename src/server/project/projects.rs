use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::server::AppState;
use crate::server::dto::{
    CreateProjectRequest, MemberFlagsRequest, ProjectListItem, ProjectWithAccess, RootDocRequest,
};
use crate::server::extract::{RequireUser, Viewer};
use crate::server::response::{ApiError, ApiResponse};
use crate::types::NewProject;

pub async fn list_projects(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let projects: Vec<ProjectListItem> = state
        .tree
        .list_projects(&auth.user_id)?
        .into_iter()
        .map(ProjectListItem::from)
        .collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(projects)))
}

pub async fn create_project(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> impl IntoResponse {
    let project = state.tree.create_project(&NewProject {
        name: req.name,
        owner_id: auth.user_id,
        compiler: req.compiler.unwrap_or_else(|| "pdflatex".to_string()),
        image_name: req.image_name,
    })?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(project))))
}

pub async fn get_project(
    viewer: Viewer,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (project, access) = state
        .tree
        .open_project(&id, viewer.user(), viewer.token())?;

    Ok::<_, ApiError>(Json(ApiResponse::success(ProjectWithAccess { project, access })))
}

pub async fn delete_project(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.tree.soft_delete_project(&id, &auth.user_id)?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn restore_project(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.tree.restore_project(&id, &auth.user_id)?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn set_member_flags(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<MemberFlagsRequest>,
) -> impl IntoResponse {
    state
        .tree
        .set_member_flags(&id, &auth.user_id, req.archived, req.trashed)?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn set_root_doc(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RootDocRequest>,
) -> impl IntoResponse {
    state.tree.set_root_doc(&id, &auth.user_id, &req.doc_id)?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

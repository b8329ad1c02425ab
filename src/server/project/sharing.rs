use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::server::AppState;
use crate::server::dto::{
    AddMemberRequest, EpochResponse, ProjectWithAccess, PublicAccessRequest,
    TransferOwnershipRequest,
};
use crate::server::extract::{RequireUser, Viewer};
use crate::server::response::{ApiError, ApiResponse};

pub async fn authorization(
    viewer: Viewer,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let auth = state.tree.authorize(&id, viewer.user(), viewer.token())?;
    Ok::<_, ApiError>(Json(ApiResponse::success(auth)))
}

pub async fn list_members(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let members = state.tree.list_members(&id, &auth.user_id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(members)))
}

pub async fn add_member(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> impl IntoResponse {
    let epoch = state
        .tree
        .add_member(&id, &auth.user_id, &req.user_id, req.privilege_level)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(EpochResponse { epoch })))
}

pub async fn remove_member(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, user_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let epoch = state.tree.remove_member(&id, &auth.user_id, &user_id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(EpochResponse { epoch })))
}

pub async fn transfer_ownership(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<TransferOwnershipRequest>,
) -> impl IntoResponse {
    let epoch = state
        .tree
        .transfer_ownership(&id, &auth.user_id, &req.user_id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(EpochResponse { epoch })))
}

pub async fn set_public_access(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PublicAccessRequest>,
) -> impl IntoResponse {
    let epoch = state
        .tree
        .set_public_access_level(&id, &auth.user_id, req.public_access_level)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(EpochResponse { epoch })))
}

pub async fn access_tokens(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let tokens = state.tree.ensure_access_tokens(&id, &auth.user_id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(tokens)))
}

pub async fn join_by_token(
    viewer: Viewer,
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    let (project, access) = state.tree.join_by_token(viewer.user(), &token)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(ProjectWithAccess { project, access })))
}

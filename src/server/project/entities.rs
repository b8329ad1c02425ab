use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};

use crate::server::AppState;
use crate::server::dto::{
    CreateDocRequest, CreateFolderRequest, LookupParams, MoveRequest, RenameRequest,
    RestoreDocRequest, UploadFileParams,
};
use crate::server::extract::{RequireUser, Viewer};
use crate::server::response::{ApiError, ApiResponse};
use crate::types::NodeKind;

pub async fn get_tree(
    viewer: Viewer,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let entries = state
        .tree
        .get_project_tree(&id, viewer.user(), viewer.token())?;
    Ok::<_, ApiError>(Json(ApiResponse::success(entries)))
}

pub async fn lookup(
    viewer: Viewer,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<LookupParams>,
) -> impl IntoResponse {
    let entry = state
        .tree
        .find_entry_by_path(&id, viewer.user(), viewer.token(), &params.path)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(entry)))
}

pub async fn list_deleted_docs(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let docs = state.tree.list_deleted_docs(&id, &auth.user_id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(docs)))
}

pub async fn create_folder(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateFolderRequest>,
) -> impl IntoResponse {
    let created = state
        .tree
        .add_folder(&id, &auth.user_id, &req.parent_id, &req.name)?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

pub async fn create_doc(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateDocRequest>,
) -> impl IntoResponse {
    let created = state
        .tree
        .create_doc(&id, &auth.user_id, &req.parent_id, &req.name, &req.snapshot)?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

pub async fn ensure_doc(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateDocRequest>,
) -> impl IntoResponse {
    let ensured = state
        .tree
        .ensure_is_doc(&id, &auth.user_id, &req.parent_id, &req.name, &req.snapshot)?;
    let status = if ensured.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok::<_, ApiError>((status, Json(ApiResponse::success(ensured))))
}

pub async fn upload_file(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<UploadFileParams>,
    body: Bytes,
) -> impl IntoResponse {
    let finalized = state
        .tree
        .upload_file(&id, &auth.user_id, &params.parent_id, &params.name, body, None)
        .await?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(finalized))))
}

pub async fn download_file(
    viewer: Viewer,
    State(state): State<Arc<AppState>>,
    Path((id, file_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let (_meta, data) = state
        .tree
        .read_file(&id, viewer.user(), viewer.token(), &file_id)
        .await?;
    Ok::<_, ApiError>(([(header::CONTENT_TYPE, "application/octet-stream")], data))
}

pub async fn restore_doc(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, doc_id)): Path<(String, String)>,
    req: Option<Json<RestoreDocRequest>>,
) -> impl IntoResponse {
    let name = req.and_then(|Json(r)| r.name);
    let restored = state
        .tree
        .restore_doc(&id, &auth.user_id, &doc_id, name.as_deref())?;
    Ok::<_, ApiError>(Json(ApiResponse::success(restored)))
}

fn delete_entity(
    state: &AppState,
    user_id: &str,
    kind: NodeKind,
    (id, entity_id): (String, String),
) -> Result<impl IntoResponse + use<>, ApiError> {
    let deleted = state.tree.delete_entity(&id, user_id, kind, &entity_id)?;
    Ok(Json(ApiResponse::success(deleted)))
}

fn move_entity(
    state: &AppState,
    user_id: &str,
    kind: NodeKind,
    (id, entity_id): (String, String),
    req: MoveRequest,
) -> Result<impl IntoResponse + use<>, ApiError> {
    let moved = state
        .tree
        .move_entity(&id, user_id, kind, &entity_id, &req.parent_id)?;
    Ok(Json(ApiResponse::success(moved)))
}

fn rename_entity(
    state: &AppState,
    user_id: &str,
    kind: NodeKind,
    (id, entity_id): (String, String),
    req: RenameRequest,
) -> Result<impl IntoResponse + use<>, ApiError> {
    let renamed = state
        .tree
        .rename_entity(&id, user_id, kind, &entity_id, &req.name)?;
    Ok(Json(ApiResponse::success(renamed)))
}

pub async fn delete_folder(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(ids): Path<(String, String)>,
) -> impl IntoResponse {
    delete_entity(&state, &auth.user_id, NodeKind::Folder, ids)
}

pub async fn delete_doc(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(ids): Path<(String, String)>,
) -> impl IntoResponse {
    delete_entity(&state, &auth.user_id, NodeKind::Doc, ids)
}

pub async fn delete_file(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(ids): Path<(String, String)>,
) -> impl IntoResponse {
    delete_entity(&state, &auth.user_id, NodeKind::File, ids)
}

pub async fn move_folder(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(ids): Path<(String, String)>,
    Json(req): Json<MoveRequest>,
) -> impl IntoResponse {
    move_entity(&state, &auth.user_id, NodeKind::Folder, ids, req)
}

pub async fn move_doc(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(ids): Path<(String, String)>,
    Json(req): Json<MoveRequest>,
) -> impl IntoResponse {
    move_entity(&state, &auth.user_id, NodeKind::Doc, ids, req)
}

pub async fn move_file(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(ids): Path<(String, String)>,
    Json(req): Json<MoveRequest>,
) -> impl IntoResponse {
    move_entity(&state, &auth.user_id, NodeKind::File, ids, req)
}

pub async fn rename_folder(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(ids): Path<(String, String)>,
    Json(req): Json<RenameRequest>,
) -> impl IntoResponse {
    rename_entity(&state, &auth.user_id, NodeKind::Folder, ids, req)
}

pub async fn rename_doc(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(ids): Path<(String, String)>,
    Json(req): Json<RenameRequest>,
) -> impl IntoResponse {
    rename_entity(&state, &auth.user_id, NodeKind::Doc, ids, req)
}

pub async fn rename_file(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(ids): Path<(String, String)>,
    Json(req): Json<RenameRequest>,
) -> impl IntoResponse {
    rename_entity(&state, &auth.user_id, NodeKind::File, ids, req)
}

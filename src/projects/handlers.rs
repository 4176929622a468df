use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::instrument;

use super::dto::{
    CreateProjectRequest, CreatedProjectResponse, EditProjectRequest, EditedProjectResponse,
    ProjectView,
};
use super::service;
use crate::{
    auth::AdminSession,
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/:id",
            get(get_project).put(edit_project).delete(delete_project),
        )
}

#[instrument(skip(state, _session, payload))]
pub async fn create_project(
    State(state): State<AppState>,
    _session: AdminSession,
    Json(payload): Json<CreateProjectRequest>,
) -> ApiResult<Json<CreatedProjectResponse>> {
    Ok(Json(service::create(&state, payload).await?))
}

#[instrument(skip(state))]
pub async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<Vec<ProjectView>>> {
    let projects = state.store.list_projects().await?;
    let mut out = Vec::with_capacity(projects.len());
    for p in projects {
        out.push(service::view(&state, p).await?);
    }
    Ok(Json(out))
}

#[instrument(skip(state))]
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ProjectView>> {
    let project = state
        .store
        .get_project(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;
    Ok(Json(service::view(&state, project).await?))
}

#[instrument(skip(state, _session, payload))]
pub async fn edit_project(
    State(state): State<AppState>,
    _session: AdminSession,
    Path(id): Path<i64>,
    Json(payload): Json<EditProjectRequest>,
) -> ApiResult<Json<EditedProjectResponse>> {
    Ok(Json(service::edit(&state, id, payload).await?))
}

#[instrument(skip(state, _session))]
pub async fn delete_project(
    State(state): State<AppState>,
    _session: AdminSession,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    service::remove(&state, id).await?;
    Ok(Json(json!({ "message": "Project deleted successfully" })))
}

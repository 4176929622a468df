use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{error, info, instrument};

use super::services::{
    is_image_type, object_key, presign_many, presign_upload, used_bytes, IMAGES_PREFIX,
    PREVIEW_TTL_SECS, VIEW_TTL_SECS,
};
use crate::{
    auth::AdminSession,
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn image_routes() -> Router<AppState> {
    Router::new()
        .route("/images", get(list_images).post(create_image))
        .route("/images/:id", delete(delete_image))
        .route("/images/storage", get(storage_usage))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateImageRequest {
    pub file_name: Option<String>,
    pub file_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedImageResponse {
    pub id: i64,
    pub s3_key: String,
    pub upload_url: String,
    pub image_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageListItem {
    pub id: i64,
    pub file_name: String,
    pub s3_key: String,
    pub signed_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageUsage {
    pub used_bytes: i64,
    pub remaining_storage: i64,
    pub limit_bytes: i64,
}

#[instrument(skip(state, _session, payload))]
pub async fn create_image(
    State(state): State<AppState>,
    _session: AdminSession,
    Json(payload): Json<CreateImageRequest>,
) -> ApiResult<Json<CreatedImageResponse>> {
    let file_name = payload
        .file_name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("fileName is required"))?;
    let file_type = payload
        .file_type
        .filter(|t| is_image_type(t))
        .ok_or_else(|| ApiError::bad_request("fileType must be an image content type"))?;

    let key = object_key(IMAGES_PREFIX, &file_name, &file_type);
    let upload_url = presign_upload(&state, &key, &file_type).await?;
    let image_url = state.storage.presign_get(&key, PREVIEW_TTL_SECS).await?;
    let image = state.store.insert_image(&key, &file_name).await?;

    info!(image_id = image.id, s3_key = %key, "image upload issued");
    Ok(Json(CreatedImageResponse {
        id: image.id,
        s3_key: key,
        upload_url,
        image_url,
    }))
}

#[instrument(skip(state))]
pub async fn list_images(State(state): State<AppState>) -> ApiResult<Json<Vec<ImageListItem>>> {
    let images = state.store.list_images().await?;
    let urls = presign_many(&state, images.iter().map(|i| i.s3_key.clone()).collect(), VIEW_TTL_SECS)
        .await?;
    let items = images
        .into_iter()
        .zip(urls)
        .map(|(img, signed_url)| ImageListItem {
            id: img.id,
            file_name: img.file_name,
            s3_key: img.s3_key,
            signed_url,
            created_at: img.created_at,
        })
        .collect();
    Ok(Json(items))
}

#[instrument(skip(state, _session))]
pub async fn delete_image(
    State(state): State<AppState>,
    _session: AdminSession,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let image = state
        .store
        .get_image(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Image not found"))?;

    state.storage.delete_object(&image.s3_key).await.map_err(|e| {
        error!(error = %e, image_id = id, s3_key = %image.s3_key, "delete object failed");
        ApiError::from(e)
    })?;
    state.store.delete_image(id).await?;

    info!(image_id = id, "image deleted");
    Ok(Json(serde_json::json!({ "message": "Image deleted successfully" })))
}

#[instrument(skip(state, _session))]
pub async fn storage_usage(
    State(state): State<AppState>,
    _session: AdminSession,
) -> ApiResult<Json<StorageUsage>> {
    let used = used_bytes(&state).await?;
    let limit = state.config.s3.limit_bytes;
    Ok(Json(StorageUsage {
        used_bytes: used,
        remaining_storage: (limit - used).max(0),
        limit_bytes: limit,
    }))
}

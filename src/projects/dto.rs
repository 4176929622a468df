use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInput {
    pub file_name: Option<String>,
    pub file_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub main_image: Option<ImageInput>,
    #[serde(default, alias = "additionalPictures")]
    pub additional_images: Vec<ImageInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditProjectRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub main_image: Option<ImageInput>,
    #[serde(default, alias = "additionalPictures")]
    pub additional_images: Vec<ImageInput>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTarget {
    pub upload_url: String,
    pub s3_key: String,
    pub file_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedProjectResponse {
    pub id: i64,
    pub main_image_upload_url: String,
    pub additional_image_upload_urls: Vec<UploadTarget>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditedProjectResponse {
    pub project: ProjectView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_image_upload_url: Option<String>,
    pub additional_image_upload_urls: Vec<UploadTarget>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedImage {
    pub s3_key: String,
    pub file_name: String,
    pub signed_url: String,
}

/// Project as served to visitors, every image carrying a signed GET URL.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub main_image: SignedImage,
    pub additional_images: Vec<SignedImage>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// An object-store key plus the file name the admin uploaded it under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub s3_key: String,
    pub file_name: String,
}

/// Portfolio project record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub main_image: ImageRef,
    pub additional_images: Vec<ImageRef>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Project {
    /// Every object key the project owns.
    pub fn object_keys(&self) -> Vec<String> {
        std::iter::once(&self.main_image)
            .chain(self.additional_images.iter())
            .map(|i| i.s3_key.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub main_image: ImageRef,
    pub additional_images: Vec<ImageRef>,
}

use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

use crate::state::AppState;

/// Upload credentials are short lived; the browser uses them immediately.
pub const UPLOAD_TTL_SECS: u64 = 60;
/// Returned right after upload so the admin UI can preview.
pub const PREVIEW_TTL_SECS: u64 = 24 * 60 * 60;
/// Listing URLs.
pub const VIEW_TTL_SECS: u64 = 60 * 60;

pub const IMAGES_PREFIX: &str = "images/";
pub const PROJECTS_PREFIX: &str = "projects/";

const MAX_NAME_LEN: usize = 100;

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

pub fn is_image_type(ct: &str) -> bool {
    ct.starts_with("image/")
}

/// Keeps letters, digits, dot, dash and underscore; everything else
/// collapses to a single dash.
pub fn sanitize_file_name(name: &str, content_type: &str) -> String {
    lazy_static! {
        static ref UNSAFE: Regex = Regex::new(r"[^A-Za-z0-9._-]+").unwrap();
    }
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = UNSAFE.replace_all(base.trim(), "-");
    let cleaned: String = cleaned
        .trim_matches(|c| c == '-' || c == '.')
        .chars()
        .take(MAX_NAME_LEN)
        .collect();
    if cleaned.is_empty() {
        format!("upload.{}", ext_from_mime(content_type).unwrap_or("bin"))
    } else {
        cleaned
    }
}

/// `{prefix}{uuid}-{sanitized name}`; unique even for repeated names.
pub fn object_key(prefix: &str, file_name: &str, content_type: &str) -> String {
    format!(
        "{}{}-{}",
        prefix,
        Uuid::new_v4().simple(),
        sanitize_file_name(file_name, content_type)
    )
}

pub async fn presign_upload(
    st: &AppState,
    key: &str,
    content_type: &str,
) -> anyhow::Result<String> {
    st.storage
        .presign_put(key, content_type, UPLOAD_TTL_SECS)
        .await
        .with_context(|| format!("presign upload for {key}"))
}

pub async fn presign_many(
    st: &AppState,
    keys: Vec<String>,
    expires_seconds: u64,
) -> anyhow::Result<Vec<String>> {
    let mut out = Vec::with_capacity(keys.len());
    for k in keys {
        out.push(st.storage.presign_get(&k, expires_seconds).await?);
    }
    Ok(out)
}

/// Bytes used under every namespace the site writes to.
pub async fn used_bytes(st: &AppState) -> anyhow::Result<i64> {
    let mut total = 0;
    for prefix in [IMAGES_PREFIX, PROJECTS_PREFIX] {
        total += st
            .storage
            .total_size(prefix)
            .await
            .with_context(|| format!("size of {prefix}"))?;
    }
    Ok(total)
}

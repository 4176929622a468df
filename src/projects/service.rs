use tracing::{info, instrument, warn};

use super::dto::{
    CreateProjectRequest, CreatedProjectResponse, EditProjectRequest, EditedProjectResponse,
    ImageInput, ProjectView, SignedImage, UploadTarget,
};
use super::repo_types::{ImageRef, NewProject, Project};
use crate::error::{ApiError, ApiResult};
use crate::images::services::{
    is_image_type, object_key, presign_many, presign_upload, PROJECTS_PREFIX, VIEW_TTL_SECS,
};
use crate::state::AppState;

/// A file the browser still has to PUT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub image: ImageRef,
    pub content_type: String,
}

#[derive(Debug)]
pub struct EditPlan {
    pub main_image: ImageRef,
    pub main_upload: Option<PendingUpload>,
    pub additional_images: Vec<ImageRef>,
    pub additional_uploads: Vec<PendingUpload>,
    pub removed_keys: Vec<String>,
}

fn required_text(value: Option<String>, field: &str) -> ApiResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{field} is required")))
}

fn file_name(input: &ImageInput) -> ApiResult<&str> {
    input
        .file_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::bad_request("fileName is required for every image"))
}

fn new_upload(input: &ImageInput) -> ApiResult<PendingUpload> {
    let name = file_name(input)?;
    let content_type = input
        .file_type
        .as_deref()
        .filter(|t| is_image_type(t))
        .ok_or_else(|| ApiError::bad_request(format!("{name}: fileType must be an image content type")))?;
    Ok(PendingUpload {
        image: ImageRef {
            s3_key: object_key(PROJECTS_PREFIX, name, content_type),
            file_name: name.to_string(),
        },
        content_type: content_type.to_string(),
    })
}

pub fn plan_create(
    main: Option<&ImageInput>,
    additional: &[ImageInput],
) -> ApiResult<(PendingUpload, Vec<PendingUpload>)> {
    let main = main.ok_or_else(|| ApiError::bad_request("mainImage is required"))?;
    let main = new_upload(main)?;
    let extra = additional.iter().map(new_upload).collect::<ApiResult<Vec<_>>>()?;
    Ok((main, extra))
}

/// Diffs the requested images against the stored ones by file name.
/// Files already stored keep their keys; only new names get upload slots.
pub fn plan_edit(
    existing: &Project,
    main: Option<&ImageInput>,
    additional: &[ImageInput],
) -> ApiResult<EditPlan> {
    let mut removed_keys = Vec::new();

    let (main_image, main_upload) = match main {
        Some(input) if file_name(input)? != existing.main_image.file_name => {
            let upload = new_upload(input)?;
            removed_keys.push(existing.main_image.s3_key.clone());
            (upload.image.clone(), Some(upload))
        }
        _ => (existing.main_image.clone(), None),
    };

    let mut additional_images: Vec<ImageRef> = Vec::with_capacity(additional.len());
    let mut additional_uploads = Vec::new();
    for input in additional {
        let name = file_name(input)?;
        if additional_images.iter().any(|i| i.file_name == name) {
            continue;
        }
        match existing.additional_images.iter().find(|i| i.file_name == name) {
            Some(kept) => additional_images.push(kept.clone()),
            None => {
                let upload = new_upload(input)?;
                additional_images.push(upload.image.clone());
                additional_uploads.push(upload);
            }
        }
    }

    removed_keys.extend(
        existing
            .additional_images
            .iter()
            .filter(|old| !additional_images.iter().any(|i| i.file_name == old.file_name))
            .map(|old| old.s3_key.clone()),
    );

    Ok(EditPlan {
        main_image,
        main_upload,
        additional_images,
        additional_uploads,
        removed_keys,
    })
}

async fn upload_targets(st: &AppState, uploads: &[PendingUpload]) -> ApiResult<Vec<UploadTarget>> {
    let mut out = Vec::with_capacity(uploads.len());
    for u in uploads {
        out.push(UploadTarget {
            upload_url: presign_upload(st, &u.image.s3_key, &u.content_type).await?,
            s3_key: u.image.s3_key.clone(),
            file_name: u.image.file_name.clone(),
        });
    }
    Ok(out)
}

pub async fn view(st: &AppState, project: Project) -> ApiResult<ProjectView> {
    let mut urls = presign_many(st, project.object_keys(), VIEW_TTL_SECS).await?.into_iter();
    let mut sign = |image: ImageRef| SignedImage {
        signed_url: urls.next().unwrap_or_default(),
        s3_key: image.s3_key,
        file_name: image.file_name,
    };
    let main_image = sign(project.main_image);
    let additional_images = project.additional_images.into_iter().map(&mut sign).collect();
    Ok(ProjectView {
        id: project.id,
        title: project.title,
        description: project.description,
        main_image,
        additional_images,
        created_at: project.created_at,
    })
}

#[instrument(skip(st, req))]
pub async fn create(st: &AppState, req: CreateProjectRequest) -> ApiResult<CreatedProjectResponse> {
    let title = required_text(req.title, "title")?;
    let description = required_text(req.description, "description")?;
    let (main, extra) = plan_create(req.main_image.as_ref(), &req.additional_images)?;

    let main_image_upload_url = presign_upload(st, &main.image.s3_key, &main.content_type).await?;
    let additional_image_upload_urls = upload_targets(st, &extra).await?;

    let project = st
        .store
        .insert_project(NewProject {
            title,
            description,
            main_image: main.image,
            additional_images: extra.into_iter().map(|u| u.image).collect(),
        })
        .await?;

    info!(project_id = project.id, images = project.additional_images.len() + 1, "project created");
    Ok(CreatedProjectResponse {
        id: project.id,
        main_image_upload_url,
        additional_image_upload_urls,
    })
}

#[instrument(skip(st, req))]
pub async fn edit(st: &AppState, id: i64, req: EditProjectRequest) -> ApiResult<EditedProjectResponse> {
    let title = required_text(req.title, "title")?;
    let description = required_text(req.description, "description")?;
    let mut project = st
        .store
        .get_project(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;

    let plan = plan_edit(&project, req.main_image.as_ref(), &req.additional_images)?;

    let main_image_upload_url = match &plan.main_upload {
        Some(u) => Some(presign_upload(st, &u.image.s3_key, &u.content_type).await?),
        None => None,
    };
    let additional_image_upload_urls = upload_targets(st, &plan.additional_uploads).await?;

    project.title = title;
    project.description = description;
    project.main_image = plan.main_image;
    project.additional_images = plan.additional_images;
    st.store.update_project(&project).await?;

    if !plan.removed_keys.is_empty() {
        if let Err(e) = st.storage.delete_objects(&plan.removed_keys).await {
            warn!(error = %e, project_id = id, keys = ?plan.removed_keys, "orphaned project objects");
        }
    }

    info!(
        project_id = id,
        removed = plan.removed_keys.len(),
        uploads = additional_image_upload_urls.len() + usize::from(main_image_upload_url.is_some()),
        "project updated"
    );
    Ok(EditedProjectResponse {
        project: view(st, project).await?,
        main_image_upload_url,
        additional_image_upload_urls,
    })
}

#[instrument(skip(st))]
pub async fn remove(st: &AppState, id: i64) -> ApiResult<()> {
    let project = st
        .store
        .get_project(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;
    st.storage.delete_objects(&project.object_keys()).await?;
    st.store.delete_project(id).await?;
    info!(project_id = id, "project deleted");
    Ok(())
}

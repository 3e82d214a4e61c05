use std::{path::Path, sync::Arc};

use base64::{Engine, engine::general_purpose::STANDARD};
use image::ImageFormat;
use tracing::{debug, info};

use crate::core::{
    auth::Session,
    db::{Backend, Photo, generate_id, sort_photos, timestamp_now},
    error::{StoreError, StoreResult},
    workflow::StepId,
};

/// Content types accepted for uploaded photos.
pub const ALLOWED_CONTENT_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Bytes encoded per progress tick. A multiple of 3 so chunk encodings
/// concatenate without padding in between.
const ENCODE_CHUNK: usize = 3 * 64 * 1024;

/// Share of the progress bar spent encoding; the rest is the store write.
const ENCODE_PROGRESS_SHARE: usize = 90;

/// An uploaded file as received from the user.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Read a file, deriving the content type from its extension.
    pub async fn from_path<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            StoreError::Validation(format!("cannot read {}: {e}", path.display()))
        })?;
        let content_type = ImageFormat::from_path(path)
            .map(|f| f.to_mime_type())
            .unwrap_or("application/octet-stream")
            .to_string();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }
}

fn validate_url(url: &str) -> StoreResult<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(StoreError::Validation("photo URL is required".to_string()));
    }
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| StoreError::Validation(format!("invalid photo URL `{url}`: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(StoreError::Validation(format!(
            "photo URL `{url}` is not an http(s) link"
        )));
    }
    Ok(url.to_string())
}

pub struct PhotoStore<B> {
    backend: Arc<B>,
    max_upload_bytes: u64,
}

impl<B> Clone for PhotoStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

impl<B: Backend> PhotoStore<B> {
    pub fn new(backend: Arc<B>, max_upload_bytes: u64) -> Self {
        Self {
            backend,
            max_upload_bytes,
        }
    }

    /// Reject files outside the image allow-list, above the size ceiling, or
    /// whose bytes are not the declared format.
    pub fn validate_upload(&self, file: &UploadFile) -> StoreResult<ImageFormat> {
        let content_type = file.content_type.trim().to_ascii_lowercase();
        if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(StoreError::Validation(format!(
                "{}: content type `{}` is not an accepted image type",
                file.file_name, file.content_type
            )));
        }
        if file.bytes.len() as u64 > self.max_upload_bytes {
            return Err(StoreError::Validation(format!(
                "{}: {} bytes exceeds the {} byte limit",
                file.file_name,
                file.bytes.len(),
                self.max_upload_bytes
            )));
        }
        let declared = ImageFormat::from_mime_type(&content_type).ok_or_else(|| {
            StoreError::Validation(format!("unsupported content type `{content_type}`"))
        })?;
        match image::guess_format(&file.bytes) {
            Ok(actual) if actual == declared => Ok(declared),
            _ => Err(StoreError::Validation(format!(
                "{}: content does not match `{}`",
                file.file_name, content_type
            ))),
        }
    }

    async fn ensure_project(&self, project_id: &str) -> StoreResult<()> {
        match self.backend.get_project(project_id).await? {
            Some(_) => Ok(()),
            None => Err(StoreError::project_not_found(project_id)),
        }
    }

    async fn touch_project(&self, project_id: &str) -> StoreResult<()> {
        if let Some(mut project) = self.backend.get_project(project_id).await? {
            project.updated_at = timestamp_now();
            self.backend.save_project(&project).await?;
        }
        Ok(())
    }

    async fn store(&self, project_id: &str, step_id: StepId, url: String) -> StoreResult<Photo> {
        let photo = Photo {
            id: generate_id(),
            project_id: project_id.to_string(),
            step_id,
            url,
            upload_time: timestamp_now(),
        };
        let photo = self.backend.add_photo(&photo).await?;
        self.touch_project(project_id).await?;
        Ok(photo)
    }

    pub async fn attach_from_url(
        &self,
        session: &Session,
        project_id: &str,
        step_id: StepId,
        url: &str,
    ) -> StoreResult<Photo> {
        session.require_admin("add photos")?;
        let url = validate_url(url)?;
        self.ensure_project(project_id).await?;
        let photo = self.store(project_id, step_id, url).await?;
        info!(project = project_id, step = %step_id, photo = %photo.id, "photo linked");
        Ok(photo)
    }

    /// Store an uploaded image as an inline data URL. Remote backends get
    /// progress ticks while encoding and a final 100 once stored; local ones
    /// report 100 once.
    pub async fn attach_from_file<F>(
        &self,
        session: &Session,
        project_id: &str,
        step_id: StepId,
        file: &UploadFile,
        mut on_progress: F,
    ) -> StoreResult<Photo>
    where
        F: FnMut(u8),
    {
        session.require_admin("upload photos")?;
        let format = self.validate_upload(file)?;
        self.ensure_project(project_id).await?;

        let report = self.backend.is_remote();
        if report {
            on_progress(0);
        }
        let mime = format.to_mime_type();
        let mut url = String::with_capacity(file.bytes.len() * 4 / 3 + mime.len() + 16);
        url.push_str("data:");
        url.push_str(mime);
        url.push_str(";base64,");
        let total = file.bytes.len().max(1);
        let mut encoded = 0;
        for chunk in file.bytes.chunks(ENCODE_CHUNK) {
            STANDARD.encode_string(chunk, &mut url);
            encoded += chunk.len();
            if report {
                on_progress((encoded * ENCODE_PROGRESS_SHARE / total) as u8);
            }
        }

        let photo = self.store(project_id, step_id, url).await?;
        on_progress(100);
        info!(
            project = project_id,
            step = %step_id,
            photo = %photo.id,
            file = %file.file_name,
            bytes = file.bytes.len(),
            "photo uploaded"
        );
        Ok(photo)
    }

    /// Upload several files one after another. Stops at the first failure;
    /// files before it stay attached.
    pub async fn attach_files<F>(
        &self,
        session: &Session,
        project_id: &str,
        step_id: StepId,
        files: &[UploadFile],
        mut on_progress: F,
    ) -> StoreResult<Vec<Photo>>
    where
        F: FnMut(usize, u8),
    {
        let mut photos = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            let photo = self
                .attach_from_file(session, project_id, step_id, file, |pct| {
                    on_progress(index, pct)
                })
                .await?;
            photos.push(photo);
        }
        Ok(photos)
    }

    pub async fn list_for_step(&self, project_id: &str, step_id: StepId) -> StoreResult<Vec<Photo>> {
        let mut photos = self
            .backend
            .list_photos_for_step(project_id, step_id)
            .await?;
        sort_photos(&mut photos);
        Ok(photos)
    }

    pub async fn list_for_project(&self, project_id: &str) -> StoreResult<Vec<Photo>> {
        self.backend.list_photos(project_id).await
    }

    pub async fn remove(&self, session: &Session, id: &str) -> StoreResult<()> {
        session.require_admin("delete photos")?;
        let photo = self
            .backend
            .get_photo(id)
            .await?
            .ok_or_else(|| StoreError::photo_not_found(id))?;
        self.backend.delete_photo(&photo.id).await?;
        self.touch_project(&photo.project_id).await?;
        info!(project = %photo.project_id, photo = %photo.id, "photo deleted");
        Ok(())
    }

    /// Bulk delete used when the owning project goes away.
    pub async fn remove_all_for_project(&self, session: &Session, project_id: &str) -> StoreResult<()> {
        session.require_admin("delete photos")?;
        self.backend.delete_photos_for_project(project_id).await?;
        debug!(project = project_id, "photos of project deleted");
        Ok(())
    }
}

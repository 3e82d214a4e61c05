//! Remote-primary persistence with a local safety net.
//!
//! Every call goes to the primary store first. When it fails with a
//! transient remote error the same call is served by the secondary store and
//! the failure is logged and reported to the observer. Successful primary
//! writes are mirrored into the secondary store so it stays a usable cache.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::warn;

use crate::core::{
    db::{Backend, Photo, PhotoRepository, Project, ProjectRepository},
    error::{StoreError, StoreResult},
    workflow::StepId,
};

/// A primary-store failure that was absorbed by the secondary store.
#[derive(Debug, Clone)]
pub struct FallbackEvent {
    pub operation: &'static str,
    pub primary: &'static str,
    pub secondary: &'static str,
    pub error: String,
}

pub type FallbackObserver = Arc<dyn Fn(&FallbackEvent) + Send + Sync>;

pub struct FallbackBackend<P, S> {
    primary: P,
    secondary: S,
    observer: Option<FallbackObserver>,
    fallbacks: AtomicU64,
}

impl<P, S> std::fmt::Debug for FallbackBackend<P, S>
where
    P: std::fmt::Debug,
    S: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackBackend")
            .field("primary", &self.primary)
            .field("secondary", &self.secondary)
            .field("fallbacks", &self.fallbacks.load(Ordering::Relaxed))
            .finish()
    }
}

impl<P: Backend, S: Backend> FallbackBackend<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self {
            primary,
            secondary,
            observer: None,
            fallbacks: AtomicU64::new(0),
        }
    }

    pub fn with_observer(mut self, observer: FallbackObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Number of calls served by the secondary store so far.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    fn record(&self, operation: &'static str, err: &StoreError) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        warn!(
            operation,
            primary = self.primary.backend_tag(),
            secondary = self.secondary.backend_tag(),
            error = %err,
            "primary store failed, serving from secondary"
        );
        if let Some(observer) = &self.observer {
            observer(&FallbackEvent {
                operation,
                primary: self.primary.backend_tag(),
                secondary: self.secondary.backend_tag(),
                error: err.to_string(),
            });
        }
    }

    async fn with_fallback<T, PF, SF, SFut>(
        &self,
        operation: &'static str,
        primary: PF,
        secondary: SF,
    ) -> StoreResult<T>
    where
        PF: Future<Output = StoreResult<T>>,
        SF: FnOnce() -> SFut,
        SFut: Future<Output = StoreResult<T>>,
    {
        match primary.await {
            Err(err) if err.is_transient() => {
                self.record(operation, &err);
                secondary().await
            }
            other => other,
        }
    }

    /// Best-effort copy of a successful primary write.
    async fn mirror<T>(&self, operation: &'static str, write: impl Future<Output = StoreResult<T>>) {
        if let Err(err) = write.await {
            warn!(
                operation,
                secondary = self.secondary.backend_tag(),
                error = %err,
                "mirroring write to secondary store failed"
            );
        }
    }

    /// Copy the owning project into the secondary store when it only exists
    /// on the primary, so a mirrored photo has a parent row.
    async fn mirror_parent_project(&self, project_id: &str) {
        match self.secondary.get_project(project_id).await {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(err) => {
                warn!(
                    project_id,
                    secondary = self.secondary.backend_tag(),
                    error = %err,
                    "cannot check project in secondary store"
                );
                return;
            }
        }
        match self.primary.get_project(project_id).await {
            Ok(Some(project)) => {
                self.mirror("save_project", self.secondary.save_project(&project))
                    .await;
            }
            Ok(None) => {}
            Err(err) => warn!(
                project_id,
                primary = self.primary.backend_tag(),
                error = %err,
                "cannot read project to mirror"
            ),
        }
    }
}

impl<P: Backend, S: Backend> Backend for FallbackBackend<P, S> {
    fn backend_tag(&self) -> &'static str {
        "fallback"
    }

    async fn init(&self) -> StoreResult<()> {
        self.secondary.init().await?;
        if let Err(err) = self.primary.init().await {
            if !err.is_transient() {
                return Err(err);
            }
            self.record("init", &err);
        }
        Ok(())
    }

    fn is_remote(&self) -> bool {
        self.primary.is_remote()
    }
}

impl<P: Backend, S: Backend> ProjectRepository for FallbackBackend<P, S> {
    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        self.with_fallback("list_projects", self.primary.list_projects(), || {
            self.secondary.list_projects()
        })
        .await
    }

    async fn get_project(&self, id: &str) -> StoreResult<Option<Project>> {
        self.with_fallback("get_project", self.primary.get_project(id), || {
            self.secondary.get_project(id)
        })
        .await
    }

    async fn save_project(&self, project: &Project) -> StoreResult<Project> {
        match self.primary.save_project(project).await {
            Ok(saved) => {
                self.mirror("save_project", self.secondary.save_project(&saved))
                    .await;
                Ok(saved)
            }
            Err(err) if err.is_transient() => {
                self.record("save_project", &err);
                self.secondary.save_project(project).await
            }
            Err(err) => Err(err),
        }
    }

    async fn delete_project(&self, id: &str) -> StoreResult<()> {
        match self.primary.delete_project(id).await {
            Ok(()) => {
                self.mirror("delete_project", self.secondary.delete_project(id))
                    .await;
                Ok(())
            }
            Err(err) if err.is_transient() => {
                self.record("delete_project", &err);
                self.secondary.delete_project(id).await
            }
            Err(err) => Err(err),
        }
    }
}

impl<P: Backend, S: Backend> PhotoRepository for FallbackBackend<P, S> {
    async fn list_photos(&self, project_id: &str) -> StoreResult<Vec<Photo>> {
        self.with_fallback("list_photos", self.primary.list_photos(project_id), || {
            self.secondary.list_photos(project_id)
        })
        .await
    }

    async fn list_photos_for_step(
        &self,
        project_id: &str,
        step_id: StepId,
    ) -> StoreResult<Vec<Photo>> {
        self.with_fallback(
            "list_photos_for_step",
            self.primary.list_photos_for_step(project_id, step_id),
            || self.secondary.list_photos_for_step(project_id, step_id),
        )
        .await
    }

    async fn add_photo(&self, photo: &Photo) -> StoreResult<Photo> {
        match self.primary.add_photo(photo).await {
            Ok(saved) => {
                self.mirror_parent_project(&saved.project_id).await;
                self.mirror("add_photo", self.secondary.add_photo(&saved)).await;
                Ok(saved)
            }
            Err(err) if err.is_transient() => {
                self.record("add_photo", &err);
                self.secondary.add_photo(photo).await
            }
            Err(err) => Err(err),
        }
    }

    async fn get_photo(&self, id: &str) -> StoreResult<Option<Photo>> {
        self.with_fallback("get_photo", self.primary.get_photo(id), || {
            self.secondary.get_photo(id)
        })
        .await
    }

    async fn delete_photo(&self, id: &str) -> StoreResult<()> {
        match self.primary.delete_photo(id).await {
            Ok(()) => {
                self.mirror("delete_photo", self.secondary.delete_photo(id)).await;
                Ok(())
            }
            Err(err) if err.is_transient() => {
                self.record("delete_photo", &err);
                self.secondary.delete_photo(id).await
            }
            Err(err) => Err(err),
        }
    }

    async fn delete_photos_for_project(&self, project_id: &str) -> StoreResult<()> {
        match self.primary.delete_photos_for_project(project_id).await {
            Ok(()) => {
                self.mirror(
                    "delete_photos_for_project",
                    self.secondary.delete_photos_for_project(project_id),
                )
                .await;
                Ok(())
            }
            Err(err) if err.is_transient() => {
                self.record("delete_photos_for_project", &err);
                self.secondary.delete_photos_for_project(project_id).await
            }
            Err(err) => Err(err),
        }
    }
}

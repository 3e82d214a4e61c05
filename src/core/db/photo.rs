use std::future::Future;

use crate::core::{db::model::Photo, error::StoreResult, workflow::StepId};

/// Every listing, and the photos embedded in a project's steps, come back in
/// one order: step ascending, then newest `upload_time` first
/// (see [`sort_photos`](crate::core::db::sort_photos)).
pub trait PhotoRepository {
    /// Photos of every step of a project.
    fn list_photos(&self, project_id: &str) -> impl Future<Output = StoreResult<Vec<Photo>>>;
    /// Photos of one step.
    fn list_photos_for_step(
        &self,
        project_id: &str,
        step_id: StepId,
    ) -> impl Future<Output = StoreResult<Vec<Photo>>>;
    fn add_photo(&self, photo: &Photo) -> impl Future<Output = StoreResult<Photo>>;
    fn get_photo(&self, id: &str) -> impl Future<Output = StoreResult<Option<Photo>>>;
    fn delete_photo(&self, id: &str) -> impl Future<Output = StoreResult<()>>;
    fn delete_photos_for_project(&self, project_id: &str) -> impl Future<Output = StoreResult<()>>;
}

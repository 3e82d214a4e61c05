use std::future::Future;

use crate::core::{
    db::model::{Project, ProjectType},
    error::StoreResult,
};

/// Fields accepted when creating a project. Only `name` is required.
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub address: Option<String>,
    pub coords: Option<String>,
    pub project_type: Option<ProjectType>,
    pub elevator_count: Option<i64>,
    pub note: Option<String>,
}

/// Partial edit of a project's descriptive fields. `None` leaves a field
/// untouched; `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub address: Option<Option<String>>,
    pub coords: Option<Option<String>>,
    pub project_type: Option<ProjectType>,
    pub elevator_count: Option<i64>,
    pub note: Option<Option<String>>,
}

pub trait ProjectRepository {
    /// All projects, newest `created_at` first, photos embedded in their steps
    /// in the [`PhotoRepository`](crate::core::db::PhotoRepository) order.
    fn list_projects(&self) -> impl Future<Output = StoreResult<Vec<Project>>>;
    /// One project with its photos embedded, like `list_projects`.
    fn get_project(&self, id: &str) -> impl Future<Output = StoreResult<Option<Project>>>;
    /// Insert or fully replace the record and its step rows. Photos are not
    /// touched; the returned project carries the photos already stored.
    fn save_project(&self, project: &Project) -> impl Future<Output = StoreResult<Project>>;
    fn delete_project(&self, id: &str) -> impl Future<Output = StoreResult<()>>;
}

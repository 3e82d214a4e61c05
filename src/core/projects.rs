use std::sync::Arc;

use tracing::info;

use crate::core::{
    auth::Session,
    db::{
        Backend, NewProject, Project, ProjectType, ProjectUpdate, StepState, StepStatus,
        generate_id, timestamp_now,
    },
    error::{StoreError, StoreResult},
    photos::PhotoStore,
    workflow::StepId,
};

/// Trim an optional text field; blank becomes absent.
fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required_name(name: &str) -> StoreResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::Validation("project name is required".to_string()));
    }
    Ok(name.to_string())
}

fn coerce_elevator_count(count: Option<i64>) -> u32 {
    count
        .unwrap_or(1)
        .clamp(1, i64::from(u32::MAX)) as u32
}

pub struct ProjectStore<B> {
    backend: Arc<B>,
    photos: PhotoStore<B>,
    default_type: ProjectType,
}

impl<B: Backend> ProjectStore<B> {
    pub fn new(backend: Arc<B>, photos: PhotoStore<B>, default_type: ProjectType) -> Self {
        Self {
            backend,
            photos,
            default_type,
        }
    }

    pub async fn create(&self, session: &Session, fields: NewProject) -> StoreResult<Project> {
        session.require_admin("create projects")?;
        let name = required_name(&fields.name)?;
        let now = timestamp_now();
        let project = Project {
            id: generate_id(),
            name,
            address: clean(fields.address),
            coords: clean(fields.coords),
            project_type: fields.project_type.unwrap_or(self.default_type),
            elevator_count: coerce_elevator_count(fields.elevator_count),
            note: clean(fields.note),
            steps: StepId::all().map(StepState::pending).collect(),
            created_at: now,
            updated_at: now,
        };
        let project = self.backend.save_project(&project).await?;
        info!(id = %project.id, name = %project.name, "project created");
        Ok(project)
    }

    pub async fn get(&self, id: &str) -> StoreResult<Project> {
        self.backend
            .get_project(id)
            .await?
            .ok_or_else(|| StoreError::project_not_found(id))
    }

    pub async fn list(&self) -> StoreResult<Vec<Project>> {
        self.backend.list_projects().await
    }

    /// Projects whose name or address contains `keyword`, ignoring case.
    pub async fn search(&self, keyword: &str) -> StoreResult<Vec<Project>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|p| p.matches_keyword(keyword))
            .collect())
    }

    pub async fn update(
        &self,
        session: &Session,
        id: &str,
        update: ProjectUpdate,
    ) -> StoreResult<Project> {
        session.require_admin("edit projects")?;
        let name = update.name.as_deref().map(required_name).transpose()?;
        let mut project = self.get(id).await?;

        if let Some(name) = name {
            project.name = name;
        }
        if let Some(address) = update.address {
            project.address = clean(address);
        }
        if let Some(coords) = update.coords {
            project.coords = clean(coords);
        }
        if let Some(project_type) = update.project_type {
            project.project_type = project_type;
        }
        if let Some(count) = update.elevator_count {
            project.elevator_count = coerce_elevator_count(Some(count));
        }
        if let Some(note) = update.note {
            project.note = clean(note);
        }
        project.updated_at = timestamp_now();

        let project = self.backend.save_project(&project).await?;
        info!(id = %project.id, "project updated");
        Ok(project)
    }

    /// Set one step's status. A step missing from the project is appended.
    pub async fn set_step_status(
        &self,
        session: &Session,
        project_id: &str,
        step_id: StepId,
        status: StepStatus,
    ) -> StoreResult<Project> {
        session.require_admin("change step status")?;
        let mut project = self.get(project_id).await?;
        match project.steps.iter_mut().find(|s| s.id == step_id) {
            Some(step) => step.status = status,
            None => project.steps.push(StepState {
                id: step_id,
                status,
                photos: Vec::new(),
            }),
        }
        project.updated_at = timestamp_now();

        let project = self.backend.save_project(&project).await?;
        info!(
            id = %project.id,
            step = %step_id,
            status = %status,
            progress = project.progress(),
            "step status changed"
        );
        Ok(project)
    }

    /// Delete a project after removing every photo it owns.
    pub async fn remove(&self, session: &Session, id: &str) -> StoreResult<()> {
        session.require_admin("delete projects")?;
        let project = self.get(id).await?;
        self.photos.remove_all_for_project(session, &project.id).await?;
        self.backend.delete_project(&project.id).await?;
        info!(id = %project.id, "project deleted");
        Ok(())
    }

    pub fn compute_progress(&self, project: &Project) -> u8 {
        project.progress()
    }
}

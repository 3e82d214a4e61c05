mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from elevator_update for tests
pub use elevator_update::core::{
    auth::Session,
    db::{
        Backend, LocalDb, NewProject, Photo, PhotoRepository, Project, ProjectRepository,
        ProjectType, ProjectUpdate, StepStatus,
    },
    error::StoreError,
    photos::UploadFile,
    workflow::StepId,
};

pub mod core;

pub use core::{
    auth::{AdminGate, Session, SessionMarker},
    config::AppConfig,
    db::{Backend, LocalDb, Photo, Project, StepStatus},
    error::{StoreError, StoreResult},
    photos::{PhotoStore, UploadFile},
    projects::ProjectStore,
    workflow::{StepId, WORKFLOW_STEPS},
};

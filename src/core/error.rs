use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure kinds surfaced by the stores and backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested project or photo does not exist.
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },

    /// Input rejected before any persistence attempt.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A mutating operation was attempted in visitor mode.
    #[error("admin role required to {action}")]
    PermissionDenied { action: &'static str },

    /// Network or remote-store failure. Retryable.
    #[error("remote store unavailable: {0}")]
    TransientRemote(String),

    /// The embedded database failed (corruption, disk full, constraint).
    #[error("local storage error: {0}")]
    LocalStorage(#[from] sqlx::Error),

    /// Local database migration failed at startup.
    #[error("local storage migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("timestamp formatting failed: {0}")]
    Timestamp(#[from] time::error::Format),

    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    pub fn project_not_found(id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity: "project",
            id: id.into(),
        }
    }

    pub fn photo_not_found(id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity: "photo",
            id: id.into(),
        }
    }

    /// Whether a fallback path may absorb this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::TransientRemote(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::TransientRemote(err.to_string())
    }
}

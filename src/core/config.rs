//! Deployment configuration, read from a TOML file.

use std::{collections::BTreeMap, io::ErrorKind, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{
    db::ProjectType,
    error::{StoreError, StoreResult},
};

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Which persistence strategy this deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Embedded database only.
    #[default]
    Local,
    /// Hosted document store first, embedded database on failure.
    Remote,
    /// Embedded database plus a published read-only snapshot file.
    Snapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub mode: BackendMode,
    /// Base URL of the document store (remote mode).
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub remote_token: Option<String>,
    /// Public URL of the published snapshot file (snapshot mode).
    #[serde(default)]
    pub snapshot_url: Option<String>,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::default(),
            remote_url: None,
            remote_token: None,
            snapshot_url: None,
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Role name → shared password.
    #[serde(default = "default_roles")]
    pub roles: BTreeMap<String, String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            roles: default_roles(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
    #[serde(default)]
    pub default_project_type: ProjectType,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            session_file: default_session_file(),
            default_project_type: ProjectType::default(),
            max_upload_bytes: default_max_upload_bytes(),
            backend: BackendConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("elevator-update.db")
}

fn default_session_file() -> PathBuf {
    PathBuf::from(".elevator-update-session")
}

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_http_timeout_secs() -> u64 {
    15
}

fn default_roles() -> BTreeMap<String, String> {
    ["admin1", "admin2", "admin3"]
        .into_iter()
        .map(|role| (role.to_string(), "123456".to_string()))
        .collect()
}

impl AppConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> StoreResult<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(StoreError::Config(format!("cannot read {:?}: {e}", path)));
            }
        };
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> StoreResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StoreResult<()> {
        match self.backend.mode {
            BackendMode::Remote if self.backend.remote_url.is_none() => {
                return Err(StoreError::Config(
                    "backend.mode = \"remote\" requires backend.remote_url".to_string(),
                ));
            }
            BackendMode::Snapshot if self.backend.snapshot_url.is_none() => {
                return Err(StoreError::Config(
                    "backend.mode = \"snapshot\" requires backend.snapshot_url".to_string(),
                ));
            }
            _ => {}
        }
        if self.max_upload_bytes == 0 {
            return Err(StoreError::Config(
                "max_upload_bytes must be positive".to_string(),
            ));
        }
        if self.admin.roles.is_empty() {
            return Err(StoreError::Config(
                "admin.roles must name at least one role".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() -> anyhow::Result<()> {
        let config = AppConfig::from_toml("")?;
        assert_eq!(config.backend.mode, BackendMode::Local);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.default_project_type, ProjectType::Modernization);
        assert_eq!(config.admin.roles.len(), 3);
        Ok(())
    }

    #[test]
    fn remote_mode_requires_url() {
        let err = AppConfig::from_toml("[backend]\nmode = \"remote\"\n").unwrap_err();
        assert!(err.to_string().contains("remote_url"));
    }

    #[test]
    fn parses_full_config() -> anyhow::Result<()> {
        let config = AppConfig::from_toml(
            r#"
database_path = "/var/lib/elevator/data.db"
default_project_type = "type1"
max_upload_bytes = 2048

[backend]
mode = "snapshot"
snapshot_url = "https://raw.example.com/projects.json"

[admin.roles]
chief = "pw"
"#,
        )?;
        assert_eq!(config.backend.mode, BackendMode::Snapshot);
        assert_eq!(config.default_project_type, ProjectType::FullReplacement);
        assert_eq!(config.max_upload_bytes, 2048);
        assert_eq!(config.admin.roles.get("chief").map(String::as_str), Some("pw"));
        assert_eq!(config.backend.http_timeout_secs, 15);
        Ok(())
    }

    #[test]
    fn missing_file_is_default() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let config = AppConfig::from_file(&dir.path().join("absent.toml"))?;
        assert_eq!(config.backend.mode, BackendMode::Local);
        Ok(())
    }
}

//! Shared-password admin gate.
//!
//! A successful login yields a [`Session`] carrying the role name. The
//! session is passed explicitly to every mutating store operation; visitors
//! hold an anonymous session and can only read.

use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use subtle::ConstantTimeEq;
use tracing::info;

use crate::core::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    role: Option<String>,
}

impl Session {
    pub fn visitor() -> Self {
        Self { role: None }
    }

    pub fn current_role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_some()
    }

    pub fn logout(&mut self) {
        self.role = None;
    }

    /// Reject the action unless an admin is logged in.
    pub fn require_admin(&self, action: &'static str) -> StoreResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(StoreError::PermissionDenied { action })
        }
    }
}

/// Fixed role → password table.
#[derive(Debug, Clone)]
pub struct AdminGate {
    roles: BTreeMap<String, String>,
}

impl AdminGate {
    pub fn new(roles: BTreeMap<String, String>) -> Self {
        Self { roles }
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    pub fn is_known_role(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    pub fn login(&self, role: &str, password: &str) -> StoreResult<Session> {
        let matches = self
            .roles
            .get(role)
            .is_some_and(|expected| bool::from(expected.as_bytes().ct_eq(password.as_bytes())));
        if !matches {
            return Err(StoreError::PermissionDenied {
                action: "log in with these credentials",
            });
        }
        info!(role, "admin login");
        Ok(Session {
            role: Some(role.to_string()),
        })
    }
}

/// On-disk session marker holding the logged-in role name. No expiry.
#[derive(Debug, Clone)]
pub struct SessionMarker {
    path: PathBuf,
}

impl SessionMarker {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Restore the session. A marker naming a role the gate no longer knows
    /// is ignored.
    pub fn load(&self, gate: &AdminGate) -> StoreResult<Session> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let role = content.trim();
                if !role.is_empty() && gate.is_known_role(role) {
                    Ok(Session {
                        role: Some(role.to_string()),
                    })
                } else {
                    Ok(Session::visitor())
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Session::visitor()),
            Err(e) => Err(StoreError::Config(format!(
                "cannot read session marker {:?}: {e}",
                self.path
            ))),
        }
    }

    pub fn save(&self, session: &Session) -> StoreResult<()> {
        let Some(role) = session.current_role() else {
            return self.clear();
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Config(format!("cannot create {:?}: {e}", parent))
            })?;
        }
        std::fs::write(&self.path, role).map_err(|e| {
            StoreError::Config(format!("cannot write session marker {:?}: {e}", self.path))
        })
    }

    pub fn clear(&self) -> StoreResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Config(format!(
                "cannot remove session marker {:?}: {e}",
                self.path
            ))),
        }
    }
}

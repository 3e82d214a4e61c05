//! Export-based sync through a published, read-only snapshot file.
//!
//! Editors export the full dataset as a JSON blob and publish it out of
//! band; every device refreshes its local store from the published copy.

use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use tracing::{info, instrument, warn};

use crate::core::{
    db::{LocalDb, Project, ProjectRepository, timestamp_now},
    error::{StoreError, StoreResult},
};

pub const SNAPSHOT_VERSION: &str = "1.0";

fn default_version() -> String {
    SNAPSHOT_VERSION.to_string()
}

/// The published dataset: every project plus export metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub last_modified: String,
    #[serde(default = "default_version")]
    pub version: String,
}

impl Snapshot {
    pub fn new(projects: Vec<Project>) -> StoreResult<Self> {
        Ok(Self {
            projects,
            last_modified: timestamp_now().format(&Rfc3339)?,
            version: default_version(),
        })
    }

    /// Fill in photo ownership from the enclosing project and step, for
    /// snapshots whose embedded photos omit it.
    pub fn normalized(mut self) -> Self {
        for project in &mut self.projects {
            for step in &mut project.steps {
                for photo in &mut step.photos {
                    photo.project_id = project.id.clone();
                    photo.step_id = step.id;
                }
            }
        }
        self
    }
}

/// Serialize `projects` as a publishable snapshot blob.
pub fn generate_export_snapshot(projects: &[Project]) -> StoreResult<String> {
    let snapshot = Snapshot::new(projects.to_vec())?;
    Ok(serde_json::to_string_pretty(&snapshot)?)
}

#[derive(Debug)]
pub enum FetchOutcome {
    Found(Snapshot),
    /// Nothing has been published yet.
    Missing,
}

pub struct SnapshotClient {
    url: Url,
    client: reqwest::Client,
}

impl SnapshotClient {
    pub fn new(url: &str, timeout: Duration) -> StoreResult<Self> {
        let url = Url::parse(url)
            .map_err(|e| StoreError::Config(format!("invalid snapshot_url `{url}`: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Config(format!("http client: {e}")))?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The snapshot URL with a `t=<unix millis>` query so caches in between
    /// cannot serve a stale copy.
    pub fn cache_busted_url(&self) -> Url {
        let millis = timestamp_now().unix_timestamp_nanos() / 1_000_000;
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("t", &millis.to_string());
        url
    }

    #[instrument(name = "snapshot_fetch", skip(self), fields(url = %self.url))]
    pub async fn fetch(&self) -> StoreResult<FetchOutcome> {
        let resp = self.client.get(self.cache_busted_url()).send().await?;
        match resp.status() {
            StatusCode::OK => {
                let bytes = resp.bytes().await?;
                let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
                    StoreError::TransientRemote(format!("malformed snapshot: {e}"))
                })?;
                Ok(FetchOutcome::Found(snapshot))
            }
            StatusCode::NOT_FOUND => Ok(FetchOutcome::Missing),
            status => Err(StoreError::TransientRemote(format!(
                "snapshot fetch failed status={status}"
            ))),
        }
    }
}

/// Where the working dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetSource {
    Remote,
    LocalFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetState {
    Unloaded,
    Loading,
    Loaded(DatasetSource),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The local dataset now mirrors the published snapshot.
    Replaced { projects: usize },
    /// No snapshot is published; the dataset is now empty.
    Empty,
    /// The snapshot could not be fetched; local data was kept as is.
    Fallback { reason: String },
}

pub struct SnapshotSync {
    local: LocalDb,
    client: SnapshotClient,
    state: Mutex<DatasetState>,
}

impl SnapshotSync {
    pub fn new(local: LocalDb, client: SnapshotClient) -> Self {
        Self {
            local,
            client,
            state: Mutex::new(DatasetState::Unloaded),
        }
    }

    pub fn state(&self) -> DatasetState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, state: DatasetState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Export the local dataset as a publishable blob.
    pub async fn generate_export_snapshot(&self) -> StoreResult<String> {
        generate_export_snapshot(&self.local.list_projects().await?)
    }

    /// Re-fetch the published snapshot and replace the local dataset with it.
    ///
    /// A snapshot that parses but breaks a storage constraint (duplicate
    /// step or photo ids, a blank name) is an invalid payload, handled like
    /// a malformed one: the local dataset is left untouched.
    ///
    /// # Errors
    ///
    /// Local storage failures always surface. A remote failure surfaces as
    /// `TransientRemote` only when there is no local data to fall back on.
    pub async fn refresh(&self) -> StoreResult<RefreshOutcome> {
        self.set_state(DatasetState::Loading);
        let attempt = match self.client.fetch().await {
            Ok(FetchOutcome::Found(snapshot)) => self.apply(snapshot.normalized()).await,
            Ok(FetchOutcome::Missing) => self.local.replace_all(&[]).await.map(|()| {
                info!("no snapshot published, dataset is empty");
                RefreshOutcome::Empty
            }),
            Err(err) => Err(err),
        };
        match attempt {
            Ok(outcome) => {
                self.set_state(DatasetState::Loaded(DatasetSource::Remote));
                Ok(outcome)
            }
            Err(err) if err.is_transient() => self.keep_local(err).await,
            Err(err) => {
                self.set_state(DatasetState::Error(err.to_string()));
                Err(err)
            }
        }
    }

    async fn apply(&self, snapshot: Snapshot) -> StoreResult<RefreshOutcome> {
        match self.local.replace_all(&snapshot.projects).await {
            Ok(()) => {}
            Err(StoreError::LocalStorage(sqlx::Error::Database(e))) => {
                return Err(StoreError::TransientRemote(format!(
                    "snapshot rejected by local storage: {e}"
                )));
            }
            Err(err) => return Err(err),
        }
        info!(
            projects = snapshot.projects.len(),
            last_modified = %snapshot.last_modified,
            "dataset refreshed from snapshot"
        );
        Ok(RefreshOutcome::Replaced {
            projects: snapshot.projects.len(),
        })
    }

    async fn keep_local(&self, err: StoreError) -> StoreResult<RefreshOutcome> {
        let cached = match self.local.count_projects().await {
            Ok(count) => count,
            Err(local_err) => {
                self.set_state(DatasetState::Error(local_err.to_string()));
                return Err(local_err);
            }
        };
        if cached == 0 {
            self.set_state(DatasetState::Error(err.to_string()));
            return Err(err);
        }
        warn!(error = %err, cached, "snapshot unavailable, keeping local dataset");
        self.set_state(DatasetState::Loaded(DatasetSource::LocalFallback));
        Ok(RefreshOutcome::Fallback {
            reason: err.to_string(),
        })
    }
}

//! HTTP client for a hosted JSON document store.
//!
//! Layout: `projects` and `photos` collections addressed by id, with a
//! photo listing nested under each project. A 404 on a collection means the
//! collection is empty; a 404 on a document means it does not exist.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, instrument};

use crate::core::{
    db::{Backend, Photo, PhotoRepository, Project, ProjectRepository, sort_photos},
    error::{StoreError, StoreResult},
    workflow::StepId,
};

pub struct RemoteStore {
    base_url: Url,
    auth_bearer: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStore")
            .field("base_url", &self.base_url.as_str())
            .field("auth", &self.auth_bearer.is_some())
            .finish()
    }
}

impl RemoteStore {
    pub fn new(base_url: &str, auth_bearer: Option<String>, timeout: Duration) -> StoreResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| StoreError::Config(format!("invalid remote_url `{base_url}`: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Config(format!(
                "remote_url `{base_url}` cannot hold paths"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Config(format!("http client: {e}")))?;
        Ok(Self {
            base_url,
            auth_bearer: auth_bearer.filter(|t| !t.is_empty()),
            client,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.client.request(method, url);
        match &self.auth_bearer {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> StoreResult<T> {
        let url = resp.url().clone();
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            StoreError::TransientRemote(format!("malformed response from {url}: {e}"))
        })
    }

    fn unexpected(resp: &reqwest::Response) -> StoreError {
        StoreError::TransientRemote(format!(
            "unexpected status={} url={}",
            resp.status(),
            resp.url()
        ))
    }

    #[instrument(name = "remote_get", skip(self, url), fields(url = %url))]
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> StoreResult<Option<T>> {
        let resp = self.request(Method::GET, url).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Self::decode(resp).await.map(Some),
            _ => Err(Self::unexpected(&resp)),
        }
    }

    #[instrument(name = "remote_send", skip(self, url, body), fields(url = %url))]
    async fn send_json<B, T>(&self, method: Method, url: Url, body: &B) -> StoreResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self.request(method, url).json(body).send().await?;
        if resp.status().is_success() {
            Self::decode(resp).await
        } else {
            Err(Self::unexpected(&resp))
        }
    }

    #[instrument(name = "remote_delete", skip(self, url), fields(url = %url))]
    async fn delete(&self, url: Url) -> StoreResult<()> {
        let resp = self.request(Method::DELETE, url).send().await?;
        if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(Self::unexpected(&resp))
        }
    }
}

impl Backend for RemoteStore {
    fn backend_tag(&self) -> &'static str {
        "remote"
    }

    async fn init(&self) -> StoreResult<()> {
        debug!(base_url = %self.base_url, "remote store configured");
        Ok(())
    }

    fn is_remote(&self) -> bool {
        true
    }
}

impl RemoteStore {
    /// Project documents are stored without photos; the photos collection is
    /// the source for what each step shows.
    async fn with_photos(&self, mut project: Project) -> StoreResult<Project> {
        let photos = self.list_photos(&project.id).await?;
        project.embed_photos(photos);
        Ok(project)
    }
}

impl ProjectRepository for RemoteStore {
    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        let documents: Vec<Project> = self
            .get_json(self.url(&["projects"]))
            .await?
            .unwrap_or_default();
        let mut projects = Vec::with_capacity(documents.len());
        for project in documents {
            projects.push(self.with_photos(project).await?);
        }
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn get_project(&self, id: &str) -> StoreResult<Option<Project>> {
        match self.get_json(self.url(&["projects", id])).await? {
            Some(project) => self.with_photos(project).await.map(Some),
            None => Ok(None),
        }
    }

    async fn save_project(&self, project: &Project) -> StoreResult<Project> {
        let saved: Project = self
            .send_json(
                Method::PUT,
                self.url(&["projects", &project.id]),
                &project.without_photos(),
            )
            .await?;
        self.with_photos(saved).await
    }

    async fn delete_project(&self, id: &str) -> StoreResult<()> {
        self.delete(self.url(&["projects", id])).await
    }
}

impl PhotoRepository for RemoteStore {
    async fn list_photos(&self, project_id: &str) -> StoreResult<Vec<Photo>> {
        let mut photos: Vec<Photo> = self
            .get_json(self.url(&["projects", project_id, "photos"]))
            .await?
            .unwrap_or_default();
        sort_photos(&mut photos);
        Ok(photos)
    }

    async fn list_photos_for_step(
        &self,
        project_id: &str,
        step_id: StepId,
    ) -> StoreResult<Vec<Photo>> {
        let mut url = self.url(&["projects", project_id, "photos"]);
        url.query_pairs_mut()
            .append_pair("step", &step_id.to_string());
        let mut photos: Vec<Photo> = self.get_json(url).await?.unwrap_or_default();
        sort_photos(&mut photos);
        Ok(photos)
    }

    async fn add_photo(&self, photo: &Photo) -> StoreResult<Photo> {
        self.send_json(Method::POST, self.url(&["photos"]), photo)
            .await
    }

    async fn get_photo(&self, id: &str) -> StoreResult<Option<Photo>> {
        self.get_json(self.url(&["photos", id])).await
    }

    async fn delete_photo(&self, id: &str) -> StoreResult<()> {
        self.delete(self.url(&["photos", id])).await
    }

    async fn delete_photos_for_project(&self, project_id: &str) -> StoreResult<()> {
        self.delete(self.url(&["projects", project_id, "photos"]))
            .await
    }
}

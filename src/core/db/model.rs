use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::core::{
    error::StoreError,
    workflow::{STEP_COUNT, StepId},
};

/// Current UTC time truncated to millisecond precision, the resolution the
/// published snapshot format carries.
pub fn timestamp_now() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(now.nanosecond() / 1_000_000 * 1_000_000)
        .unwrap_or(now)
}

/// Time-ordered id: millisecond timestamp prefix plus random tail.
pub fn generate_id() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in-progress",
            StepStatus::Completed => "completed",
        }
    }
}

impl FromStr for StepStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "in-progress" => Ok(StepStatus::InProgress),
            "completed" => Ok(StepStatus::Completed),
            other => Err(StoreError::Validation(format!("unknown step status `{other}`"))),
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Modernization category of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProjectType {
    #[serde(rename = "type1")]
    FullReplacement,
    #[default]
    #[serde(rename = "type2")]
    Modernization,
    #[serde(rename = "type3")]
    Repair,
}

impl ProjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectType::FullReplacement => "type1",
            ProjectType::Modernization => "type2",
            ProjectType::Repair => "type3",
        }
    }
}

impl FromStr for ProjectType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "type1" => Ok(ProjectType::FullReplacement),
            "type2" => Ok(ProjectType::Modernization),
            "type3" => Ok(ProjectType::Repair),
            other => Err(StoreError::Validation(format!("unknown project type `{other}`"))),
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

fn default_elevator_count() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: String,
    /// Filled in from the owning project when absent in an imported snapshot.
    #[serde(default)]
    pub project_id: String,
    #[serde(default = "StepId::first")]
    pub step_id: StepId,
    /// Remote `http(s)` reference or an inline `data:` URL.
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub upload_time: OffsetDateTime,
}

impl Photo {
    pub fn is_inline(&self) -> bool {
        self.url.starts_with("data:")
    }
}

/// The one photo order every backend returns: step ascending, then newest
/// `upload_time` first. Ties keep their input order.
pub fn sort_photos(photos: &mut [Photo]) {
    photos.sort_by(|a, b| {
        a.step_id
            .cmp(&b.step_id)
            .then_with(|| b.upload_time.cmp(&a.upload_time))
    });
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    pub id: StepId,
    pub status: StepStatus,
    #[serde(default)]
    pub photos: Vec<Photo>,
}

impl StepState {
    pub fn pending(id: StepId) -> Self {
        Self {
            id,
            status: StepStatus::Pending,
            photos: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// `"lng,lat"` as entered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<String>,
    #[serde(rename = "type", default)]
    pub project_type: ProjectType,
    #[serde(default = "default_elevator_count")]
    pub elevator_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepState>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Coarse label shown next to a project's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressBadge {
    NotStarted,
    InProgress,
    Completed,
}

impl Project {
    /// State of one step; steps without a stored entry read as pending.
    pub fn step_state(&self, step_id: StepId) -> StepState {
        self.steps
            .iter()
            .find(|s| s.id == step_id)
            .cloned()
            .unwrap_or_else(|| StepState::pending(step_id))
    }

    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
            .min(usize::from(STEP_COUNT))
    }

    /// Percentage of completed steps, rounded half up.
    pub fn progress(&self) -> u8 {
        let completed = self.completed_steps() as u32;
        let total = u32::from(STEP_COUNT);
        ((completed * 100 + total / 2) / total) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.progress() == 100
    }

    pub fn badge(&self) -> ProgressBadge {
        match self.progress() {
            0 => ProgressBadge::NotStarted,
            100 => ProgressBadge::Completed,
            _ => ProgressBadge::InProgress,
        }
    }

    /// Replace the photos embedded in the steps with `photos`. A photo whose
    /// step has no entry gets a pending step appended for it.
    pub fn embed_photos(&mut self, mut photos: Vec<Photo>) {
        sort_photos(&mut photos);
        for step in &mut self.steps {
            step.photos.clear();
        }
        for photo in photos {
            match self.steps.iter_mut().find(|s| s.id == photo.step_id) {
                Some(step) => step.photos.push(photo),
                None => {
                    let mut step = StepState::pending(photo.step_id);
                    step.photos.push(photo);
                    self.steps.push(step);
                }
            }
        }
    }

    /// Copy without embedded photos, as stored in the project document.
    pub fn without_photos(&self) -> Project {
        let mut project = self.clone();
        for step in &mut project.steps {
            step.photos.clear();
        }
        project
    }

    pub fn photo_count(&self) -> usize {
        self.steps.iter().map(|s| s.photos.len()).sum()
    }

    /// Case-insensitive match against name and address.
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&keyword)
            || self
                .address
                .as_deref()
                .is_some_and(|a| a.to_lowercase().contains(&keyword))
    }
}

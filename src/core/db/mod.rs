mod backend;
mod model;
mod photo;
mod project;
mod state;

use std::{collections::HashMap, path::Path, sync::Arc};

use sqlx::SqliteConnection;
use state::DbState;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::debug;

use crate::core::{
    error::{StoreError, StoreResult},
    workflow::StepId,
};

pub use backend::Backend;
pub use model::{
    Photo, ProgressBadge, Project, ProjectType, StepState, StepStatus, generate_id, sort_photos,
    timestamp_now,
};
pub use photo::PhotoRepository;
pub use project::{NewProject, ProjectRepository, ProjectUpdate};

/// Embedded SQLite store. Cloning shares the same pool.
#[derive(Debug, Clone)]
pub struct LocalDb {
    state: Arc<DbState>,
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: String,
    name: String,
    address: Option<String>,
    coords: Option<String>,
    project_type: String,
    elevator_count: i64,
    note: Option<String>,
    created_at: String,
    updated_at: String,
}

#[derive(sqlx::FromRow)]
struct StepRow {
    project_id: String,
    step_id: i64,
    status: String,
}

#[derive(sqlx::FromRow)]
struct PhotoRow {
    id: String,
    project_id: String,
    step_id: i64,
    url: String,
    upload_time: String,
}

fn decode_error<E>(err: E) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StoreError::LocalStorage(sqlx::Error::Decode(Box::new(err)))
}

fn format_time(at: &OffsetDateTime) -> StoreResult<String> {
    at.format(&Rfc3339)
        .map_err(|e| StoreError::LocalStorage(sqlx::Error::Encode(Box::new(e))))
}

fn parse_time(value: &str) -> StoreResult<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(decode_error)
}

impl TryFrom<PhotoRow> for Photo {
    type Error = StoreError;

    fn try_from(row: PhotoRow) -> Result<Self, Self::Error> {
        Ok(Photo {
            id: row.id,
            project_id: row.project_id,
            step_id: StepId::try_from(row.step_id).map_err(decode_error)?,
            url: row.url,
            upload_time: parse_time(&row.upload_time)?,
        })
    }
}

impl TryFrom<StepRow> for StepState {
    type Error = StoreError;

    fn try_from(row: StepRow) -> Result<Self, Self::Error> {
        Ok(StepState {
            id: StepId::try_from(row.step_id).map_err(decode_error)?,
            status: row.status.parse().map_err(decode_error)?,
            photos: Vec::new(),
        })
    }
}

fn assemble_project(
    row: ProjectRow,
    steps: Vec<StepRow>,
    photos: Vec<PhotoRow>,
) -> StoreResult<Project> {
    let steps = steps
        .into_iter()
        .map(StepState::try_from)
        .collect::<StoreResult<Vec<_>>>()?;
    let photos = photos
        .into_iter()
        .map(Photo::try_from)
        .collect::<StoreResult<Vec<_>>>()?;
    let mut project = Project {
        id: row.id,
        name: row.name,
        address: row.address,
        coords: row.coords,
        project_type: row.project_type.parse().map_err(decode_error)?,
        elevator_count: u32::try_from(row.elevator_count).map_err(decode_error)?,
        note: row.note,
        steps,
        created_at: parse_time(&row.created_at)?,
        updated_at: parse_time(&row.updated_at)?,
    };
    project.embed_photos(photos);
    Ok(project)
}

async fn write_project_rows(conn: &mut SqliteConnection, project: &Project) -> StoreResult<()> {
    let created_at = format_time(&project.created_at)?;
    let updated_at = format_time(&project.updated_at)?;
    sqlx::query(
        r#"INSERT INTO project
            (id, name, address, coords, project_type, elevator_count, note, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            address = EXCLUDED.address,
            coords = EXCLUDED.coords,
            project_type = EXCLUDED.project_type,
            elevator_count = EXCLUDED.elevator_count,
            note = EXCLUDED.note,
            created_at = EXCLUDED.created_at,
            updated_at = EXCLUDED.updated_at"#,
    )
    .bind(&project.id)
    .bind(&project.name)
    .bind(&project.address)
    .bind(&project.coords)
    .bind(project.project_type.as_str())
    .bind(i64::from(project.elevator_count))
    .bind(&project.note)
    .bind(created_at)
    .bind(updated_at)
    .execute(&mut *conn)
    .await?;

    sqlx::query(r#"DELETE FROM project_step WHERE project_id = $1"#)
        .bind(&project.id)
        .execute(&mut *conn)
        .await?;
    for (position, step) in project.steps.iter().enumerate() {
        sqlx::query(
            r#"INSERT INTO project_step (project_id, step_id, position, status)
            VALUES ($1, $2, $3, $4)"#,
        )
        .bind(&project.id)
        .bind(i64::from(step.id))
        .bind(position as i64)
        .bind(step.status.as_str())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn write_photo_row(conn: &mut SqliteConnection, photo: &Photo) -> StoreResult<()> {
    sqlx::query(
        r#"INSERT INTO photo (id, project_id, step_id, url, upload_time)
        VALUES ($1, $2, $3, $4, $5)"#,
    )
    .bind(&photo.id)
    .bind(&photo.project_id)
    .bind(i64::from(photo.step_id))
    .bind(&photo.url)
    .bind(format_time(&photo.upload_time)?)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl LocalDb {
    pub async fn open<P: AsRef<Path>>(db_file: P) -> StoreResult<Self> {
        Ok(Self {
            state: Arc::new(DbState::open(db_file).await?),
        })
    }

    pub fn db_file(&self) -> &Path {
        self.state.db_file()
    }

    /// Flush the write-ahead log and release the database file.
    pub async fn close(&self) -> StoreResult<()> {
        self.state.close().await
    }

    pub async fn count_projects(&self) -> StoreResult<u64> {
        let mut conn = self.state.conn().await?;
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM project"#)
            .fetch_one(&mut **conn)
            .await?;
        Ok(count as u64)
    }

    /// Replace the whole dataset in one transaction. Photos embedded in the
    /// projects' steps are stored as photo rows owned by that project and step.
    pub async fn replace_all(&self, projects: &[Project]) -> StoreResult<()> {
        let mut conn = self.state.conn().await?;
        let mut tx = conn.begin_transaction().await?;
        sqlx::query(r#"DELETE FROM photo"#).execute(&mut *tx).await?;
        sqlx::query(r#"DELETE FROM project_step"#)
            .execute(&mut *tx)
            .await?;
        sqlx::query(r#"DELETE FROM project"#).execute(&mut *tx).await?;
        for project in projects {
            write_project_rows(&mut *tx, project).await?;
            for step in &project.steps {
                for photo in &step.photos {
                    let mut photo = photo.clone();
                    photo.project_id = project.id.clone();
                    photo.step_id = step.id;
                    write_photo_row(&mut *tx, &photo).await?;
                }
            }
        }
        tx.commit().await?;
        debug!(projects = projects.len(), "replaced local dataset");
        Ok(())
    }

    async fn load_project(&self, id: &str) -> StoreResult<Option<Project>> {
        let mut conn = self.state.conn().await?;
        let Some(row) = sqlx::query_as::<_, ProjectRow>(
            r#"SELECT id, name, address, coords, project_type, elevator_count, note,
                created_at, updated_at
            FROM project WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&mut **conn)
        .await?
        else {
            return Ok(None);
        };
        let steps = sqlx::query_as::<_, StepRow>(
            r#"SELECT project_id, step_id, status FROM project_step
            WHERE project_id = $1
            ORDER BY position ASC"#,
        )
        .bind(id)
        .fetch_all(&mut **conn)
        .await?;
        let photos = sqlx::query_as::<_, PhotoRow>(
            r#"SELECT id, project_id, step_id, url, upload_time FROM photo
            WHERE project_id = $1
            ORDER BY rowid ASC"#,
        )
        .bind(id)
        .fetch_all(&mut **conn)
        .await?;
        assemble_project(row, steps, photos).map(Some)
    }
}

impl Backend for LocalDb {
    fn backend_tag(&self) -> &'static str {
        "local"
    }

    async fn init(&self) -> StoreResult<()> {
        let mut conn = self.state.conn().await?;
        sqlx::query("SELECT 1").execute(&mut **conn).await?;
        Ok(())
    }
}

impl ProjectRepository for LocalDb {
    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        let mut conn = self.state.conn().await?;
        let rows = sqlx::query_as::<_, ProjectRow>(
            r#"SELECT id, name, address, coords, project_type, elevator_count, note,
                created_at, updated_at
            FROM project"#,
        )
        .fetch_all(&mut **conn)
        .await?;
        let mut steps: HashMap<String, Vec<StepRow>> = HashMap::new();
        for row in sqlx::query_as::<_, StepRow>(
            r#"SELECT project_id, step_id, status FROM project_step
            ORDER BY project_id ASC, position ASC"#,
        )
        .fetch_all(&mut **conn)
        .await?
        {
            steps.entry(row.project_id.clone()).or_default().push(row);
        }
        let mut photos: HashMap<String, Vec<PhotoRow>> = HashMap::new();
        for row in sqlx::query_as::<_, PhotoRow>(
            r#"SELECT id, project_id, step_id, url, upload_time FROM photo
            ORDER BY rowid ASC"#,
        )
        .fetch_all(&mut **conn)
        .await?
        {
            photos.entry(row.project_id.clone()).or_default().push(row);
        }

        let mut projects = rows
            .into_iter()
            .map(|row| {
                let project_steps = steps.remove(&row.id).unwrap_or_default();
                let project_photos = photos.remove(&row.id).unwrap_or_default();
                assemble_project(row, project_steps, project_photos)
            })
            .collect::<StoreResult<Vec<_>>>()?;
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn get_project(&self, id: &str) -> StoreResult<Option<Project>> {
        self.load_project(id).await
    }

    async fn save_project(&self, project: &Project) -> StoreResult<Project> {
        {
            let mut conn = self.state.conn().await?;
            let mut tx = conn.begin_transaction().await?;
            write_project_rows(&mut *tx, project).await?;
            tx.commit().await?;
        }
        self.load_project(&project.id)
            .await?
            .ok_or_else(|| StoreError::project_not_found(&project.id))
    }

    async fn delete_project(&self, id: &str) -> StoreResult<()> {
        let mut conn = self.state.conn().await?;
        let mut tx = conn.begin_transaction().await?;
        sqlx::query(r#"DELETE FROM photo WHERE project_id = $1"#)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(r#"DELETE FROM project WHERE id = $1"#)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

impl PhotoRepository for LocalDb {
    async fn list_photos(&self, project_id: &str) -> StoreResult<Vec<Photo>> {
        let mut conn = self.state.conn().await?;
        let mut photos = sqlx::query_as::<_, PhotoRow>(
            r#"SELECT id, project_id, step_id, url, upload_time FROM photo
            WHERE project_id = $1"#,
        )
        .bind(project_id)
        .fetch_all(&mut **conn)
        .await?
        .into_iter()
        .map(Photo::try_from)
        .collect::<StoreResult<Vec<_>>>()?;
        sort_photos(&mut photos);
        Ok(photos)
    }

    async fn list_photos_for_step(
        &self,
        project_id: &str,
        step_id: StepId,
    ) -> StoreResult<Vec<Photo>> {
        let mut conn = self.state.conn().await?;
        let mut photos = sqlx::query_as::<_, PhotoRow>(
            r#"SELECT id, project_id, step_id, url, upload_time FROM photo
            WHERE project_id = $1 AND step_id = $2"#,
        )
        .bind(project_id)
        .bind(i64::from(step_id))
        .fetch_all(&mut **conn)
        .await?
        .into_iter()
        .map(Photo::try_from)
        .collect::<StoreResult<Vec<_>>>()?;
        sort_photos(&mut photos);
        Ok(photos)
    }

    async fn add_photo(&self, photo: &Photo) -> StoreResult<Photo> {
        let mut conn = self.state.conn().await?;
        write_photo_row(&mut **conn, photo).await?;
        Ok(photo.clone())
    }

    async fn get_photo(&self, id: &str) -> StoreResult<Option<Photo>> {
        let mut conn = self.state.conn().await?;
        sqlx::query_as::<_, PhotoRow>(
            r#"SELECT id, project_id, step_id, url, upload_time FROM photo WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&mut **conn)
        .await?
        .map(Photo::try_from)
        .transpose()
    }

    async fn delete_photo(&self, id: &str) -> StoreResult<()> {
        let mut conn = self.state.conn().await?;
        sqlx::query(r#"DELETE FROM photo WHERE id = $1"#)
            .bind(id)
            .execute(&mut **conn)
            .await?;
        Ok(())
    }

    async fn delete_photos_for_project(&self, project_id: &str) -> StoreResult<()> {
        let mut conn = self.state.conn().await?;
        sqlx::query(r#"DELETE FROM photo WHERE project_id = $1"#)
            .bind(project_id)
            .execute(&mut **conn)
            .await?;
        Ok(())
    }
}

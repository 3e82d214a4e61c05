//! Integration tests for snapshot export and refresh.
//!
//! Tests cover:
//! - Export then refresh on another device reproduces the dataset
//! - Missing snapshot empties the dataset
//! - Fetch failures keep local data or surface when there is none
//! - Snapshots that break storage constraints are treated as invalid
//! - Cache-busting query on every fetch

mod common;

use std::time::Duration;

use common::*;
use elevator_update::core::db::generate_id;
use elevator_update::core::sync::{
    DatasetSource, DatasetState, RefreshOutcome, Snapshot, SnapshotClient, SnapshotSync,
    generate_export_snapshot,
};

fn sync_for(db: LocalDb, base_url: &str) -> SnapshotSync {
    let client = SnapshotClient::new(
        &format!("{base_url}/data/projects.json"),
        Duration::from_secs(5),
    )
    .expect("snapshot client");
    SnapshotSync::new(db, client)
}

async fn seed(db: LocalDb) -> anyhow::Result<Vec<Project>> {
    let (_, projects, photos) = stores(db, 1024 * 1024);
    let admin = admin_session();
    let first = projects
        .create(
            &admin,
            NewProject {
                name: "A栋1号电梯".to_string(),
                address: Some("幸福路 12 号".to_string()),
                coords: Some("120.15,30.28".to_string()),
                elevator_count: Some(2),
                ..Default::default()
            },
        )
        .await?;
    projects
        .set_step_status(&admin, &first.id, StepId::new(1)?, StepStatus::Completed)
        .await?;
    photos
        .attach_from_url(&admin, &first.id, StepId::new(1)?, "https://x/a.jpg")
        .await?;
    photos
        .attach_from_file(&admin, &first.id, StepId::new(2)?, &png_upload("b.png"), |_| {})
        .await?;
    tokio::time::sleep(Duration::from_millis(5)).await;
    projects
        .create(
            &admin,
            NewProject {
                name: "B栋".to_string(),
                project_type: Some(ProjectType::FullReplacement),
                ..Default::default()
            },
        )
        .await?;
    Ok(projects.list().await?)
}

#[tokio::test]
async fn test_export_then_refresh_reproduces_dataset() -> anyhow::Result<()> {
    let (editor_db, _editor_dir) = create_test_db().await;
    let exported = seed(editor_db).await?;
    let blob = generate_export_snapshot(&exported)?;

    let server = spawn_fixed_server(200, &blob).await;
    let (viewer_db, _viewer_dir) = create_test_db().await;
    let sync = sync_for(viewer_db.clone(), &server.base_url);
    assert_eq!(sync.state(), DatasetState::Unloaded);

    let outcome = sync.refresh().await?;

    assert_eq!(outcome, RefreshOutcome::Replaced { projects: 2 });
    assert_eq!(sync.state(), DatasetState::Loaded(DatasetSource::Remote));
    let snapshot: Snapshot = serde_json::from_str(&blob)?;
    assert_eq!(viewer_db.list_projects().await?, snapshot.projects);
    assert_eq!(viewer_db.list_projects().await?, exported);

    // Re-export reproduces the same projects
    let again: Snapshot = serde_json::from_str(&sync.generate_export_snapshot().await?)?;
    assert_eq!(again.projects, snapshot.projects);
    assert_eq!(again.version, "1.0");

    Ok(())
}

#[tokio::test]
async fn test_refresh_replaces_stale_local_data() -> anyhow::Result<()> {
    let (editor_db, _editor_dir) = create_test_db().await;
    let exported = seed(editor_db).await?;
    let server = spawn_fixed_server(200, &generate_export_snapshot(&exported[..1])?).await;

    let (viewer_db, _viewer_dir) = create_test_db().await;
    let (_, projects, _) = stores(viewer_db.clone(), 1024);
    projects
        .create(
            &admin_session(),
            NewProject {
                name: "stale".to_string(),
                ..Default::default()
            },
        )
        .await?;

    sync_for(viewer_db.clone(), &server.base_url).refresh().await?;

    let names: Vec<String> = viewer_db
        .list_projects()
        .await?
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec![exported[0].name.clone()]);

    Ok(())
}

#[tokio::test]
async fn test_missing_snapshot_empties_dataset() -> anyhow::Result<()> {
    let server = spawn_fixed_server(404, "").await;
    let (db, _temp_dir) = create_test_db().await;
    seed(db.clone()).await?;
    let sync = sync_for(db.clone(), &server.base_url);

    assert_eq!(sync.refresh().await?, RefreshOutcome::Empty);
    assert_eq!(sync.state(), DatasetState::Loaded(DatasetSource::Remote));
    assert_eq!(db.count_projects().await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_fetch_failure_keeps_local_data() -> anyhow::Result<()> {
    let server = spawn_fixed_server(503, "").await;
    let (db, _temp_dir) = create_test_db().await;
    let seeded = seed(db.clone()).await?;
    let sync = sync_for(db.clone(), &server.base_url);

    let outcome = sync.refresh().await?;

    assert!(matches!(outcome, RefreshOutcome::Fallback { .. }));
    assert_eq!(sync.state(), DatasetState::Loaded(DatasetSource::LocalFallback));
    assert_eq!(db.list_projects().await?, seeded);

    Ok(())
}

#[tokio::test]
async fn test_fetch_failure_without_local_data_is_an_error() -> anyhow::Result<()> {
    let server = spawn_fixed_server(200, "{ not a snapshot").await;
    let (db, _temp_dir) = create_test_db().await;
    let sync = sync_for(db, &server.base_url);

    let result = sync.refresh().await;

    assert!(matches!(result, Err(StoreError::TransientRemote(_))));
    assert!(matches!(sync.state(), DatasetState::Error(_)));

    Ok(())
}

#[tokio::test]
async fn test_snapshot_with_duplicate_photo_ids_keeps_local_data() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let seeded = seed(db.clone()).await?;
    let mut copy = seeded
        .iter()
        .find(|p| p.photo_count() > 0)
        .cloned()
        .expect("seeded project with photos");
    copy.id = generate_id();
    let mut published = seeded.clone();
    published.push(copy);
    let server = spawn_fixed_server(200, &generate_export_snapshot(&published)?).await;
    let sync = sync_for(db.clone(), &server.base_url);

    let outcome = sync.refresh().await?;

    assert!(matches!(outcome, RefreshOutcome::Fallback { .. }));
    assert_eq!(sync.state(), DatasetState::Loaded(DatasetSource::LocalFallback));
    assert_eq!(db.list_projects().await?, seeded);

    Ok(())
}

#[tokio::test]
async fn test_snapshot_with_duplicate_steps_on_empty_store_is_an_error() -> anyhow::Result<()> {
    let (editor_db, _editor_dir) = create_test_db().await;
    let mut published = seed(editor_db).await?;
    let repeated = published[0].steps[0].clone();
    published[0].steps.push(repeated);
    let server = spawn_fixed_server(200, &generate_export_snapshot(&published)?).await;
    let (db, _temp_dir) = create_test_db().await;
    let sync = sync_for(db.clone(), &server.base_url);

    let result = sync.refresh().await;

    assert!(matches!(result, Err(StoreError::TransientRemote(_))));
    assert!(matches!(sync.state(), DatasetState::Error(_)));
    assert_eq!(db.count_projects().await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_fetch_is_cache_busted() -> anyhow::Result<()> {
    let server = spawn_fixed_server(404, "").await;
    let (db, _temp_dir) = create_test_db().await;
    let sync = sync_for(db, &server.base_url);

    sync.refresh().await?;
    sync.refresh().await?;

    let recorded = server.recorded();
    assert_eq!(recorded.len(), 2);
    for request in &recorded {
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/data/projects.json");
        assert!(request.query.as_deref().is_some_and(|q| q.starts_with("t=")));
    }

    Ok(())
}

//! Integration tests for database constraint enforcement.
//!
//! Tests cover:
//! - Photos must reference an existing project (foreign key constraint)
//! - Photo ids are unique (primary key constraint)
//! - Project names cannot be blank at the storage layer (check constraint)

mod common;

use common::*;
use elevator_update::core::db::{StepState, generate_id, timestamp_now};

fn photo_for(project_id: &str) -> Photo {
    Photo {
        id: generate_id(),
        project_id: project_id.to_string(),
        step_id: StepId::first(),
        url: "https://x/a.jpg".to_string(),
        upload_time: timestamp_now(),
    }
}

fn assert_constraint(result: Result<impl std::fmt::Debug, StoreError>, needle: &str) {
    match result {
        Err(StoreError::LocalStorage(err)) => {
            let message = err.to_string();
            assert!(
                message.contains(needle),
                "Error should mention {needle}, got: {message}"
            );
        }
        other => panic!("expected a storage constraint error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_photo_requires_existing_project() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;

    let result = db.add_photo(&photo_for("missing")).await;

    assert_constraint(result, "FOREIGN KEY");
    Ok(())
}

#[tokio::test]
async fn test_photo_ids_are_unique() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let (_, projects, _) = stores(db.clone(), 1024);
    let project = projects
        .create(
            &admin_session(),
            NewProject {
                name: "O栋".to_string(),
                ..Default::default()
            },
        )
        .await?;
    let photo = photo_for(&project.id);
    db.add_photo(&photo).await?;

    let result = db.add_photo(&photo).await;

    assert_constraint(result, "UNIQUE");
    assert_eq!(db.list_photos(&project.id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_blank_project_name_rejected_by_storage() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let now = timestamp_now();
    let project = Project {
        id: generate_id(),
        name: "   ".to_string(),
        address: None,
        coords: None,
        project_type: ProjectType::default(),
        elevator_count: 1,
        note: None,
        steps: StepId::all().map(StepState::pending).collect(),
        created_at: now,
        updated_at: now,
    };

    let result = db.save_project(&project).await;

    assert_constraint(result, "CHECK");
    assert_eq!(db.count_projects().await?, 0);
    Ok(())
}

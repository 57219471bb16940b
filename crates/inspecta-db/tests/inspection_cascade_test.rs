//! Integration tests for the inspection deletion state machine: drafts
//! are purged with their whole aggregate (including physical files),
//! finalized inspections are soft-deleted and reversible, and a second
//! delete is a conflict.
//!
//! Requires DATABASE_URL pointing at a migrated database; run with
//! `cargo test -- --ignored`.

use chrono::Utc;
use uuid::Uuid;

use inspecta_db::test_fixtures::{seed_checklist_chain, seed_observation, TestDatabase};
use inspecta_db::{
    ArchiveRepository, CreateInspectionRequest, DeletionOutcome, Error, InspectionRepository,
    IntakeFileRequest, ObservationRepository,
};

fn inspection_req(actor: Uuid) -> CreateInspectionRequest {
    CreateInspectionRequest {
        machine_ref: Uuid::new_v4(),
        serial_number: "SN-2209".to_string(),
        engine_serial: Some("ENG-77".to_string()),
        cabin: Some(false),
        hour_meter: Some(320),
        started_at: Some(Utc::now()),
        created_by: actor,
    }
}

async fn count_rows(pool: &sqlx::PgPool, sql: &str, id: Uuid) -> i64 {
    sqlx::query_scalar(sql)
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("count query should succeed")
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_draft_delete_purges_whole_aggregate() {
    let test_db = TestDatabase::new().await;
    let actor = Uuid::new_v4();

    let inspection = test_db
        .db
        .inspections
        .create(inspection_req(actor))
        .await
        .unwrap();
    let chain = seed_checklist_chain(&test_db.pool, inspection.id).await;
    let observation_id = seed_observation(&test_db.pool, chain.result_record_id, actor).await;

    let archive = test_db
        .db
        .archives
        .intake_file(IntakeFileRequest {
            name: "grieta.png".to_string(),
            mime_type: "image/png".to_string(),
            data: b"payload bytes for the cascade test".to_vec(),
            created_by: actor,
            observation_id: Some(observation_id),
        })
        .await
        .unwrap();
    let file_path = test_db
        .uploads_root
        .join(archive.storage_path.as_deref().unwrap());
    assert!(file_path.exists());

    let outcome = test_db
        .db
        .inspections
        .delete(inspection.id, actor)
        .await
        .unwrap();
    assert_eq!(outcome, DeletionOutcome::HardDeleted);

    assert!(matches!(
        test_db.db.inspections.get(inspection.id).await,
        Err(Error::InspectionNotFound(_))
    ));
    assert!(matches!(
        test_db.db.observations.get(observation_id).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        test_db.db.archives.get(archive.id).await,
        Err(Error::ArchiveNotFound(_))
    ));
    assert!(!file_path.exists(), "purge must remove the physical file");

    for sql in [
        "SELECT COUNT(*) FROM template_selection WHERE inspection_id = $1",
        "SELECT COUNT(*) FROM inspection_assignment WHERE inspection_id = $1",
    ] {
        assert_eq!(count_rows(&test_db.pool, sql, inspection.id).await, 0);
    }
    assert_eq!(
        count_rows(
            &test_db.pool,
            "SELECT COUNT(*) FROM item_response WHERE template_selection_id = $1",
            chain.template_selection_id,
        )
        .await,
        0
    );
    assert_eq!(
        count_rows(
            &test_db.pool,
            "SELECT COUNT(*) FROM result_record WHERE item_response_id = $1",
            chain.item_response_id,
        )
        .await,
        0
    );

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_finalized_delete_is_soft_and_keeps_children() {
    let test_db = TestDatabase::new().await;
    let actor = Uuid::new_v4();

    let inspection = test_db
        .db
        .inspections
        .create(inspection_req(actor))
        .await
        .unwrap();
    let chain = seed_checklist_chain(&test_db.pool, inspection.id).await;
    test_db
        .db
        .inspections
        .finalize(inspection.id, actor)
        .await
        .unwrap();

    let outcome = test_db
        .db
        .inspections
        .delete(inspection.id, actor)
        .await
        .unwrap();
    assert_eq!(outcome, DeletionOutcome::SoftDeleted);

    let hidden = test_db.db.inspections.get(inspection.id).await.unwrap();
    assert!(hidden.is_deleted());
    assert_eq!(hidden.deleted_by, Some(actor));
    assert_eq!(
        count_rows(
            &test_db.pool,
            "SELECT COUNT(*) FROM template_selection WHERE inspection_id = $1",
            inspection.id,
        )
        .await,
        1,
        "soft delete must leave child rows alone"
    );
    let _ = chain;

    let visible = test_db.db.inspections.list(false).await.unwrap();
    assert!(visible.iter().all(|i| i.id != inspection.id));
    let all = test_db.db.inspections.list(true).await.unwrap();
    assert!(all.iter().any(|i| i.id == inspection.id));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_second_delete_is_a_conflict() {
    let test_db = TestDatabase::new().await;
    let actor = Uuid::new_v4();

    let inspection = test_db
        .db
        .inspections
        .create(inspection_req(actor))
        .await
        .unwrap();
    test_db
        .db
        .inspections
        .finalize(inspection.id, actor)
        .await
        .unwrap();
    test_db
        .db
        .inspections
        .delete(inspection.id, actor)
        .await
        .unwrap();

    let err = test_db
        .db
        .inspections
        .delete(inspection.id, actor)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_reactivate_reverses_soft_delete() {
    let test_db = TestDatabase::new().await;
    let actor = Uuid::new_v4();

    let inspection = test_db
        .db
        .inspections
        .create(inspection_req(actor))
        .await
        .unwrap();
    test_db
        .db
        .inspections
        .finalize(inspection.id, actor)
        .await
        .unwrap();
    test_db
        .db
        .inspections
        .delete(inspection.id, actor)
        .await
        .unwrap();

    let restored = test_db
        .db
        .inspections
        .reactivate(inspection.id, actor)
        .await
        .unwrap();
    assert!(!restored.is_deleted());
    assert!(restored.is_finalized(), "reactivation must not clear finalization");

    let visible = test_db.db.inspections.list(false).await.unwrap();
    assert!(
        visible.iter().any(|i| i.id == inspection.id),
        "reactivated inspection must show up in the default listing again"
    );

    // Reactivating something that is not deleted is a conflict.
    let err = test_db
        .db
        .inspections
        .reactivate(inspection.id, actor)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_finalized_inspection_rejects_mutations() {
    let test_db = TestDatabase::new().await;
    let actor = Uuid::new_v4();

    let inspection = test_db
        .db
        .inspections
        .create(inspection_req(actor))
        .await
        .unwrap();
    test_db
        .db
        .inspections
        .finalize(inspection.id, actor)
        .await
        .unwrap();

    let err = test_db
        .db
        .inspections
        .add_template_selection(inspection.id, Uuid::new_v4(), actor)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    let err = test_db
        .db
        .inspections
        .finalize(inspection.id, actor)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "double finalize must conflict");

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_emptied_observation_without_archives_is_pruned() {
    let test_db = TestDatabase::new().await;
    let actor = Uuid::new_v4();

    let inspection = test_db
        .db
        .inspections
        .create(inspection_req(actor))
        .await
        .unwrap();
    let chain = seed_checklist_chain(&test_db.pool, inspection.id).await;

    let observation = test_db
        .db
        .observations
        .create(chain.result_record_id, "mango de la puerta flojo", actor)
        .await
        .unwrap()
        .expect("non-empty description must create a row");

    let pruned = test_db
        .db
        .observations
        .update(observation.id, "   ", actor)
        .await
        .unwrap();
    assert!(pruned.is_none(), "emptied observation must be pruned");
    assert!(matches!(
        test_db.db.observations.get(observation.id).await,
        Err(Error::NotFound(_))
    ));

    // Empty description at creation time never persists anything.
    let skipped = test_db
        .db
        .observations
        .create(chain.result_record_id, "", actor)
        .await
        .unwrap();
    assert!(skipped.is_none());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_emptied_observation_with_archives_survives() {
    let test_db = TestDatabase::new().await;
    let actor = Uuid::new_v4();

    let inspection = test_db
        .db
        .inspections
        .create(inspection_req(actor))
        .await
        .unwrap();
    let chain = seed_checklist_chain(&test_db.pool, inspection.id).await;
    let observation = test_db
        .db
        .observations
        .create(chain.result_record_id, "fuga de aceite", actor)
        .await
        .unwrap()
        .unwrap();

    test_db
        .db
        .archives
        .intake_file(IntakeFileRequest {
            name: "fuga.png".to_string(),
            mime_type: "image/png".to_string(),
            data: b"oil leak photo bytes".to_vec(),
            created_by: actor,
            observation_id: Some(observation.id),
        })
        .await
        .unwrap();

    let kept = test_db
        .db
        .observations
        .update(observation.id, "", actor)
        .await
        .unwrap();
    assert!(
        kept.is_some(),
        "attached archives must keep the observation alive"
    );
    assert_eq!(kept.unwrap().description, "");

    test_db.cleanup().await;
}

//! Inspection repository and cascade deleter.
//!
//! Deletion follows the inspection's state: a finalized inspection is a
//! completed audit record and is only hidden (soft delete, reversible);
//! a draft is purged outright, together with everything it transitively
//! owns (template selections, item responses, result records,
//! observations, archives, role assignments).
//!
//! The hard-delete path releases archives first — best-effort, outside
//! the transaction, so physical I/O never holds the transaction open —
//! and then removes all database rows atomically in dependency order.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use inspecta_core::{
    new_v7, ArchiveRepository, CreateInspectionRequest, DeletionOutcome, DeletionState, Error,
    Inspection, InspectionAssignment, InspectionRepository, Result, TemplateSelection,
};

use crate::archives::PgArchiveRepository;

const INSPECTION_COLUMNS: &str = "id, machine_ref, serial_number, engine_serial, cabin, \
     hour_meter, started_at, finalized_at, created_by, created_at, modified_by, modified_at, \
     deleted_by, deleted_at";

/// PostgreSQL implementation of InspectionRepository.
pub struct PgInspectionRepository {
    pool: PgPool,
    /// Archive releases during hard delete go through the archive store
    /// so its hash-sharing rules decide each physical file's fate.
    archives: Arc<PgArchiveRepository>,
}

impl PgInspectionRepository {
    /// Create a new PgInspectionRepository with the given pool and
    /// archive store handle.
    pub fn new(pool: PgPool, archives: Arc<PgArchiveRepository>) -> Self {
        Self { pool, archives }
    }

    /// Reject mutations on inspections that left the draft state.
    fn guard_mutable(inspection: &Inspection) -> Result<()> {
        match inspection.deletion_state() {
            DeletionState::Active => Ok(()),
            DeletionState::FinalizedActive => Err(Error::Conflict(format!(
                "Inspection {} is finalized and no longer accepts changes",
                inspection.id
            ))),
            DeletionState::SoftDeleted => Err(Error::Conflict(format!(
                "Inspection {} is deleted",
                inspection.id
            ))),
        }
    }

    /// Every archive transitively owned by an inspection, via
    /// template selections → item responses → result records →
    /// observations.
    async fn owned_archive_ids(&self, inspection_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT a.id
            FROM archive a
            JOIN observation o ON a.observation_id = o.id
            JOIN result_record rr ON o.result_record_id = rr.id
            JOIN item_response ir ON rr.item_response_id = ir.id
            JOIN template_selection ts ON ir.template_selection_id = ts.id
            WHERE ts.inspection_id = $1
            "#,
        )
        .bind(inspection_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(ids)
    }

    /// Purge the whole aggregate in one transaction, children first.
    async fn hard_delete_rows(&self, inspection_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            r#"
            DELETE FROM observation WHERE result_record_id IN (
                SELECT rr.id
                FROM result_record rr
                JOIN item_response ir ON rr.item_response_id = ir.id
                JOIN template_selection ts ON ir.template_selection_id = ts.id
                WHERE ts.inspection_id = $1
            )
            "#,
        )
        .bind(inspection_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query("DELETE FROM inspection_assignment WHERE inspection_id = $1")
            .bind(inspection_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        sqlx::query(
            r#"
            DELETE FROM result_record WHERE item_response_id IN (
                SELECT ir.id
                FROM item_response ir
                JOIN template_selection ts ON ir.template_selection_id = ts.id
                WHERE ts.inspection_id = $1
            )
            "#,
        )
        .bind(inspection_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query(
            "DELETE FROM item_response WHERE template_selection_id IN (
                 SELECT id FROM template_selection WHERE inspection_id = $1
             )",
        )
        .bind(inspection_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query("DELETE FROM template_selection WHERE inspection_id = $1")
            .bind(inspection_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        sqlx::query("DELETE FROM inspection WHERE id = $1")
            .bind(inspection_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }
}

#[async_trait]
impl InspectionRepository for PgInspectionRepository {
    async fn create(&self, req: CreateInspectionRequest) -> Result<Inspection> {
        let row = sqlx::query(&format!(
            "INSERT INTO inspection \
                 (id, machine_ref, serial_number, engine_serial, cabin, hour_meter, \
                  started_at, created_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, NOW()), $8, NOW()) \
             RETURNING {}",
            INSPECTION_COLUMNS
        ))
        .bind(new_v7())
        .bind(req.machine_ref)
        .bind(&req.serial_number)
        .bind(req.engine_serial.as_deref())
        .bind(req.cabin)
        .bind(req.hour_meter)
        .bind(req.started_at)
        .bind(req.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        inspection_from_row(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Inspection> {
        // Soft-deleted rows stay visible here; the state machine and the
        // admin listing need them.
        let row = sqlx::query(&format!(
            "SELECT {} FROM inspection WHERE id = $1",
            INSPECTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::InspectionNotFound(id))?;

        inspection_from_row(&row)
    }

    async fn list(&self, include_deleted: bool) -> Result<Vec<Inspection>> {
        let filter = if include_deleted {
            ""
        } else {
            "WHERE deleted_at IS NULL"
        };
        let rows = sqlx::query(&format!(
            "SELECT {} FROM inspection {} ORDER BY id DESC",
            INSPECTION_COLUMNS, filter
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(inspection_from_row).collect()
    }

    async fn finalize(&self, id: Uuid, actor: Uuid) -> Result<Inspection> {
        let inspection = self.get(id).await?;
        Self::guard_mutable(&inspection)?;

        let row = sqlx::query(&format!(
            "UPDATE inspection SET finalized_at = NOW(), modified_by = $1, modified_at = NOW() \
             WHERE id = $2 RETURNING {}",
            INSPECTION_COLUMNS
        ))
        .bind(actor)
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "inspections",
            op = "finalize",
            inspection_id = %id,
            "Inspection finalized"
        );
        inspection_from_row(&row)
    }

    async fn delete(&self, id: Uuid, actor: Uuid) -> Result<DeletionOutcome> {
        let inspection = self.get(id).await?;

        match inspection.deletion_state() {
            DeletionState::SoftDeleted => Err(Error::Conflict(format!(
                "Inspection {} is already deleted",
                id
            ))),
            DeletionState::FinalizedActive => {
                // Completed audit record: hide it, keep every child row.
                sqlx::query(
                    "UPDATE inspection SET deleted_by = $1, deleted_at = NOW() WHERE id = $2",
                )
                .bind(actor)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;

                info!(
                    subsystem = "db",
                    component = "cascade_delete",
                    op = "soft_delete",
                    inspection_id = %id,
                    actor = %actor,
                    "Finalized inspection soft-deleted"
                );
                Ok(DeletionOutcome::SoftDeleted)
            }
            DeletionState::Active => {
                let start = Instant::now();

                // Physical releases run before the row transaction so
                // filesystem I/O never holds it open. One failed release
                // must not strand the rest of the purge.
                let archive_ids = self.owned_archive_ids(id).await?;
                let archive_count = archive_ids.len();
                for archive_id in archive_ids {
                    if let Err(e) = self.archives.release(archive_id, actor).await {
                        warn!(
                            subsystem = "db",
                            component = "cascade_delete",
                            op = "hard_delete",
                            inspection_id = %id,
                            archive_id = %archive_id,
                            error = %e,
                            "Archive release failed during cascade, continuing"
                        );
                    }
                }

                self.hard_delete_rows(id).await?;

                info!(
                    subsystem = "db",
                    component = "cascade_delete",
                    op = "hard_delete",
                    inspection_id = %id,
                    actor = %actor,
                    archive_count,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Draft inspection purged"
                );
                Ok(DeletionOutcome::HardDeleted)
            }
        }
    }

    async fn reactivate(&self, id: Uuid, actor: Uuid) -> Result<Inspection> {
        let inspection = self.get(id).await?;
        if !inspection.is_deleted() {
            return Err(Error::Conflict(format!(
                "Inspection {} is not deleted",
                id
            )));
        }

        let row = sqlx::query(&format!(
            "UPDATE inspection SET deleted_by = NULL, deleted_at = NULL, \
                 modified_by = $1, modified_at = NOW() \
             WHERE id = $2 RETURNING {}",
            INSPECTION_COLUMNS
        ))
        .bind(actor)
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "inspections",
            op = "reactivate",
            inspection_id = %id,
            actor = %actor,
            "Soft-deleted inspection reactivated"
        );
        inspection_from_row(&row)
    }

    async fn add_template_selection(
        &self,
        inspection_id: Uuid,
        template_ref: Uuid,
        actor: Uuid,
    ) -> Result<TemplateSelection> {
        let inspection = self.get(inspection_id).await?;
        Self::guard_mutable(&inspection)?;

        let row = sqlx::query(
            "INSERT INTO template_selection (id, inspection_id, template_ref) \
             VALUES ($1, $2, $3) RETURNING id, inspection_id, template_ref",
        )
        .bind(new_v7())
        .bind(inspection_id)
        .bind(template_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        sqlx::query("UPDATE inspection SET modified_by = $1, modified_at = NOW() WHERE id = $2")
            .bind(actor)
            .bind(inspection_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(TemplateSelection {
            id: row.get("id"),
            inspection_id: row.get("inspection_id"),
            template_ref: row.get("template_ref"),
        })
    }

    async fn set_assignments(
        &self,
        inspection_id: Uuid,
        assignments: Vec<InspectionAssignment>,
        actor: Uuid,
    ) -> Result<()> {
        let inspection = self.get(inspection_id).await?;
        Self::guard_mutable(&inspection)?;

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("DELETE FROM inspection_assignment WHERE inspection_id = $1")
            .bind(inspection_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        for assignment in &assignments {
            sqlx::query(
                "INSERT INTO inspection_assignment (inspection_id, user_ref, role) \
                 VALUES ($1, $2, $3)",
            )
            .bind(inspection_id)
            .bind(assignment.user_ref)
            .bind(&assignment.role)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        sqlx::query("UPDATE inspection SET modified_by = $1, modified_at = NOW() WHERE id = $2")
            .bind(actor)
            .bind(inspection_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }
}

/// Convert a database row to an Inspection.
fn inspection_from_row(row: &sqlx::postgres::PgRow) -> Result<Inspection> {
    Ok(Inspection {
        id: row.get("id"),
        machine_ref: row.get("machine_ref"),
        serial_number: row.get("serial_number"),
        engine_serial: row.get("engine_serial"),
        cabin: row.get("cabin"),
        hour_meter: row.get("hour_meter"),
        started_at: row.get("started_at"),
        finalized_at: row.get("finalized_at"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        modified_by: row.get("modified_by"),
        modified_at: row.get("modified_at"),
        deleted_by: row.get("deleted_by"),
        deleted_at: row.get("deleted_at"),
    })
}

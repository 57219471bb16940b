//! Observation repository implementation.
//!
//! Observations exist only while they carry content: creation is lazy
//! (empty descriptions create nothing) and an update that would leave an
//! observation with no description and no attached archives deletes the
//! row instead of persisting it empty.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use inspecta_core::{new_v7, Error, Observation, ObservationRepository, Result};

use crate::archives::PgArchiveRepository;
use inspecta_core::ArchiveRepository;

const OBSERVATION_COLUMNS: &str =
    "id, result_record_id, description, created_by, created_at, modified_by, modified_at";

/// PostgreSQL implementation of ObservationRepository.
pub struct PgObservationRepository {
    pool: PgPool,
    /// Release path for archives attached to a pruned/deleted observation.
    archives: std::sync::Arc<PgArchiveRepository>,
}

impl PgObservationRepository {
    /// Create a new repository; archive deletion is delegated to the
    /// archive store so its hash-sharing rules apply.
    pub fn new(pool: PgPool, archives: std::sync::Arc<PgArchiveRepository>) -> Self {
        Self { pool, archives }
    }

    /// Ids of all archives attached to an observation.
    async fn attached_archive_ids(&self, observation_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar("SELECT id FROM archive WHERE observation_id = $1")
            .bind(observation_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(ids)
    }
}

#[async_trait]
impl ObservationRepository for PgObservationRepository {
    async fn create(
        &self,
        result_record_id: Uuid,
        description: &str,
        actor: Uuid,
    ) -> Result<Option<Observation>> {
        let description = description.trim();
        if description.is_empty() {
            // Lazy creation: nothing to persist without content.
            return Ok(None);
        }

        let row = sqlx::query(&format!(
            "INSERT INTO observation (id, result_record_id, description, created_by, created_at) \
             VALUES ($1, $2, $3, $4, NOW()) RETURNING {}",
            OBSERVATION_COLUMNS
        ))
        .bind(new_v7())
        .bind(result_record_id)
        .bind(description)
        .bind(actor)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Some(observation_from_row(&row)?))
    }

    async fn get(&self, id: Uuid) -> Result<Observation> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM observation WHERE id = $1",
            OBSERVATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("Observation {} not found", id)))?;

        observation_from_row(&row)
    }

    async fn update(
        &self,
        id: Uuid,
        description: &str,
        actor: Uuid,
    ) -> Result<Option<Observation>> {
        // Existence check up front so a bad id is a 404, not a silent no-op.
        self.get(id).await?;

        let description = description.trim();
        if description.is_empty() {
            let archive_ids = self.attached_archive_ids(id).await?;
            if archive_ids.is_empty() {
                // No content left at all: prune instead of persisting empty.
                sqlx::query("DELETE FROM observation WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(Error::Database)?;
                debug!(
                    subsystem = "db",
                    component = "observations",
                    op = "update",
                    observation_id = %id,
                    "Observation emptied with no archives, pruned"
                );
                return Ok(None);
            }
        }

        let row = sqlx::query(&format!(
            "UPDATE observation SET description = $1, modified_by = $2, modified_at = NOW() \
             WHERE id = $3 RETURNING {}",
            OBSERVATION_COLUMNS
        ))
        .bind(description)
        .bind(actor)
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Some(observation_from_row(&row)?))
    }

    async fn delete(&self, id: Uuid, actor: Uuid) -> Result<()> {
        self.get(id).await?;

        // Release attachments first so hash-sharing decides the fate of
        // each physical file; a failing release must not strand the rest.
        for archive_id in self.attached_archive_ids(id).await? {
            if let Err(e) = self.archives.release(archive_id, actor).await {
                tracing::warn!(
                    subsystem = "db",
                    component = "observations",
                    op = "delete",
                    observation_id = %id,
                    archive_id = %archive_id,
                    error = %e,
                    "Archive release failed during observation deletion, continuing"
                );
            }
        }

        sqlx::query("DELETE FROM observation WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}

/// Convert a database row to an Observation.
fn observation_from_row(row: &sqlx::postgres::PgRow) -> Result<Observation> {
    Ok(Observation {
        id: row.get("id"),
        result_record_id: row.get("result_record_id"),
        description: row.get("description"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        modified_by: row.get("modified_by"),
        modified_at: row.get("modified_at"),
    })
}

//! Repository traits for inspecta abstractions.
//!
//! These traits define the interfaces that concrete persistence
//! implementations must satisfy, enabling pluggable backends and
//! testability. Every implementation receives its dependencies (pool,
//! storage backend, uploads root) by construction — no ambient state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::category::Category;
use crate::error::Result;
use crate::models::*;

// =============================================================================
// ARCHIVE STORE
// =============================================================================

/// Request for storing an uploaded file.
#[derive(Debug, Clone)]
pub struct IntakeFileRequest {
    /// Declared file name (extension is reused for the canonical name).
    pub name: String,
    /// Declared MIME type; validated against the allow-list.
    pub mime_type: String,
    /// Payload bytes as received from the multipart stream.
    pub data: Vec<u8>,
    pub created_by: Uuid,
    pub observation_id: Option<Uuid>,
}

/// Request for saving an external URL reference.
#[derive(Debug, Clone)]
pub struct IntakeUrlRequest {
    pub url: String,
    pub name: String,
    pub created_by: Uuid,
    pub observation_id: Option<Uuid>,
}

/// Request for listing archives.
#[derive(Debug, Clone, Default)]
pub struct ListArchivesRequest {
    pub category: Option<Category>,
    pub observation_id: Option<Uuid>,
    /// 1-based page number; defaults to 1.
    pub page: Option<i64>,
    /// Page size; defaults to 20, capped at [`MAX_PAGE_LIMIT`].
    pub limit: Option<i64>,
}

/// Hard cap on the archive listing page size.
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Default archive listing page size.
pub const DEFAULT_PAGE_LIMIT: i64 = 20;

/// Response for listing archives.
#[derive(Debug, Clone)]
pub struct ListArchivesResponse {
    pub archives: Vec<Archive>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// Partial update of archive metadata.
#[derive(Debug, Clone, Default)]
pub struct UpdateArchiveRequest {
    pub name: Option<String>,
    /// Outer `None` leaves the link unchanged; `Some(None)` clears it;
    /// `Some(Some(id))` re-points the record.
    pub observation_id: Option<Option<Uuid>>,
}

/// Deduplicated, reference-counted storage of inspection artifacts.
#[async_trait]
pub trait ArchiveRepository: Send + Sync {
    /// Store an uploaded file, deduplicating by content hash.
    async fn intake_file(&self, req: IntakeFileRequest) -> Result<Archive>;

    /// Save an external URL reference, deduplicating by URL hash.
    async fn intake_url(&self, req: IntakeUrlRequest) -> Result<Archive>;

    /// Fetch one archive by id.
    async fn get(&self, id: Uuid) -> Result<Archive>;

    /// List archives newest-first with offset pagination.
    async fn list(&self, req: ListArchivesRequest) -> Result<ListArchivesResponse>;

    /// Partially update name and/or observation link.
    async fn update(&self, id: Uuid, req: UpdateArchiveRequest, editor: Uuid) -> Result<Archive>;

    /// Delete one archive record, removing the physical file only when
    /// this is the last record sharing its content hash.
    async fn release(&self, id: Uuid, actor: Uuid) -> Result<()>;

    /// Attach the given archives to another observation, physically
    /// copying (with a derived hash) those already linked elsewhere.
    async fn duplicate_for_observation(
        &self,
        archive_ids: &[Uuid],
        new_observation_id: Uuid,
        actor: Uuid,
    ) -> Result<Vec<Uuid>>;
}

// =============================================================================
// OBSERVATIONS
// =============================================================================

/// Repository for checklist-item observations.
#[async_trait]
pub trait ObservationRepository: Send + Sync {
    /// Create an observation for a result record.
    ///
    /// Returns `None` without persisting anything when the description is
    /// empty — observations exist only when there is content.
    async fn create(
        &self,
        result_record_id: Uuid,
        description: &str,
        actor: Uuid,
    ) -> Result<Option<Observation>>;

    async fn get(&self, id: Uuid) -> Result<Observation>;

    /// Update the description. An update that leaves the observation with
    /// an empty description and no attached archives deletes it instead;
    /// `None` signals that pruning happened.
    async fn update(&self, id: Uuid, description: &str, actor: Uuid)
        -> Result<Option<Observation>>;

    /// Delete an observation and release all archives attached to it.
    async fn delete(&self, id: Uuid, actor: Uuid) -> Result<()>;
}

// =============================================================================
// INSPECTIONS
// =============================================================================

/// Request for creating an inspection.
#[derive(Debug, Clone)]
pub struct CreateInspectionRequest {
    pub machine_ref: Uuid,
    pub serial_number: String,
    pub engine_serial: Option<String>,
    pub cabin: Option<bool>,
    pub hour_meter: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
}

/// Repository for the inspection aggregate, including the cascade deleter.
#[async_trait]
pub trait InspectionRepository: Send + Sync {
    async fn create(&self, req: CreateInspectionRequest) -> Result<Inspection>;

    async fn get(&self, id: Uuid) -> Result<Inspection>;

    /// List inspections newest-first. Soft-deleted rows are hidden unless
    /// `include_deleted` is set (admin listing).
    async fn list(&self, include_deleted: bool) -> Result<Vec<Inspection>>;

    /// Set the completion time, moving the inspection to the finalized
    /// state. Rejected with `Conflict` if already finalized or deleted.
    async fn finalize(&self, id: Uuid, actor: Uuid) -> Result<Inspection>;

    /// Delete per the state machine: soft delete when finalized, full
    /// cascade purge when still a draft, `Conflict` when already deleted.
    async fn delete(&self, id: Uuid, actor: Uuid) -> Result<DeletionOutcome>;

    /// Reverse a soft delete. `Conflict` when the inspection is not
    /// currently soft-deleted.
    async fn reactivate(&self, id: Uuid, actor: Uuid) -> Result<Inspection>;

    /// Attach a checklist template. Rejected with `Conflict` on
    /// finalized inspections.
    async fn add_template_selection(
        &self,
        inspection_id: Uuid,
        template_ref: Uuid,
        actor: Uuid,
    ) -> Result<TemplateSelection>;

    /// Replace the role assignments. Rejected with `Conflict` on
    /// finalized inspections.
    async fn set_assignments(
        &self,
        inspection_id: Uuid,
        assignments: Vec<InspectionAssignment>,
        actor: Uuid,
    ) -> Result<()>;
}

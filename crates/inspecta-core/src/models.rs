//! Core domain models for inspecta.
//!
//! These types are shared across all inspecta crates and represent the
//! inspection aggregate (inspection → template selections → item
//! responses → result records → observations) and the archive records
//! attached to observations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::category::Category;

/// Serde codec serializing an `i64` as a decimal string.
///
/// Byte sizes (and the numeric identifiers of the legacy deployment) can
/// exceed the safe-integer range of JSON consumers, so they travel as
/// strings on the wire in both directions.
pub mod string_i64 {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<i64>().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// ARCHIVE
// =============================================================================

/// A stored artifact: either a physical file or an external URL reference.
///
/// Invariant: exactly one of `storage_path` / `url` is set. Enforced by a
/// CHECK constraint at the persistence layer and by the constructors in
/// the archive repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Archive {
    /// Time-ordered identifier (UUIDv7), used for newest-first pagination.
    pub id: Uuid,
    /// Display name shown in listings; disambiguated on duplication.
    pub name: String,
    pub mime_type: String,
    #[serde(with = "string_i64")]
    pub size_bytes: i64,
    /// Path relative to the uploads root; `None` for URL references.
    pub storage_path: Option<String>,
    /// External URL; `None` for physical files.
    pub url: Option<String>,
    pub category: Category,
    /// Hex SHA-256 of the payload (file bytes or URL string).
    pub content_hash: String,
    pub observation_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub modified_by: Option<Uuid>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl Archive {
    /// Whether this record is backed by bytes on disk.
    pub fn is_physical(&self) -> bool {
        self.storage_path.is_some()
    }
}

// =============================================================================
// OBSERVATION
// =============================================================================

/// Free-text note attached to one checklist-item result, optionally
/// carrying archives.
///
/// Created lazily only when a non-empty description exists; an update
/// that would leave it with no description and no archives deletes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: Uuid,
    pub result_record_id: Uuid,
    pub description: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub modified_by: Option<Uuid>,
    pub modified_at: Option<DateTime<Utc>>,
}

// =============================================================================
// INSPECTION AGGREGATE
// =============================================================================

/// Deletion-relevant state of an inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionState {
    /// Draft: not finalized, not deleted. Deletion purges the aggregate.
    Active,
    /// Completed audit record. Deletion only hides it (soft delete).
    FinalizedActive,
    /// Hidden by a previous soft delete; only reactivation applies.
    SoftDeleted,
}

/// How a delete request was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionOutcome {
    SoftDeleted,
    HardDeleted,
}

/// Root aggregate for one machine-inspection session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inspection {
    pub id: Uuid,
    pub machine_ref: Uuid,
    pub serial_number: String,
    pub engine_serial: Option<String>,
    pub cabin: Option<bool>,
    pub hour_meter: Option<i64>,
    pub started_at: DateTime<Utc>,
    /// Set when the inspection is finalized; gates the delete branch.
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub modified_by: Option<Uuid>,
    pub modified_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Inspection {
    pub fn is_finalized(&self) -> bool {
        self.finalized_at.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn deletion_state(&self) -> DeletionState {
        if self.is_deleted() {
            DeletionState::SoftDeleted
        } else if self.is_finalized() {
            DeletionState::FinalizedActive
        } else {
            DeletionState::Active
        }
    }
}

/// The fact that a checklist template was chosen for an inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSelection {
    pub id: Uuid,
    pub inspection_id: Uuid,
    pub template_ref: Uuid,
}

/// The recorded answer to one checklist item within a template selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResponse {
    pub id: Uuid,
    pub template_selection_id: Uuid,
    pub item_ref: Uuid,
}

/// Compliance outcome for one item response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultOutcome {
    Yes,
    No,
    NotApplicable,
}

impl ResultOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultOutcome::Yes => "yes",
            ResultOutcome::No => "no",
            ResultOutcome::NotApplicable => "not_applicable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "yes" => Some(ResultOutcome::Yes),
            "no" => Some(ResultOutcome::No),
            "not_applicable" => Some(ResultOutcome::NotApplicable),
            _ => None,
        }
    }
}

/// The compliance outcome for one item response, owning zero or one
/// observation (the observation row points back here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: Uuid,
    pub item_response_id: Uuid,
    pub outcome: ResultOutcome,
}

/// A user's role within one inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionAssignment {
    pub inspection_id: Uuid,
    pub user_ref: Uuid,
    pub role: String,
}

//! Inspection HTTP handlers: the deletion state machine, reactivation,
//! and finalization.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;

use inspecta_core::{DeletionOutcome, Inspection, InspectionRepository};

use super::{actor_from_headers, parse_uuid};
use crate::{ApiError, AppState};

/// Inspection metadata as seen by clients.
#[derive(Debug, Serialize)]
pub struct InspectionDto {
    pub id: String,
    #[serde(rename = "maquinaId")]
    pub maquina_id: String,
    #[serde(rename = "numeroSerie")]
    pub numero_serie: String,
    #[serde(rename = "serieMotor", skip_serializing_if = "Option::is_none")]
    pub serie_motor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cabina: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horometro: Option<i64>,
    #[serde(rename = "iniciadaEn")]
    pub iniciada_en: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "finalizadaEn", skip_serializing_if = "Option::is_none")]
    pub finalizada_en: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(rename = "eliminadaEn", skip_serializing_if = "Option::is_none")]
    pub eliminada_en: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<Inspection> for InspectionDto {
    fn from(i: Inspection) -> Self {
        Self {
            id: i.id.to_string(),
            maquina_id: i.machine_ref.to_string(),
            numero_serie: i.serial_number,
            serie_motor: i.engine_serial,
            cabina: i.cabin,
            horometro: i.hour_meter,
            iniciada_en: i.started_at,
            finalizada_en: i.finalized_at,
            eliminada_en: i.deleted_at,
        }
    }
}

/// Delete an inspection per its state: drafts are purged with their whole
/// aggregate, finalized inspections are soft-deleted.
///
/// # Returns
/// - 200 OK with `{success, message}`
/// - 404 Not Found for unknown ids
/// - 409 Conflict when already deleted
pub async fn delete_inspection(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let id = parse_uuid(&id, "id")?;

    let outcome = state.db.inspections.delete(id, actor).await?;
    let message = match outcome {
        DeletionOutcome::HardDeleted => "Inspección eliminada permanentemente",
        DeletionOutcome::SoftDeleted => "Inspección marcada como eliminada",
    };

    Ok(Json(serde_json::json!({
        "success": true,
        "message": message,
    })))
}

/// Reverse a soft delete.
///
/// # Returns
/// - 200 OK with the restored inspection
/// - 409 Conflict when the inspection is not soft-deleted
pub async fn reactivate_inspection(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<InspectionDto>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let id = parse_uuid(&id, "id")?;
    let inspection = state.db.inspections.reactivate(id, actor).await?;
    Ok(Json(inspection.into()))
}

/// Set the completion time, closing the inspection for edits.
///
/// # Returns
/// - 200 OK with the finalized inspection
/// - 409 Conflict when already finalized or deleted
pub async fn finalize_inspection(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<InspectionDto>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let id = parse_uuid(&id, "id")?;
    let inspection = state.db.inspections.finalize(id, actor).await?;
    Ok(Json(inspection.into()))
}

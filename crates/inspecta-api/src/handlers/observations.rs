//! Observation HTTP handlers.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};

use inspecta_core::{Observation, ObservationRepository};

use super::{actor_from_headers, parse_uuid};
use crate::{ApiError, AppState};

/// Request body for updating an observation's description.
#[derive(Debug, Deserialize)]
pub struct UpdateObservationBody {
    pub descripcion: String,
}

/// Observation as seen by clients.
#[derive(Debug, Serialize)]
pub struct ObservationDto {
    pub id: String,
    pub descripcion: String,
    #[serde(rename = "resultadoId")]
    pub resultado_id: String,
}

impl From<Observation> for ObservationDto {
    fn from(o: Observation) -> Self {
        Self {
            id: o.id.to_string(),
            descripcion: o.description,
            resultado_id: o.result_record_id.to_string(),
        }
    }
}

/// Update an observation's description.
///
/// An update that leaves the observation empty with no attached archives
/// deletes it; the response then reports the pruning instead of echoing
/// a row that no longer exists.
///
/// # Returns
/// - 200 OK with the observation, or `{eliminada: true, message}` when pruned
/// - 404 Not Found for unknown ids
pub async fn update_observation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateObservationBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let id = parse_uuid(&id, "id")?;

    match state
        .db
        .observations
        .update(id, &body.descripcion, actor)
        .await?
    {
        Some(observation) => {
            let value = serde_json::to_value(ObservationDto::from(observation))
                .map_err(|e| ApiError::Internal(inspecta_core::Error::from(e)))?;
            Ok(Json(value))
        }
        None => Ok(Json(serde_json::json!({
            "eliminada": true,
            "message": "Observación eliminada por quedar vacía",
        }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_observation_dto_wire_names() {
        let observation = Observation {
            id: Uuid::now_v7(),
            result_record_id: Uuid::now_v7(),
            description: "fisura en el chasis".to_string(),
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            modified_by: None,
            modified_at: None,
        };
        let json = serde_json::to_value(ObservationDto::from(observation.clone())).unwrap();
        assert_eq!(json["descripcion"], serde_json::json!("fisura en el chasis"));
        assert_eq!(
            json["resultadoId"],
            serde_json::json!(observation.result_record_id.to_string())
        );
    }
}

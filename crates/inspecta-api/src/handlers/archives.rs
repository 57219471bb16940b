//! Archive HTTP handlers: upload and URL intake, listing, metadata
//! updates, download, deletion, and duplication onto another observation.
//!
//! Wire field names follow the legacy client contract (`nombre`,
//! `observacionId`, `archivos`); ids and byte sizes always travel as
//! decimal strings.

use axum::{
    extract::{Multipart, Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use uuid::Uuid;

use inspecta_core::{
    Archive, ArchiveRepository, Category, IntakeFileRequest, IntakeUrlRequest,
    ListArchivesRequest, UpdateArchiveRequest,
};

use super::{actor_from_headers, parse_uuid};
use crate::{ApiError, AppState};

// =============================================================================
// REQUEST/RESPONSE TYPES
// =============================================================================

/// Archive metadata as seen by clients.
#[derive(Debug, Serialize)]
pub struct ArchiveDto {
    pub id: String,
    pub nombre: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Decimal string; byte sizes may exceed the JSON safe-integer range.
    pub size: String,
    pub categoria: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "observacionId", skip_serializing_if = "Option::is_none")]
    pub observacion_id: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Archive> for ArchiveDto {
    fn from(a: Archive) -> Self {
        Self {
            id: a.id.to_string(),
            nombre: a.name,
            mime_type: a.mime_type,
            size: a.size_bytes.to_string(),
            categoria: a.category.storage_dir().to_string(),
            url: a.url,
            observacion_id: a.observation_id.map(|o| o.to_string()),
            created_at: a.created_at,
        }
    }
}

/// Request body for saving an external URL reference.
#[derive(Debug, Deserialize)]
pub struct UrlIntakeBody {
    pub url: String,
    pub nombre: String,
    #[serde(rename = "observacionId")]
    pub observacion_id: Option<String>,
}

/// Query parameters for the archive listing.
#[derive(Debug, Deserialize, Default)]
pub struct ListArchivesQuery {
    pub categoria: Option<String>,
    #[serde(rename = "observacionId")]
    pub observacion_id: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Paginated archive listing.
#[derive(Debug, Serialize)]
pub struct ListArchivesDto {
    pub archivos: Vec<ArchiveDto>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
}

/// Request body for partial metadata updates.
///
/// `observacionId` distinguishes absent (leave the link alone) from an
/// explicit `null` (clear the link).
#[derive(Debug, Deserialize)]
pub struct UpdateArchiveBody {
    pub nombre: Option<String>,
    #[serde(
        rename = "observacionId",
        default,
        deserialize_with = "double_option"
    )]
    pub observacion_id: Option<Option<String>>,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Request body for duplicating archives onto another observation.
#[derive(Debug, Deserialize)]
pub struct DuplicateArchivesBody {
    #[serde(rename = "archivoIds")]
    pub archivo_ids: Vec<String>,
    #[serde(rename = "observacionId")]
    pub observacion_id: String,
}

/// Map a multipart read failure to the right status.
///
/// When the body limit layer cuts a chunked upload short, the failure
/// surfaces here as a multipart read error wrapping
/// `http_body_util`'s length-limit error, which must come back as 413
/// rather than a generic 400.
fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if is_length_limit(&err) {
        return ApiError::PayloadTooLarge(
            "multipart payload exceeds the upload limit".to_string(),
        );
    }
    ApiError::BadRequest(format!("malformed multipart body: {}", err))
}

// The limit error type is private to the body stack, so detection walks
// the source chain matching its display text (same approach as the
// duplicate-key detection in the db layer).
fn is_length_limit(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut cause: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = cause {
        if e.to_string().contains("length limit") {
            return true;
        }
        cause = e.source();
    }
    false
}

fn total_pages(total: i64, limit: i64) -> i64 {
    if limit <= 0 {
        return 0;
    }
    (total + limit - 1) / limit
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Upload a file as a new archive.
///
/// Multipart form: `file` part (required) plus optional `observacionId`
/// text field. Identical payloads dedup against the existing record.
///
/// # Returns
/// - 201 Created with archive metadata
/// - 400 Bad Request on missing file part
/// - 413 Payload Too Large beyond MAX_UPLOAD_BYTES
/// - 415 Unsupported Media Type outside the allow-list
pub async fn upload_archive(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ArchiveDto>), ApiError> {
    let actor = actor_from_headers(&headers)?;

    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut observation_id: Option<Uuid> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        match field.name() {
            Some("file") => {
                let name = field
                    .file_name()
                    .map(|s| s.to_string())
                    .ok_or_else(|| ApiError::BadRequest("file part has no filename".to_string()))?;
                let mime_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let data = field.bytes().await.map_err(multipart_error)?.to_vec();
                file = Some((name, mime_type, data));
            }
            Some("observacionId") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("bad observacionId field: {}", e)))?;
                observation_id = Some(parse_uuid(&raw, "observacionId")?);
            }
            _ => {}
        }
    }

    let (name, mime_type, data) =
        file.ok_or_else(|| ApiError::BadRequest("missing 'file' part".to_string()))?;

    if data.len() > state.max_upload_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "upload is {} bytes, limit is {} bytes",
            data.len(),
            state.max_upload_bytes
        )));
    }

    let archive = state
        .db
        .archives
        .intake_file(IntakeFileRequest {
            name,
            mime_type,
            data,
            created_by: actor,
            observation_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(archive.into())))
}

/// Save an external URL as an archive reference.
///
/// # Returns
/// - 201 Created with archive metadata
/// - 400 Bad Request on malformed URL
pub async fn intake_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UrlIntakeBody>,
) -> Result<(StatusCode, Json<ArchiveDto>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let observation_id = body
        .observacion_id
        .as_deref()
        .map(|raw| parse_uuid(raw, "observacionId"))
        .transpose()?;

    let archive = state
        .db
        .archives
        .intake_url(IntakeUrlRequest {
            url: body.url,
            name: body.nombre,
            created_by: actor,
            observation_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(archive.into())))
}

/// List archives newest-first with optional category/observation filters.
pub async fn list_archives(
    State(state): State<AppState>,
    Query(query): Query<ListArchivesQuery>,
) -> Result<Json<ListArchivesDto>, ApiError> {
    let category = query
        .categoria
        .as_deref()
        .map(|raw| {
            Category::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown categoria '{}'", raw)))
        })
        .transpose()?;
    let observation_id = query
        .observacion_id
        .as_deref()
        .map(|raw| parse_uuid(raw, "observacionId"))
        .transpose()?;

    let response = state
        .db
        .archives
        .list(ListArchivesRequest {
            category,
            observation_id,
            page: query.page,
            limit: query.limit,
        })
        .await?;

    Ok(Json(ListArchivesDto {
        total_pages: total_pages(response.total, response.limit),
        archivos: response.archives.into_iter().map(Into::into).collect(),
        total: response.total,
        page: response.page,
        limit: response.limit,
    }))
}

/// Fetch one archive's metadata.
pub async fn get_archive(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ArchiveDto>, ApiError> {
    let id = parse_uuid(&id, "id")?;
    let archive = state.db.archives.get(id).await?;
    Ok(Json(archive.into()))
}

/// Partially update an archive's name and/or observation link.
pub async fn update_archive(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateArchiveBody>,
) -> Result<Json<ArchiveDto>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let id = parse_uuid(&id, "id")?;
    let observation_id = match body.observacion_id {
        None => None,
        Some(None) => Some(None),
        Some(Some(raw)) => Some(Some(parse_uuid(&raw, "observacionId")?)),
    };

    if body.nombre.is_none() && observation_id.is_none() {
        return Err(ApiError::BadRequest("nothing to update".to_string()));
    }

    let archive = state
        .db
        .archives
        .update(
            id,
            UpdateArchiveRequest {
                name: body.nombre,
                observation_id,
            },
            actor,
        )
        .await?;
    Ok(Json(archive.into()))
}

/// Release one archive record.
///
/// The physical file disappears only when this was the last record
/// sharing its content hash.
pub async fn delete_archive(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let id = parse_uuid(&id, "id")?;
    state.db.archives.release(id, actor).await?;
    Ok(Json(serde_json::json!({
        "message": "Archivo eliminado correctamente"
    })))
}

/// Download an archive's content.
///
/// URL-backed records redirect to the external URL; file-backed records
/// stream from disk with Range support.
pub async fn download_archive(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Request,
) -> Result<Response, ApiError> {
    let id = parse_uuid(&id, "id")?;
    let archive = state.db.archives.get(id).await?;

    if let Some(url) = &archive.url {
        return Ok(Redirect::temporary(url).into_response());
    }

    let storage_path = archive
        .storage_path
        .as_deref()
        .ok_or_else(|| ApiError::Internal(inspecta_core::Error::Internal(format!(
            "archive {} has neither url nor storage path",
            id
        ))))?;
    let absolute = state.uploads_root.join(storage_path);

    // ServeFile handles Range/If-Modified-Since and content type.
    let served = ServeFile::new(&absolute)
        .oneshot(request)
        .await
        .map_err(|err| -> ApiError { match err {} })?;
    let mut response = served.map(axum::body::Body::new);

    let disposition = format!("attachment; filename=\"{}\"", archive.name.replace('"', ""));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// Attach the given archives to another observation, copying those that
/// are already linked elsewhere.
pub async fn duplicate_archives(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DuplicateArchivesBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let observation_id = parse_uuid(&body.observacion_id, "observacionId")?;
    let archive_ids = body
        .archivo_ids
        .iter()
        .map(|raw| parse_uuid(raw, "archivoIds"))
        .collect::<Result<Vec<_>, _>>()?;
    if archive_ids.is_empty() {
        return Err(ApiError::BadRequest("archivoIds must not be empty".to_string()));
    }

    let ids = state
        .db
        .archives
        .duplicate_for_observation(&archive_ids, observation_id, actor)
        .await?;

    Ok(Json(serde_json::json!({
        "archivoIds": ids.iter().map(|i| i.to_string()).collect::<Vec<_>>()
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_archive() -> Archive {
        Archive {
            id: Uuid::now_v7(),
            name: "foto-motor.png".to_string(),
            mime_type: "image/png".to_string(),
            size_bytes: 9_007_199_254_740_993,
            storage_path: Some("imagen/abcd.png".to_string()),
            url: None,
            category: Category::Image,
            content_hash: "ab".repeat(32),
            observation_id: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            modified_by: None,
            modified_at: None,
        }
    }

    #[test]
    fn test_archive_dto_serializes_size_as_string() {
        let dto = ArchiveDto::from(sample_archive());
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["size"], serde_json::json!("9007199254740993"));
        assert_eq!(json["categoria"], serde_json::json!("imagen"));
        assert!(json["id"].is_string());
        assert!(json.get("url").is_none(), "absent url must be omitted");
    }

    #[test]
    fn test_archive_dto_keeps_observation_link() {
        let mut archive = sample_archive();
        let obs = Uuid::new_v4();
        archive.observation_id = Some(obs);
        let json = serde_json::to_value(ArchiveDto::from(archive)).unwrap();
        assert_eq!(json["observacionId"], serde_json::json!(obs.to_string()));
    }

    #[test]
    fn test_total_pages_rounds_up() {
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(1, 20), 1);
        assert_eq!(total_pages(20, 20), 1);
        assert_eq!(total_pages(21, 20), 2);
        assert_eq!(total_pages(10, 0), 0);
    }

    #[test]
    fn test_update_body_distinguishes_absent_from_null() {
        let absent: UpdateArchiveBody = serde_json::from_str(r#"{"nombre":"x"}"#).unwrap();
        assert_eq!(absent.observacion_id, None);

        let null: UpdateArchiveBody =
            serde_json::from_str(r#"{"observacionId":null}"#).unwrap();
        assert_eq!(null.observacion_id, Some(None));

        let set: UpdateArchiveBody =
            serde_json::from_str(r#"{"observacionId":"0191e6a0-0000-7000-8000-000000000001"}"#)
                .unwrap();
        assert_eq!(
            set.observacion_id,
            Some(Some("0191e6a0-0000-7000-8000-000000000001".to_string()))
        );
    }

    #[test]
    fn test_length_limit_detected_through_source_chain() {
        #[derive(Debug)]
        struct Outer(Inner);
        #[derive(Debug)]
        struct Inner;

        impl std::fmt::Display for Outer {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "error reading request body")
            }
        }
        impl std::fmt::Display for Inner {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "length limit exceeded")
            }
        }
        impl std::error::Error for Outer {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                Some(&self.0)
            }
        }
        impl std::error::Error for Inner {}

        #[derive(Debug)]
        struct Plain;
        impl std::fmt::Display for Plain {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "multipart boundary missing")
            }
        }
        impl std::error::Error for Plain {}

        assert!(is_length_limit(&Outer(Inner)));
        assert!(!is_length_limit(&Plain));
    }

    #[test]
    fn test_list_query_wire_names() {
        let query: ListArchivesQuery =
            serde_json::from_str(r#"{"categoria":"pdf","observacionId":null,"page":2}"#).unwrap();
        assert_eq!(query.categoria.as_deref(), Some("pdf"));
        assert_eq!(query.page, Some(2));
        assert_eq!(query.limit, None);
    }

    #[test]
    fn test_duplicate_body_wire_names() {
        let body: DuplicateArchivesBody = serde_json::from_str(
            r#"{"archivoIds":["0191e6a0-0000-7000-8000-000000000001"],"observacionId":"0191e6a0-0000-7000-8000-000000000002"}"#,
        )
        .unwrap();
        assert_eq!(body.archivo_ids.len(), 1);
    }
}

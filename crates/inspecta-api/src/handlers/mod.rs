//! HTTP request handlers.

pub mod archives;
pub mod inspections;
pub mod observations;

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::ApiError;

/// Header carrying the acting user's id. Authentication itself happens
/// upstream; this service only records who acted.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Extract the acting user from the request headers.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let raw = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("X-User-Id header is required".to_string()))?;
    Uuid::parse_str(raw)
        .map_err(|_| ApiError::BadRequest(format!("X-User-Id '{}' is not a valid UUID", raw)))
}

/// Parse a UUID path/body parameter, reporting which field was bad.
pub fn parse_uuid(raw: &str, field: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw)
        .map_err(|_| ApiError::BadRequest(format!("{} '{}' is not a valid UUID", field, raw)))
}

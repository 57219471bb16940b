//! inspecta-api - HTTP API server for inspecta

mod handlers;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inspecta_db::Database;

use handlers::{
    archives::{
        delete_archive, download_archive, duplicate_archives, get_archive, intake_url,
        list_archives, update_archive, upload_archive,
    },
    inspections::{delete_inspection, finalize_inspection, reactivate_inspection},
    observations::update_observation,
};

/// Default cap on upload payloads (50 MB), overridable via MAX_UPLOAD_BYTES.
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    /// Base directory holding the physical archive files; download
    /// streaming resolves relative storage paths against it.
    pub uploads_root: PathBuf,
    pub max_upload_bytes: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    //
    // Environment variables:
    //   LOG_FORMAT - "json" or "text" (default: "text")
    //   RUST_LOG   - standard env filter (default: "inspecta_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "inspecta_api=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(env_filter);
    if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // Get configuration from environment
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/inspecta".to_string());
    let uploads_root = PathBuf::from(
        std::env::var("UPLOADS_ROOT").unwrap_or_else(|_| "/var/lib/inspecta/uploads".to_string()),
    );
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let max_upload_bytes: usize = std::env::var("MAX_UPLOAD_BYTES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

    // Connect to database (pool sizing via DB_* env vars)
    info!("Connecting to database...");
    let db = Database::connect_with_config(
        &database_url,
        inspecta_db::PoolConfig::from_env(),
        &uploads_root,
    )
    .await?;
    info!("Database connected");

    // Run pending database migrations on startup
    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    // Verify the uploads root is actually writable before serving traffic
    let backend = inspecta_db::FilesystemBackend::new(&uploads_root);
    backend
        .validate()
        .await
        .map_err(|e| anyhow::anyhow!("uploads root validation failed: {}", e))?;
    info!("Uploads root validated at {}", uploads_root.display());

    let state = AppState {
        db: Arc::new(db),
        uploads_root,
        max_upload_bytes,
    };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/archivos/upload", post(upload_archive))
        .route("/api/archivos/url", post(intake_url))
        .route("/api/archivos", get(list_archives))
        .route("/api/archivos/duplicar", post(duplicate_archives))
        .route(
            "/api/archivos/:id",
            get(get_archive).patch(update_archive).delete(delete_archive),
        )
        .route("/api/archivos/:id/download", get(download_archive))
        .route("/api/inspecciones/:id", delete(delete_inspection))
        .route("/api/inspecciones/:id/reactivar", post(reactivate_inspection))
        .route("/api/inspecciones/:id/finalizar", post(finalize_inspection))
        .route("/api/observaciones/:id", put(update_observation))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        // Multipart bodies carry some framing overhead beyond the payload.
        .layer(RequestBodyLimitLayer::new(max_upload_bytes + 64 * 1024))
        .with_state(state);

    let addr: SocketAddr = bind_addr.parse()?;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Liveness probe.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    UnsupportedMediaType(String),
    PayloadTooLarge(String),
    NotFound(String),
    Conflict(String),
    Internal(inspecta_core::Error),
}

impl From<inspecta_core::Error> for ApiError {
    fn from(err: inspecta_core::Error) -> Self {
        use inspecta_core::Error;
        match err {
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::UnsupportedMediaType(mime) => {
                ApiError::UnsupportedMediaType(format!("Unsupported media type: {}", mime))
            }
            Error::PayloadTooLarge(msg) => ApiError::PayloadTooLarge(msg),
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::ArchiveNotFound(id) => ApiError::NotFound(format!("Archive {} not found", id)),
            Error::InspectionNotFound(id) => {
                ApiError::NotFound(format!("Inspection {} not found", id))
            }
            Error::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, reason, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad Request", msg),
            ApiError::UnsupportedMediaType(msg) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "Unsupported Media Type",
                msg,
            ),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large", msg)
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not Found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", msg),
            ApiError::Internal(err) => {
                // Detail stays in the logs; the client gets a generic line.
                error!(error = %err, "Internal error serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(serde_json::json!({
            "statusCode": status.as_u16(),
            "error": reason,
            "message": message,
        }));

        (status, body).into_response()
    }
}

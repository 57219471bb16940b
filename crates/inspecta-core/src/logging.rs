//! Structured logging field name constants for inspecta.
//!
//! All crates use these constants for consistent structured logging
//! fields, so log aggregation tools can query by standardized names
//! across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data |

/// Subsystem originating the log event.
/// Values: "api", "db", "storage"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "archive_store", "cascade_delete", "pool", "fs_backend"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "intake_file", "release", "hard_delete"
pub const OPERATION: &str = "op";

/// Archive UUID being operated on.
pub const ARCHIVE_ID: &str = "archive_id";

/// Inspection UUID being operated on.
pub const INSPECTION_ID: &str = "inspection_id";

/// Observation UUID being operated on.
pub const OBSERVATION_ID: &str = "observation_id";

/// Content hash driving a dedup decision.
pub const CONTENT_HASH: &str = "content_hash";

/// Number of archive rows sharing a content hash.
pub const SHARE_COUNT: &str = "share_count";

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Payload size in bytes.
pub const SIZE_BYTES: &str = "size_bytes";

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

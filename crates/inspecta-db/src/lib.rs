//! # inspecta-db
//!
//! PostgreSQL persistence layer for inspecta.
//!
//! This crate provides:
//! - Connection pool management
//! - The deduplicated, hash-shared archive store over a pluggable
//!   filesystem backend
//! - Observation and inspection repositories, including the
//!   state-dependent cascade deleter
//!
//! ## Example
//!
//! ```rust,ignore
//! use inspecta_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/inspecta", "/var/lib/inspecta/uploads")
//!         .await?;
//!
//!     let inspection = db.inspections.get(some_id).await?;
//!     println!("inspection {} started {}", inspection.id, inspection.started_at);
//!     Ok(())
//! }
//! ```

pub mod archives;
pub mod inspections;
pub mod observations;
pub mod pool;
pub mod storage;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

use std::path::Path;
use std::sync::Arc;

// Re-export core types
pub use inspecta_core::*;

pub use archives::PgArchiveRepository;
pub use inspections::PgInspectionRepository;
pub use observations::PgObservationRepository;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use storage::{FilesystemBackend, StorageBackend};

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Embedded schema migrations, applied with [`Database::migrate`].
#[cfg(feature = "migrations")]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Archive store; shared because observations and inspections release
    /// archives through it during their own deletes.
    pub archives: Arc<PgArchiveRepository>,
    /// Observation repository.
    pub observations: PgObservationRepository,
    /// Inspection repository and cascade deleter.
    pub inspections: PgInspectionRepository,
}

impl Database {
    /// Connect with default pool settings. `uploads_root` is the base
    /// directory for physical archive files.
    pub async fn connect(database_url: &str, uploads_root: impl AsRef<Path>) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        Ok(Self::from_pool(pool, uploads_root))
    }

    /// Connect with explicit pool settings.
    pub async fn connect_with_config(
        database_url: &str,
        config: PoolConfig,
        uploads_root: impl AsRef<Path>,
    ) -> Result<Self> {
        let pool = create_pool_with_config(database_url, config).await?;
        Ok(Self::from_pool(pool, uploads_root))
    }

    /// Assemble the repository set over an existing pool.
    pub fn from_pool(pool: sqlx::PgPool, uploads_root: impl AsRef<Path>) -> Self {
        let backend = FilesystemBackend::new(uploads_root.as_ref());
        let archives = Arc::new(PgArchiveRepository::new(pool.clone(), backend));
        let observations = PgObservationRepository::new(pool.clone(), Arc::clone(&archives));
        let inspections = PgInspectionRepository::new(pool.clone(), Arc::clone(&archives));
        Self {
            pool,
            archives,
            observations,
            inspections,
        }
    }

    /// Apply pending schema migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| Error::Config(format!("Migration failed: {}", e)))?;
        Ok(())
    }
}

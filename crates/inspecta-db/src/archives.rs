//! Archive store: deduplicated, reference-counted artifact storage.
//!
//! Every payload (file bytes or URL string) is fingerprinted with
//! SHA-256. Identical payloads resolve to one physical storage slot named
//! `<category>/<hash><ext>`; attaching the same content to different
//! observations produces additional metadata rows pointing at the shared
//! path. Releasing a record removes the physical file only when it is the
//! last row referencing its hash.
//!
//! Hash-level decisions (intake dedup, last-reference detection) run
//! under a Postgres advisory transaction lock keyed on the content hash,
//! which serializes concurrent intakes and releases of the same payload.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use inspecta_core::{
    category, derived_copy_hash, hash_url, new_v7, Archive, ArchiveRepository, Category, Error,
    IntakeFileRequest, IntakeUrlRequest, ListArchivesRequest, ListArchivesResponse, Result,
    Sha256Stream, UpdateArchiveRequest, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};

use crate::escape_like;
use crate::storage::StorageBackend;

/// Column list shared by every archive SELECT.
const ARCHIVE_COLUMNS: &str = "id, name, mime_type, size_bytes, storage_path, url, category, \
     content_hash, observation_id, created_by, created_at, modified_by, modified_at";

/// PostgreSQL implementation of the archive store.
pub struct PgArchiveRepository {
    pool: PgPool,
    backend: Box<dyn StorageBackend>,
}

impl PgArchiveRepository {
    /// Create a new repository over the given pool and storage backend.
    pub fn new(pool: PgPool, backend: impl StorageBackend + 'static) -> Self {
        Self {
            pool,
            backend: Box::new(backend),
        }
    }

    /// Take the advisory transaction lock for a content hash.
    ///
    /// Serializes the check-then-act windows of intake and release for
    /// one payload; the lock releases automatically at commit/rollback.
    async fn lock_hash(tx: &mut Transaction<'_, Postgres>, hash: &str) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(hash_lock_key(hash))
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Fetch the oldest archive row carrying the given hash, if any.
    async fn find_by_hash_tx(
        tx: &mut Transaction<'_, Postgres>,
        hash: &str,
    ) -> Result<Option<Archive>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM archive WHERE content_hash = $1 ORDER BY id LIMIT 1",
            ARCHIVE_COLUMNS
        ))
        .bind(hash)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;

        row.map(|r| archive_from_row(&r)).transpose()
    }

    /// Insert a new archive row inside a transaction and return it.
    #[allow(clippy::too_many_arguments)]
    async fn insert_tx(
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
        mime_type: &str,
        size_bytes: i64,
        storage_path: Option<&str>,
        url: Option<&str>,
        cat: Category,
        content_hash: &str,
        observation_id: Option<Uuid>,
        created_by: Uuid,
    ) -> Result<Archive> {
        let row = sqlx::query(&format!(
            "INSERT INTO archive \
                 (id, name, mime_type, size_bytes, storage_path, url, category, \
                  content_hash, observation_id, created_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW()) \
             RETURNING {}",
            ARCHIVE_COLUMNS
        ))
        .bind(new_v7())
        .bind(name)
        .bind(mime_type)
        .bind(size_bytes)
        .bind(storage_path)
        .bind(url)
        .bind(cat.storage_dir())
        .bind(content_hash)
        .bind(observation_id)
        .bind(created_by)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::Database)?;

        archive_from_row(&row)
    }

    /// Shared dedup branch for both intake paths.
    ///
    /// Returns `Some(archive)` when the request is satisfied by an
    /// existing record — either reused as-is (pure dedup) or aliased with
    /// a new row sharing the same physical slot. `None` means no record
    /// with this hash exists and the caller must create the slot.
    async fn resolve_existing_tx(
        tx: &mut Transaction<'_, Postgres>,
        hash: &str,
        name: &str,
        requested_observation: Option<Uuid>,
        created_by: Uuid,
    ) -> Result<Option<Archive>> {
        let existing = match Self::find_by_hash_tx(tx, hash).await? {
            Some(a) => a,
            None => return Ok(None),
        };

        // Pure dedup: no target observation requested, or the existing
        // record already hangs off the requested one.
        if requested_observation.is_none() || existing.observation_id == requested_observation {
            debug!(
                subsystem = "db",
                component = "archive_store",
                op = "intake",
                archive_id = %existing.id,
                content_hash = %hash,
                "Payload already stored, reusing record"
            );
            return Ok(Some(existing));
        }

        // Same payload, different observation: new metadata row pointing
        // at the same physical slot (or the same URL).
        let aliased = Self::insert_tx(
            tx,
            name,
            &existing.mime_type,
            existing.size_bytes,
            existing.storage_path.as_deref(),
            existing.url.as_deref(),
            existing.category,
            hash,
            requested_observation,
            created_by,
        )
        .await?;

        debug!(
            subsystem = "db",
            component = "archive_store",
            op = "intake",
            archive_id = %aliased.id,
            content_hash = %hash,
            "Payload shared across observations, new record aliases existing slot"
        );
        Ok(Some(aliased))
    }

    /// Count how many archive rows currently reference a hash.
    async fn share_count_tx(tx: &mut Transaction<'_, Postgres>, hash: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM archive WHERE content_hash = $1")
            .bind(hash)
            .fetch_one(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(count)
    }
}

#[async_trait]
impl ArchiveRepository for PgArchiveRepository {
    async fn intake_file(&self, req: IntakeFileRequest) -> Result<Archive> {
        if !category::is_allowed(&req.mime_type) {
            return Err(Error::UnsupportedMediaType(req.mime_type));
        }
        let cat = category::classify(&req.mime_type);
        let ext = category::extension_of(&req.name).unwrap_or_default();

        // Persist to a temp name inside the category directory first; the
        // canonical name needs the hash, which needs the full payload.
        let temp_path = format!("{}/.intake-{}", cat.storage_dir(), new_v7());
        self.backend.write(&temp_path, &req.data).await?;

        let size_bytes = req.data.len() as i64;
        let mut hasher = Sha256Stream::new();
        for chunk in req.data.chunks(64 * 1024) {
            hasher.update(chunk);
        }
        let hash = hasher.finalize();

        let outcome = async {
            let mut tx = self.pool.begin().await.map_err(Error::Database)?;
            Self::lock_hash(&mut tx, &hash).await?;

            if let Some(existing) = Self::resolve_existing_tx(
                &mut tx,
                &hash,
                &req.name,
                req.observation_id,
                req.created_by,
            )
            .await?
            {
                tx.commit().await.map_err(Error::Database)?;
                // The slot already holds these bytes.
                let _ = self.backend.delete(&temp_path).await;
                return Ok(existing);
            }

            // First record for this payload: claim the canonical slot.
            let canonical = canonical_storage_path(cat, &hash, &ext);
            self.backend.rename(&temp_path, &canonical).await?;

            let archive = Self::insert_tx(
                &mut tx,
                &req.name,
                &req.mime_type,
                size_bytes,
                Some(&canonical),
                None,
                cat,
                &hash,
                req.observation_id,
                req.created_by,
            )
            .await?;
            tx.commit().await.map_err(Error::Database)?;

            info!(
                subsystem = "db",
                component = "archive_store",
                op = "intake_file",
                archive_id = %archive.id,
                content_hash = %hash,
                size_bytes,
                "Stored new archive payload"
            );
            Ok(archive)
        }
        .await;

        if outcome.is_err() {
            // No partial state on failure; the temp file must not linger.
            let _ = self.backend.delete(&temp_path).await;
        }
        outcome
    }

    async fn intake_url(&self, req: IntakeUrlRequest) -> Result<Archive> {
        let parsed = url::Url::parse(&req.url)
            .map_err(|e| Error::InvalidInput(format!("malformed URL '{}': {}", req.url, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(Error::InvalidInput(format!(
                "URL '{}' has no addressable host",
                req.url
            )));
        }

        let hash = hash_url(&req.url);

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        Self::lock_hash(&mut tx, &hash).await?;

        if let Some(existing) = Self::resolve_existing_tx(
            &mut tx,
            &hash,
            &req.name,
            req.observation_id,
            req.created_by,
        )
        .await?
        {
            tx.commit().await.map_err(Error::Database)?;
            return Ok(existing);
        }

        let archive = Self::insert_tx(
            &mut tx,
            &req.name,
            "text/uri-list",
            0,
            None,
            Some(&req.url),
            Category::Other,
            &hash,
            req.observation_id,
            req.created_by,
        )
        .await?;
        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "archive_store",
            op = "intake_url",
            archive_id = %archive.id,
            "Stored external URL reference"
        );
        Ok(archive)
    }

    async fn get(&self, id: Uuid) -> Result<Archive> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM archive WHERE id = $1",
            ARCHIVE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::ArchiveNotFound(id))?;

        archive_from_row(&row)
    }

    async fn list(&self, req: ListArchivesRequest) -> Result<ListArchivesResponse> {
        let (page, limit, offset) = page_window(req.page, req.limit);

        let mut where_clause = String::from("WHERE 1=1 ");
        let mut param_idx = 1;
        if req.category.is_some() {
            where_clause.push_str(&format!("AND category = ${} ", param_idx));
            param_idx += 1;
        }
        if req.observation_id.is_some() {
            where_clause.push_str(&format!("AND observation_id = ${} ", param_idx));
            param_idx += 1;
        }

        let count_sql = format!("SELECT COUNT(*) FROM archive {}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(cat) = req.category {
            count_query = count_query.bind(cat.storage_dir());
        }
        if let Some(obs) = req.observation_id {
            count_query = count_query.bind(obs);
        }
        let total = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        // UUIDv7 ids are time-ordered, so id DESC is newest-created first.
        let list_sql = format!(
            "SELECT {} FROM archive {} ORDER BY id DESC LIMIT ${} OFFSET ${}",
            ARCHIVE_COLUMNS,
            where_clause,
            param_idx,
            param_idx + 1
        );
        let mut list_query = sqlx::query(&list_sql);
        if let Some(cat) = req.category {
            list_query = list_query.bind(cat.storage_dir());
        }
        if let Some(obs) = req.observation_id {
            list_query = list_query.bind(obs);
        }
        let rows = list_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let mut archives = Vec::with_capacity(rows.len());
        for row in rows {
            archives.push(archive_from_row(&row)?);
        }

        Ok(ListArchivesResponse {
            archives,
            total,
            page,
            limit,
        })
    }

    async fn update(&self, id: Uuid, req: UpdateArchiveRequest, editor: Uuid) -> Result<Archive> {
        // $1 = editor, $2 = id, dynamic params start at $3
        let mut updates: Vec<String> =
            vec!["modified_by = $1".to_string(), "modified_at = NOW()".to_string()];
        let mut param_idx = 3;

        if req.name.is_some() {
            updates.push(format!("name = ${}", param_idx));
            param_idx += 1;
        }
        if req.observation_id.is_some() {
            updates.push(format!("observation_id = ${}", param_idx));
        }

        let sql = format!(
            "UPDATE archive SET {} WHERE id = $2 RETURNING {}",
            updates.join(", "),
            ARCHIVE_COLUMNS
        );

        let mut q = sqlx::query(&sql).bind(editor).bind(id);
        if let Some(name) = &req.name {
            q = q.bind(name);
        }
        if let Some(obs) = req.observation_id {
            // Inner None binds SQL NULL, clearing the observation link.
            q = q.bind(obs);
        }

        let row = q
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::ArchiveNotFound(id))?;

        archive_from_row(&row)
    }

    async fn release(&self, id: Uuid, actor: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM archive WHERE id = $1",
            ARCHIVE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::ArchiveNotFound(id))?;
        let archive = archive_from_row(&row)?;

        Self::lock_hash(&mut tx, &archive.content_hash).await?;

        if let Some(path) = &archive.storage_path {
            let share_count = Self::share_count_tx(&mut tx, &archive.content_hash).await?;
            if share_count <= 1 {
                // Last reference: the bytes go too. A filesystem failure
                // here is logged and swallowed; the metadata deletion
                // proceeds and the stray file is reclaimed out-of-band.
                if let Err(e) = self.backend.delete(path).await {
                    warn!(
                        subsystem = "db",
                        component = "archive_store",
                        op = "release",
                        archive_id = %id,
                        storage_path = %path,
                        error = %e,
                        "Physical file removal failed, continuing with record deletion"
                    );
                }
            } else {
                debug!(
                    subsystem = "db",
                    component = "archive_store",
                    op = "release",
                    archive_id = %id,
                    share_count,
                    "Hash still shared, leaving physical file in place"
                );
            }
        }

        sqlx::query("DELETE FROM archive WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "archive_store",
            op = "release",
            archive_id = %id,
            actor = %actor,
            "Released archive record"
        );
        Ok(())
    }

    async fn duplicate_for_observation(
        &self,
        archive_ids: &[Uuid],
        new_observation_id: Uuid,
        actor: Uuid,
    ) -> Result<Vec<Uuid>> {
        let mut result_ids = Vec::with_capacity(archive_ids.len());

        for &id in archive_ids {
            let archive = self.get(id).await?;

            // Unlinked or already on the target: re-point the record.
            if archive.observation_id.is_none()
                || archive.observation_id == Some(new_observation_id)
            {
                sqlx::query(
                    "UPDATE archive SET observation_id = $1, modified_by = $2, \
                     modified_at = NOW() WHERE id = $3",
                )
                .bind(new_observation_id)
                .bind(actor)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
                result_ids.push(id);
                continue;
            }

            // Linked elsewhere: real copy with a fresh name and a derived
            // hash, so the copy never dedups against the original.
            let existing_names: Vec<String> = sqlx::query_scalar(
                "SELECT name FROM archive WHERE name LIKE $1 ESCAPE '\\'",
            )
            .bind(format!("{}%", escape_like(&archive.name)))
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
            let copy_name = next_available_name(&archive.name, &existing_names);

            let copy_hash = derived_copy_hash(&archive.content_hash, Utc::now());

            let copy_path = if let Some(orig_path) = &archive.storage_path {
                let ext = category::extension_of(orig_path).unwrap_or_default();
                let target = canonical_storage_path(archive.category, &copy_hash, &ext);
                self.backend.copy(orig_path, &target).await?;
                Some(target)
            } else {
                None
            };

            let mut tx = self.pool.begin().await.map_err(Error::Database)?;
            let copy = Self::insert_tx(
                &mut tx,
                &copy_name,
                &archive.mime_type,
                archive.size_bytes,
                copy_path.as_deref(),
                archive.url.as_deref(),
                archive.category,
                &copy_hash,
                Some(new_observation_id),
                actor,
            )
            .await?;
            tx.commit().await.map_err(Error::Database)?;

            info!(
                subsystem = "db",
                component = "archive_store",
                op = "duplicate",
                archive_id = %copy.id,
                source_id = %id,
                observation_id = %new_observation_id,
                "Duplicated archive for observation"
            );
            result_ids.push(copy.id);
        }

        Ok(result_ids)
    }
}

/// Normalize pagination input into `(page, limit, offset)`.
///
/// `limit` is clamped to `1..=MAX_PAGE_LIMIT`; the offset multiplication
/// saturates so an absurd `page` yields an empty page instead of an
/// overflow (a saturated OFFSET is a valid, past-the-end window).
fn page_window(page: Option<i64>, limit: Option<i64>) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let offset = (page - 1).saturating_mul(limit);
    (page, limit, offset)
}

/// Canonical storage slot for a payload: `<category>/<hash><ext>`.
pub fn canonical_storage_path(cat: Category, hash: &str, ext: &str) -> String {
    format!("{}/{}{}", cat.storage_dir(), hash, ext)
}

/// Advisory lock key for a content hash: the first 8 bytes of the hex
/// digest, interpreted big-endian. Collisions only widen the lock scope.
fn hash_lock_key(hash: &str) -> i64 {
    let mut bytes = [0u8; 8];
    for (i, chunk) in bytes.iter_mut().enumerate() {
        let hex_pair = hash.get(i * 2..i * 2 + 2).unwrap_or("00");
        *chunk = u8::from_str_radix(hex_pair, 16).unwrap_or(0);
    }
    i64::from_be_bytes(bytes)
}

/// Pick the next free display name for a duplicate: `Name` → `Name1` →
/// `Name2`, taking max+1 over the numeric suffixes of names sharing the
/// prefix. Inherently racy under concurrent duplication of the same base
/// name; the only guarantee is "not in use at the time of the scan".
fn next_available_name(base: &str, existing: &[String]) -> String {
    let mut max_suffix: Option<u64> = None;
    for name in existing {
        let Some(rest) = name.strip_prefix(base) else {
            continue;
        };
        if rest.is_empty() {
            max_suffix = Some(max_suffix.unwrap_or(0));
        } else if let Ok(n) = rest.parse::<u64>() {
            max_suffix = Some(max_suffix.map_or(n, |m| m.max(n)));
        }
    }
    match max_suffix {
        Some(n) => format!("{}{}", base, n + 1),
        None => base.to_string(),
    }
}

/// Convert a database row to an Archive.
///
/// Field-by-field so that schema drift fails loudly here instead of
/// propagating an untyped shape.
fn archive_from_row(row: &sqlx::postgres::PgRow) -> Result<Archive> {
    let category_str: String = row.get("category");
    let category = Category::parse(&category_str).ok_or_else(|| {
        Error::Internal(format!("unknown archive category '{}'", category_str))
    })?;

    Ok(Archive {
        id: row.get("id"),
        name: row.get("name"),
        mime_type: row.get("mime_type"),
        size_bytes: row.get("size_bytes"),
        storage_path: row.get("storage_path"),
        url: row.get("url"),
        category,
        content_hash: row.get("content_hash"),
        observation_id: row.get("observation_id"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        modified_by: row.get("modified_by"),
        modified_at: row.get("modified_at"),
    })
}

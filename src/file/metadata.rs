//! File metadata records and repository.

use sqlx::QueryBuilder;

use crate::db::DbPool;
use crate::storage::parent_folder;
use crate::{LoftError, Result};

/// Metadata for one stored object.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileRecord {
    /// Unique file ID.
    pub id: i64,
    /// Owner's user ID; the owner always has full access.
    pub owner_id: i64,
    /// Virtual path relative to the owner's root, e.g. `docs/report.pdf`.
    pub logical_path: String,
    /// Original (sanitized) filename shown to users.
    pub display_name: String,
    /// Size in bytes.
    pub size: i64,
    /// MIME content type.
    pub mime_type: String,
    /// Opaque token returned by the storage backend at upload time.
    ///
    /// The only way to reach the bytes again; never reconstructed from
    /// the logical path.
    pub backend_ref: String,
    /// Fetchable URL when the blob backend provided one.
    pub public_url: Option<String>,
    /// Number of successful downloads.
    pub download_count: i64,
    /// Lock flag. Stored and surfaced; not consulted by any operation
    /// (pending product clarification).
    pub locked: bool,
    /// Free-form comment.
    pub comment: String,
    /// Upload timestamp.
    pub uploaded_at: String,
}

impl FileRecord {
    /// The folder this record lives in (`""` for the root).
    pub fn parent_folder(&self) -> &str {
        parent_folder(&self.logical_path)
    }
}

/// Data for creating a new file record.
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    /// Owner's user ID.
    pub owner_id: i64,
    /// Virtual path relative to the owner's root.
    pub logical_path: String,
    /// Display filename.
    pub display_name: String,
    /// Size in bytes.
    pub size: i64,
    /// MIME content type.
    pub mime_type: String,
    /// Backend reference from the storage backend.
    pub backend_ref: String,
    /// Public URL, if the backend returned one.
    pub public_url: Option<String>,
}

impl NewFileRecord {
    /// Create a new file record.
    pub fn new(
        owner_id: i64,
        logical_path: impl Into<String>,
        display_name: impl Into<String>,
        size: i64,
        mime_type: impl Into<String>,
        backend_ref: impl Into<String>,
    ) -> Self {
        Self {
            owner_id,
            logical_path: logical_path.into(),
            display_name: display_name.into(),
            size,
            mime_type: mime_type.into(),
            backend_ref: backend_ref.into(),
            public_url: None,
        }
    }

    /// Set the public URL.
    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = Some(url.into());
        self
    }
}

/// Builder for updating mutable file metadata.
///
/// The logical path, display name and backend reference are fixed at
/// upload time; only the annotation fields can change.
#[derive(Debug, Clone, Default)]
pub struct FileRecordUpdate {
    /// New comment.
    pub comment: Option<String>,
    /// New lock flag.
    pub locked: Option<bool>,
}

impl FileRecordUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the comment.
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Set the lock flag.
    pub fn locked(mut self, locked: bool) -> Self {
        self.locked = Some(locked);
        self
    }

    /// Whether the update changes anything.
    pub fn is_empty(&self) -> bool {
        self.comment.is_none() && self.locked.is_none()
    }
}

const SELECT_COLUMNS: &str = "id, owner_id, logical_path, display_name, size, mime_type, \
     backend_ref, public_url, download_count, locked, comment, uploaded_at";

/// Escape `%`, `_` and the escape character itself for a LIKE pattern.
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Repository for file metadata operations.
pub struct FileRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FileRepository<'a> {
    /// Create a new FileRepository with the given pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a new file record.
    pub async fn create(&self, file: &NewFileRecord) -> Result<FileRecord> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO files (owner_id, logical_path, display_name, size, mime_type, backend_ref, public_url)
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(file.owner_id)
        .bind(&file.logical_path)
        .bind(&file.display_name)
        .bind(file.size)
        .bind(&file.mime_type)
        .bind(&file.backend_ref)
        .bind(&file.public_url)
        .fetch_one(self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| LoftError::NotFound("file".to_string()))
    }

    /// Get a file record by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {SELECT_COLUMNS} FROM files WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(record)
    }

    /// List every record owned by a user, newest first.
    pub async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<FileRecord>> {
        let records = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {SELECT_COLUMNS} FROM files
             WHERE owner_id = $1 ORDER BY uploaded_at DESC, id DESC"
        ))
        .bind(owner_id)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    /// List records owned by a user whose logical path sits directly in
    /// the given folder (not recursively).
    pub async fn list_children(&self, owner_id: i64, folder_path: &str) -> Result<Vec<FileRecord>> {
        let candidates = if folder_path.is_empty() {
            sqlx::query_as::<_, FileRecord>(&format!(
                "SELECT {SELECT_COLUMNS} FROM files
                 WHERE owner_id = $1 AND logical_path NOT LIKE '%/%'
                 ORDER BY uploaded_at DESC, id DESC"
            ))
            .bind(owner_id)
            .fetch_all(self.pool)
            .await?
        } else {
            let pattern = format!("{}/%", escape_like(folder_path));
            let rows = sqlx::query_as::<_, FileRecord>(&format!(
                "SELECT {SELECT_COLUMNS} FROM files
                 WHERE owner_id = $1 AND logical_path LIKE $2 ESCAPE '\\'
                 ORDER BY uploaded_at DESC, id DESC"
            ))
            .bind(owner_id)
            .bind(pattern)
            .fetch_all(self.pool)
            .await?;

            // The LIKE pattern also matches nested paths; keep direct
            // children only.
            rows.into_iter()
                .filter(|r| r.parent_folder() == folder_path)
                .collect()
        };

        Ok(candidates)
    }

    /// List records shared with a user through any permission grant,
    /// newest first.
    pub async fn list_shared_with(&self, user_id: i64) -> Result<Vec<FileRecord>> {
        let records = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT f.{} FROM files f
             INNER JOIN permissions p ON p.file_id = f.id
             WHERE p.user_id = $1
             ORDER BY f.uploaded_at DESC, f.id DESC",
            SELECT_COLUMNS.replace(", ", ", f.")
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    /// Update mutable metadata fields.
    pub async fn update(&self, id: i64, update: &FileRecordUpdate) -> Result<Option<FileRecord>> {
        if update.is_empty() {
            return self.get_by_id(id).await;
        }

        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE files SET ");
        let mut separated = query.separated(", ");

        if let Some(ref comment) = update.comment {
            separated.push("comment = ");
            separated.push_bind_unseparated(comment.clone());
        }
        if let Some(locked) = update.locked {
            separated.push("locked = ");
            separated.push_bind_unseparated(locked);
        }

        query.push(" WHERE id = ");
        query.push_bind(id);
        query.build().execute(self.pool).await?;

        self.get_by_id(id).await
    }

    /// Increment the download counter and return the new value.
    ///
    /// Single-statement increment: concurrent downloads may interleave,
    /// last write wins.
    pub async fn increment_download_count(&self, id: i64) -> Result<i64> {
        sqlx::query("UPDATE files SET download_count = download_count + 1 WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        let count: i64 = sqlx::query_scalar("SELECT download_count FROM files WHERE id = $1")
            .bind(id)
            .fetch_one(self.pool)
            .await?;

        Ok(count)
    }

    /// Delete a file record by ID.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every record of an owner at or under a folder path.
    ///
    /// Matches the exact path and everything below `folder_path + "/"`.
    /// Returns the number of records removed.
    pub async fn delete_by_folder(&self, owner_id: i64, folder_path: &str) -> Result<u64> {
        if folder_path.is_empty() {
            let result = sqlx::query("DELETE FROM files WHERE owner_id = $1")
                .bind(owner_id)
                .execute(self.pool)
                .await?;
            return Ok(result.rows_affected());
        }

        let pattern = format!("{}/%", escape_like(folder_path));
        let result = sqlx::query(
            "DELETE FROM files
             WHERE owner_id = $1 AND (logical_path = $2 OR logical_path LIKE $3 ESCAPE '\\')",
        )
        .bind(owner_id)
        .bind(folder_path)
        .bind(pattern)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

//! Per-(user, file) permission grants.
//!
//! A grant gives a non-owner read or write access to one file. Ownership
//! is never recorded as a grant; it is derived from the file record and
//! always implies full access.

use std::fmt;
use std::str::FromStr;

use crate::db::DbPool;
use crate::{LoftError, Result};

/// Kind of access a grant confers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum GrantKind {
    /// Read (download) access.
    Read,
    /// Write access. Implies read; does NOT imply delete.
    Write,
}

impl GrantKind {
    /// Database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantKind::Read => "read",
            GrantKind::Write => "write",
        }
    }
}

impl fmt::Display for GrantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GrantKind {
    type Err = LoftError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "read" => Ok(GrantKind::Read),
            "write" => Ok(GrantKind::Write),
            _ => Err(LoftError::Validation(format!("unknown grant kind: {s}"))),
        }
    }
}

/// An access grant for one (user, file) pair.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PermissionGrant {
    /// Unique grant ID.
    pub id: i64,
    /// Grantee user ID.
    pub user_id: i64,
    /// File the grant applies to.
    pub file_id: i64,
    /// Access kind.
    pub kind: GrantKind,
    /// When the grant was (last) issued.
    pub granted_at: String,
}

/// Data for issuing a new grant.
#[derive(Debug, Clone)]
pub struct NewGrant {
    /// Grantee user ID.
    pub user_id: i64,
    /// File ID.
    pub file_id: i64,
    /// Access kind.
    pub kind: GrantKind,
}

impl NewGrant {
    /// Create a new grant request.
    pub fn new(user_id: i64, file_id: i64, kind: GrantKind) -> Self {
        Self {
            user_id,
            file_id,
            kind,
        }
    }
}

/// Repository for permission grant operations.
pub struct PermissionRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> PermissionRepository<'a> {
    /// Create a new PermissionRepository with the given pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Issue a grant, or refresh an existing one for the same pair.
    ///
    /// `(user_id, file_id)` is unique; re-granting replaces the kind and
    /// bumps the grant timestamp.
    pub async fn grant(&self, grant: &NewGrant) -> Result<PermissionGrant> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO permissions (user_id, file_id, kind)
             VALUES ($1, $2, $3)
             ON CONFLICT(user_id, file_id)
             DO UPDATE SET kind = excluded.kind, granted_at = datetime('now')
             RETURNING id",
        )
        .bind(grant.user_id)
        .bind(grant.file_id)
        .bind(grant.kind)
        .fetch_one(self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| LoftError::NotFound("permission grant".to_string()))
    }

    /// Get a grant by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<PermissionGrant>> {
        let grant = sqlx::query_as::<_, PermissionGrant>(
            "SELECT id, user_id, file_id, kind, granted_at FROM permissions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(grant)
    }

    /// Find the grant for a (user, file) pair, if any.
    pub async fn find(&self, user_id: i64, file_id: i64) -> Result<Option<PermissionGrant>> {
        let grant = sqlx::query_as::<_, PermissionGrant>(
            "SELECT id, user_id, file_id, kind, granted_at
             FROM permissions WHERE user_id = $1 AND file_id = $2",
        )
        .bind(user_id)
        .bind(file_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(grant)
    }

    /// Whether a user holds any grant (read or write) on a file.
    pub async fn has_grant(&self, user_id: i64, file_id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM permissions WHERE user_id = $1 AND file_id = $2)",
        )
        .bind(user_id)
        .bind(file_id)
        .fetch_one(self.pool)
        .await?;

        Ok(exists)
    }

    /// List every grant on a file.
    pub async fn list_for_file(&self, file_id: i64) -> Result<Vec<PermissionGrant>> {
        let grants = sqlx::query_as::<_, PermissionGrant>(
            "SELECT id, user_id, file_id, kind, granted_at
             FROM permissions WHERE file_id = $1 ORDER BY granted_at DESC, id DESC",
        )
        .bind(file_id)
        .fetch_all(self.pool)
        .await?;

        Ok(grants)
    }

    /// Revoke a grant.
    ///
    /// Returns `false` if no grant existed.
    pub async fn revoke(&self, user_id: i64, file_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM permissions WHERE user_id = $1 AND file_id = $2")
            .bind(user_id)
            .bind(file_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup_db() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        for (name, email) in [("owner", "o@x.com"), ("peer", "p@x.com")] {
            sqlx::query("INSERT INTO users (username, email, password) VALUES ($1, $2, 'h')")
                .bind(name)
                .bind(email)
                .execute(db.pool())
                .await
                .unwrap();
        }
        sqlx::query(
            "INSERT INTO files (owner_id, logical_path, display_name, size, mime_type, backend_ref)
             VALUES (1, 'a.txt', 'a.txt', 1, 'text/plain', 'ref-a')",
        )
        .execute(db.pool())
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn test_grant_and_find() {
        let db = setup_db().await;
        let repo = PermissionRepository::new(db.pool());

        let grant = repo
            .grant(&NewGrant::new(2, 1, GrantKind::Read))
            .await
            .unwrap();

        assert_eq!(grant.user_id, 2);
        assert_eq!(grant.file_id, 1);
        assert_eq!(grant.kind, GrantKind::Read);
        assert!(!grant.granted_at.is_empty());

        let found = repo.find(2, 1).await.unwrap().unwrap();
        assert_eq!(found.id, grant.id);
        assert!(repo.find(2, 999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_regrant_upgrades_kind() {
        let db = setup_db().await;
        let repo = PermissionRepository::new(db.pool());

        repo.grant(&NewGrant::new(2, 1, GrantKind::Read))
            .await
            .unwrap();
        repo.grant(&NewGrant::new(2, 1, GrantKind::Write))
            .await
            .unwrap();

        let found = repo.find(2, 1).await.unwrap().unwrap();
        assert_eq!(found.kind, GrantKind::Write);

        // Still one row for the pair.
        let grants = repo.list_for_file(1).await.unwrap();
        assert_eq!(grants.len(), 1);
    }

    #[tokio::test]
    async fn test_has_grant() {
        let db = setup_db().await;
        let repo = PermissionRepository::new(db.pool());

        assert!(!repo.has_grant(2, 1).await.unwrap());
        repo.grant(&NewGrant::new(2, 1, GrantKind::Write))
            .await
            .unwrap();
        assert!(repo.has_grant(2, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke() {
        let db = setup_db().await;
        let repo = PermissionRepository::new(db.pool());

        repo.grant(&NewGrant::new(2, 1, GrantKind::Read))
            .await
            .unwrap();

        assert!(repo.revoke(2, 1).await.unwrap());
        assert!(!repo.has_grant(2, 1).await.unwrap());
        assert!(!repo.revoke(2, 1).await.unwrap());
    }

    #[test]
    fn test_grant_kind_strings() {
        assert_eq!(GrantKind::Read.as_str(), "read");
        assert_eq!(GrantKind::Write.to_string(), "write");
        assert_eq!("READ".parse::<GrantKind>().unwrap(), GrantKind::Read);
        assert!("admin".parse::<GrantKind>().is_err());
    }
}

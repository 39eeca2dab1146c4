//! User repository for LOFT.

use super::user::{NewUser, User};
use super::DbPool;
use crate::{LoftError, Result};

/// Repository for user CRUD operations.
pub struct UserRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository with the given pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new user.
    ///
    /// Returns [`LoftError::AlreadyExists`] when the username or email is
    /// taken.
    pub async fn create(&self, new_user: &NewUser) -> Result<User> {
        let result = sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (username, email, password) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password)
        .fetch_one(self.pool)
        .await;

        let id = match result {
            Ok(id) => id,
            Err(e) => {
                if e.as_database_error()
                    .map(|d| d.is_unique_violation())
                    .unwrap_or(false)
                {
                    return Err(LoftError::AlreadyExists(
                        "username or email".to_string(),
                    ));
                }
                return Err(e.into());
            }
        };

        self.get_by_id(id)
            .await?
            .ok_or_else(|| LoftError::NotFound("user".to_string()))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, password, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    /// Get a user by username (case-insensitive).
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, password, created_at
             FROM users WHERE username = $1 COLLATE NOCASE",
        )
        .bind(username)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    /// Get a user by login identifier: username or email.
    pub async fn get_by_identifier(&self, identifier: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, password, created_at
             FROM users WHERE username = $1 COLLATE NOCASE OR email = $1 COLLATE NOCASE",
        )
        .bind(identifier)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    /// Replace a user's password hash.
    ///
    /// Returns `false` if no such user exists.
    pub async fn update_password(&self, id: i64, password_hash: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

//! Registration and credential verification for LOFT.
//!
//! Passwords are hashed with Argon2id and stored in PHC format.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use rand_core::OsRng;

use crate::db::{DbPool, NewUser, User, UserRepository};
use crate::{LoftError, Result};

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length.
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Minimum username length.
pub const MIN_USERNAME_LENGTH: usize = 3;

/// Maximum username length.
pub const MAX_USERNAME_LENGTH: usize = 32;

/// Create the Argon2 hasher.
///
/// Memory cost 64 MB, 3 iterations, parallelism 4.
fn create_argon2() -> Argon2<'static> {
    let params = Params::new(65536, 3, 4, None).expect("valid Argon2 params");
    Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params)
}

/// Hash a password using Argon2id.
///
/// Returns a PHC-formatted hash string that includes the salt and
/// parameters.
pub fn hash_password(password: &str) -> Result<String> {
    validate_password(password)?;

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = create_argon2();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| LoftError::Validation(format!("password hashing failed: {e}")))?;

    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
///
/// Returns [`LoftError::AuthFailure`] on mismatch or malformed hash.
/// Parameters come from the parsed hash, so rehashing with different
/// settings keeps old hashes verifiable.
pub fn verify_password(password: &str, hash: &str) -> Result<()> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| LoftError::AuthFailure)?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| LoftError::AuthFailure)
}

/// Validate password length requirements.
pub fn validate_password(password: &str) -> Result<()> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(LoftError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(LoftError::Validation(format!(
            "password must be at most {MAX_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Validate a username: length and charset (alphanumeric, `_`, `-`).
pub fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if len < MIN_USERNAME_LENGTH || len > MAX_USERNAME_LENGTH {
        return Err(LoftError::Validation(format!(
            "username must be {MIN_USERNAME_LENGTH}-{MAX_USERNAME_LENGTH} characters"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(LoftError::Validation(
            "username may only contain letters, digits, '_' and '-'".to_string(),
        ));
    }
    Ok(())
}

/// Minimal email shape check.
pub fn validate_email(email: &str) -> Result<()> {
    let valid = email.len() >= 3
        && email.len() <= 254
        && email.contains('@')
        && !email.starts_with('@')
        && !email.ends_with('@');
    if !valid {
        return Err(LoftError::Validation("invalid email address".to_string()));
    }
    Ok(())
}

/// Registration request data.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    /// Desired username.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Plaintext password.
    pub password: String,
}

impl RegistrationRequest {
    /// Create a new registration request.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Register a new user.
///
/// Validates the request, hashes the password and inserts the record.
/// A taken username or email yields [`LoftError::AlreadyExists`].
pub async fn register(pool: &DbPool, request: &RegistrationRequest) -> Result<User> {
    validate_username(&request.username)?;
    validate_email(&request.email)?;

    let hash = hash_password(&request.password)?;
    let repo = UserRepository::new(pool);
    let user = repo
        .create(&NewUser::new(&request.username, &request.email, hash))
        .await?;

    tracing::info!(user_id = user.id, username = %user.username, "registered user");
    Ok(user)
}

/// Verify login credentials.
///
/// `identifier` may be a username or an email address. Unknown
/// identifiers and wrong passwords both return [`LoftError::AuthFailure`].
pub async fn verify_credentials(pool: &DbPool, identifier: &str, secret: &str) -> Result<User> {
    let repo = UserRepository::new(pool);
    let user = repo
        .get_by_identifier(identifier)
        .await?
        .ok_or(LoftError::AuthFailure)?;

    verify_password(secret, &user.password)?;
    Ok(user)
}

/// Rotate a user's password, verifying the current one first.
pub async fn change_password(
    pool: &DbPool,
    user_id: i64,
    current: &str,
    new_password: &str,
) -> Result<()> {
    let repo = UserRepository::new(pool);
    let user = repo
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| LoftError::NotFound("user".to_string()))?;

    verify_password(current, &user.password)?;

    let hash = hash_password(new_password)?;
    repo.update_password(user_id, &hash).await?;

    tracing::info!(user_id, "password changed");
    Ok(())
}

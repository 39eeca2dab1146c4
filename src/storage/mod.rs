//! Storage backend abstraction for file bytes.
//!
//! Supports two backends behind one contract:
//! - `local`: per-owner trees on the local filesystem
//! - `blob`: an HTTP object store with flat, prefix-structured keys
//!
//! The backend is chosen once at startup from configuration and injected
//! into the file service; call sites never branch on the deployment mode.

pub mod blob;
pub mod local;

pub use blob::BlobStoreBackend;
pub use local::LocalDiskBackend;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use rand::Rng;

use crate::config::{StorageConfig, StorageMode};
use crate::{LoftError, Result};

/// A boxed stream of bytes for file content.
///
/// Lazy and non-restartable: the local backend reads from disk as the
/// stream is polled, the blob backend yields one pre-fetched chunk.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Result of a successful `store` call.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Opaque token required for later retrieval and removal.
    ///
    /// Must be persisted verbatim; it is never reconstructable from the
    /// logical path.
    pub backend_ref: String,
    /// Publicly fetchable URL, when the backend provides one (blob only).
    pub public_url: Option<String>,
}

/// A retrieved object.
pub struct RetrievedObject {
    /// Content length in bytes.
    pub size: u64,
    /// Streaming body content.
    pub body: ByteStream,
}

/// Contract implemented by every storage backend.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Create a folder under the owner's namespace.
    ///
    /// Idempotent: a pre-existing folder is success. The blob backend
    /// treats folders as virtual and returns success without I/O.
    async fn create_folder(&self, owner_id: i64, folder_path: &str) -> Result<()>;

    /// Whether a folder physically exists.
    ///
    /// Always `false` on the blob backend, where prefixes come into
    /// existence with their first object.
    async fn folder_exists(&self, owner_id: i64, folder_path: &str) -> Result<bool>;

    /// Store bytes under the owner's namespace.
    ///
    /// A collision-resistant physical name is generated from the display
    /// name; repeated uploads of identically named files always land in
    /// distinct locations.
    async fn store(
        &self,
        owner_id: i64,
        data: Vec<u8>,
        display_name: &str,
        mime_type: &str,
        folder_path: &str,
    ) -> Result<StoredObject>;

    /// Retrieve an object by its backend reference.
    ///
    /// Returns `Ok(None)` when the object is absent; callers must check
    /// before treating the result as success.
    async fn retrieve(&self, owner_id: i64, backend_ref: &str) -> Result<Option<RetrievedObject>>;

    /// Remove an object by its backend reference.
    ///
    /// Returns `Ok(false)` when nothing was actually removed, distinct
    /// from an error.
    async fn remove(&self, owner_id: i64, backend_ref: &str) -> Result<bool>;

    /// Remove a folder and everything beneath it.
    ///
    /// The blob backend deletes by key prefix.
    async fn remove_folder(&self, owner_id: i64, folder_path: &str) -> Result<()>;

    /// Immediate child folder names at the given path.
    async fn list_child_folders(&self, owner_id: i64, folder_path: &str) -> Result<Vec<String>>;
}

/// Build the configured backend.
///
/// Called once at startup; the returned object is shared for the life of
/// the process.
pub fn from_config(config: &StorageConfig) -> Result<Box<dyn StorageBackend>> {
    match config.mode {
        StorageMode::Local => Ok(Box::new(LocalDiskBackend::new(&config.upload_root)?)),
        StorageMode::Blob => Ok(Box::new(BlobStoreBackend::new(
            &config.blob_endpoint,
            &config.blob_token,
        )?)),
    }
}

/// Normalize a logical folder path.
///
/// Backslashes become forward slashes, redundant slashes collapse, and
/// the result carries no leading or trailing slash. `.` and `..`
/// segments are rejected so a path can never escape the owner's root.
/// The empty string denotes the owner's root folder.
pub fn normalize_folder_path(raw: &str) -> Result<String> {
    let normalized = raw.replace('\\', "/");
    let mut segments = Vec::new();

    for segment in normalized.split('/') {
        if segment.is_empty() {
            continue;
        }
        if segment == "." || segment == ".." {
            return Err(LoftError::Validation(format!(
                "invalid folder path: {raw:?}"
            )));
        }
        if segment.chars().any(|c| c.is_control()) {
            return Err(LoftError::Validation(format!(
                "invalid folder path: {raw:?}"
            )));
        }
        segments.push(segment);
    }

    Ok(segments.join("/"))
}

/// Reduce an attacker-controlled display name to a safe single path
/// component.
///
/// Directory parts are stripped, control characters removed. Names that
/// reduce to nothing (or to `.`/`..`) become `"unnamed"`.
pub fn sanitize_display_name(raw: &str) -> String {
    let normalized = raw.replace('\\', "/");
    let base = normalized.rsplit('/').next().unwrap_or("");
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "unnamed".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Generate a collision-resistant physical object name.
///
/// Combines a millisecond timestamp and a random suffix with the
/// sanitized display name, so every call yields a distinct name even for
/// repeated uploads of the same file.
pub(crate) fn unique_object_name(display_name: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::rng().random_range(0..1_000_000_000);
    format!("{millis}-{suffix:09}-{}", sanitize_display_name(display_name))
}

/// Join a normalized folder path and an object name.
pub(crate) fn join_path(folder_path: &str, name: &str) -> String {
    if folder_path.is_empty() {
        name.to_string()
    } else {
        format!("{folder_path}/{name}")
    }
}

/// The parent folder of a logical path (`""` for root-level paths).
pub fn parent_folder(logical_path: &str) -> &str {
    logical_path
        .rsplit_once('/')
        .map(|(parent, _)| parent)
        .unwrap_or("")
}

//! LOFT - multi-tenant file storage core.
//!
//! Users own namespaces of logical file paths; file bytes live behind a
//! storage backend chosen once at startup (local disk or an HTTP blob
//! store); every read/write/delete is authorized against ownership and
//! per-file permission grants.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod file;
pub mod logging;
pub mod storage;

pub use auth::{
    change_password, hash_password, register, validate_email, validate_password,
    validate_username, verify_credentials, verify_password, RegistrationRequest,
};
pub use config::{Config, StorageMode};
pub use db::{Database, DbPool, NewUser, User, UserRepository};
pub use error::{LoftError, Result};
pub use file::{
    ArchiveImporter, DirectoryListing, DownloadResult, FileRecord, FileRecordUpdate,
    FileRepository, FileService, GrantKind, ImportFailure, ImportReport, NewFileRecord, NewGrant,
    PermissionGrant, PermissionRepository, UploadRequest,
};
pub use storage::{
    BlobStoreBackend, ByteStream, LocalDiskBackend, RetrievedObject, StorageBackend, StoredObject,
};

//! File management module for LOFT.
//!
//! This module ties the storage backend, the permission store and the
//! file metadata store together:
//! - Per-owner logical paths over a physical backend
//! - Per-(user, file) access grants with an ownership rule
//! - Upload/download/delete/folder operations with authorization
//! - Archive import replayed through the file service

mod archive;
mod metadata;
mod permission;
mod service;

pub use archive::{ArchiveImporter, ImportFailure, ImportReport};
pub use metadata::{FileRecord, FileRecordUpdate, FileRepository, NewFileRecord};
pub use permission::{GrantKind, NewGrant, PermissionGrant, PermissionRepository};
pub use service::{DirectoryListing, DownloadResult, FileService, UploadRequest};

/// Maximum length for a display name (in characters).
pub const MAX_DISPLAY_NAME_LENGTH: usize = 255;

/// Maximum length for a file comment (in characters).
pub const MAX_COMMENT_LENGTH: usize = 500;

/// Default maximum upload size (50MB).
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 50 * 1024 * 1024;

//! Access-controlled file service.
//!
//! Orchestrates the storage backend, the permission store and the file
//! metadata store. Every public operation takes an authenticated
//! requester ID and enforces authorization before any byte-level work:
//! - uploads always land in the requester's own namespace
//! - downloads require ownership or any grant
//! - deletes require ownership (write grants do not imply delete)

use tracing::warn;

use crate::db::{Database, DbPool, UserRepository};
use crate::storage::{normalize_folder_path, ByteStream, StorageBackend};
use crate::{LoftError, Result};

use super::metadata::{FileRecord, FileRecordUpdate, FileRepository, NewFileRecord};
use super::permission::{GrantKind, NewGrant, PermissionGrant, PermissionRepository};
use super::{DEFAULT_MAX_UPLOAD_SIZE, MAX_COMMENT_LENGTH, MAX_DISPLAY_NAME_LENGTH};

/// Request data for a file upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Target folder, relative to the uploader's root (`""` for root).
    pub folder_path: String,
    /// Original filename.
    pub display_name: String,
    /// MIME content type.
    pub mime_type: String,
    /// File content.
    pub content: Vec<u8>,
}

impl UploadRequest {
    /// Create a new upload request.
    pub fn new(
        folder_path: impl Into<String>,
        display_name: impl Into<String>,
        mime_type: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        Self {
            folder_path: folder_path.into(),
            display_name: display_name.into(),
            mime_type: mime_type.into(),
            content,
        }
    }
}

/// Result of a file download.
pub struct DownloadResult {
    /// File metadata, with the download counter already bumped.
    pub record: FileRecord,
    /// Content length in bytes, as reported by the backend.
    pub size: u64,
    /// Streaming body content.
    pub body: ByteStream,
}

/// Contents of one folder as visible to a requester.
#[derive(Debug)]
pub struct DirectoryListing {
    /// Files whose logical path sits directly in the folder: the
    /// requester's own plus any shared with them.
    pub files: Vec<FileRecord>,
    /// Immediate child folder names, from the backend's view.
    pub folders: Vec<String>,
}

/// File service orchestrating storage, permissions and metadata.
pub struct FileService<'a> {
    db: &'a Database,
    backend: &'a dyn StorageBackend,
    max_upload_size: u64,
}

impl<'a> FileService<'a> {
    /// Create a new FileService.
    pub fn new(db: &'a Database, backend: &'a dyn StorageBackend) -> Self {
        Self {
            db,
            backend,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }

    /// Override the maximum upload size in bytes.
    pub fn with_max_upload_size(mut self, max_size: u64) -> Self {
        self.max_upload_size = max_size;
        self
    }

    /// The configured maximum upload size.
    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size
    }

    fn pool(&self) -> &DbPool {
        self.db.pool()
    }

    /// Upload a file into the requester's namespace.
    ///
    /// Two-phase: the backend write must succeed before the metadata
    /// record is inserted, so a failed store leaves no orphan metadata.
    /// Backend failure maps to [`LoftError::StorageWriteFailed`].
    pub async fn upload(&self, requester_id: i64, request: UploadRequest) -> Result<FileRecord> {
        if request.display_name.trim().is_empty() {
            return Err(LoftError::Validation("file name is required".to_string()));
        }
        if request.display_name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
            return Err(LoftError::Validation(format!(
                "file name must be at most {MAX_DISPLAY_NAME_LENGTH} characters"
            )));
        }
        if request.content.len() as u64 > self.max_upload_size {
            return Err(LoftError::Validation(format!(
                "file is too large (max {} bytes)",
                self.max_upload_size
            )));
        }

        let folder = normalize_folder_path(&request.folder_path)?;
        let size = request.content.len() as i64;

        let stored = self
            .backend
            .store(
                requester_id,
                request.content,
                &request.display_name,
                &request.mime_type,
                &folder,
            )
            .await
            .map_err(|e| LoftError::StorageWriteFailed(e.to_string()))?;

        let display_name = crate::storage::sanitize_display_name(&request.display_name);
        let logical_path = if folder.is_empty() {
            display_name.clone()
        } else {
            format!("{folder}/{display_name}")
        };

        let mut new_record = NewFileRecord::new(
            requester_id,
            logical_path,
            display_name,
            size,
            request.mime_type,
            stored.backend_ref,
        );
        if let Some(url) = stored.public_url {
            new_record = new_record.with_public_url(url);
        }

        let record = FileRepository::new(self.pool()).create(&new_record).await?;
        tracing::debug!(
            file_id = record.id,
            owner_id = requester_id,
            logical_path = %record.logical_path,
            "uploaded file"
        );
        Ok(record)
    }

    /// Download a file.
    ///
    /// Authorized for the owner and for holders of any grant. The
    /// download counter is incremented and persisted before the byte
    /// source is returned, so it counts delivered downloads only.
    pub async fn download(&self, requester_id: i64, file_id: i64) -> Result<DownloadResult> {
        let files = FileRepository::new(self.pool());
        let mut record = files
            .get_by_id(file_id)
            .await?
            .ok_or_else(|| LoftError::NotFound("file".to_string()))?;

        if !self.can_read(requester_id, &record).await? {
            return Err(LoftError::PermissionDenied(
                "no read access to this file".to_string(),
            ));
        }

        let retrieved = self
            .backend
            .retrieve(record.owner_id, &record.backend_ref)
            .await?;

        let retrieved = match retrieved {
            Some(r) => r,
            None => {
                // Dangling metadata: the record exists but the bytes are
                // gone. Surfaced, not silently swallowed.
                warn!(
                    file_id,
                    backend_ref = %record.backend_ref,
                    "metadata points at a missing backend object"
                );
                return Err(LoftError::NotFoundInBackend(format!("file {file_id}")));
            }
        };

        record.download_count = files.increment_download_count(file_id).await?;

        Ok(DownloadResult {
            record,
            size: retrieved.size,
            body: retrieved.body,
        })
    }

    /// Fetch a file's metadata without its content.
    ///
    /// Authorized for the owner and for holders of any grant.
    pub async fn get_record(&self, requester_id: i64, file_id: i64) -> Result<FileRecord> {
        let record = FileRepository::new(self.pool())
            .get_by_id(file_id)
            .await?
            .ok_or_else(|| LoftError::NotFound("file".to_string()))?;

        if !self.can_read(requester_id, &record).await? {
            return Err(LoftError::PermissionDenied(
                "no read access to this file".to_string(),
            ));
        }

        Ok(record)
    }

    /// Delete a file.
    ///
    /// Owner-only: write grants do not imply delete. The metadata record
    /// is removed even when the backend reports failure, so a file can
    /// never become un-deletable; backend trouble is logged instead.
    pub async fn delete(&self, requester_id: i64, file_id: i64) -> Result<()> {
        let files = FileRepository::new(self.pool());
        let record = files
            .get_by_id(file_id)
            .await?
            .ok_or_else(|| LoftError::NotFound("file".to_string()))?;

        if record.owner_id != requester_id {
            return Err(LoftError::PermissionDenied(
                "only the owner can delete a file".to_string(),
            ));
        }

        match self
            .backend
            .remove(record.owner_id, &record.backend_ref)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(
                file_id,
                backend_ref = %record.backend_ref,
                "backend had no object to remove"
            ),
            Err(e) => warn!(
                file_id,
                error = %e,
                "backend remove failed; deleting metadata anyway"
            ),
        }

        files.delete(file_id).await?;
        tracing::debug!(file_id, "deleted file");
        Ok(())
    }

    /// List one folder as visible to the requester.
    ///
    /// Files are the union of the requester's own records and records
    /// shared with them, restricted to direct children of the folder.
    /// Child folder names come from the backend's directory view.
    pub async fn list_directory(
        &self,
        requester_id: i64,
        folder_path: &str,
    ) -> Result<DirectoryListing> {
        let folder = normalize_folder_path(folder_path)?;
        let files_repo = FileRepository::new(self.pool());

        let mut files = files_repo.list_children(requester_id, &folder).await?;
        let shared = files_repo.list_shared_with(requester_id).await?;
        files.extend(
            shared
                .into_iter()
                .filter(|record| record.parent_folder() == folder),
        );

        let folders = self
            .backend
            .list_child_folders(requester_id, &folder)
            .await?;

        Ok(DirectoryListing { files, folders })
    }

    /// Create a folder in the requester's namespace.
    ///
    /// Fails with [`LoftError::AlreadyExists`] when the backend reports a
    /// folder already present at that exact path (local disk only; blob
    /// folders are virtual and cannot pre-exist).
    pub async fn create_folder(&self, requester_id: i64, folder_path: &str) -> Result<String> {
        let folder = normalize_folder_path(folder_path)?;
        if folder.is_empty() {
            return Err(LoftError::Validation("folder path is required".to_string()));
        }

        if self.backend.folder_exists(requester_id, &folder).await? {
            return Err(LoftError::AlreadyExists(format!("folder {folder}")));
        }

        self.backend
            .create_folder(requester_id, &folder)
            .await
            .map_err(|e| LoftError::FolderCreateFailed(e.to_string()))?;

        tracing::debug!(owner_id = requester_id, folder = %folder, "created folder");
        Ok(folder)
    }

    /// Delete a folder and everything under it from the requester's
    /// namespace.
    ///
    /// Two-phase, metadata first: a crash mid-operation can orphan
    /// physical bytes (recoverable) but never metadata pointing at a
    /// removed tree. Returns the number of metadata records removed.
    pub async fn delete_folder(&self, requester_id: i64, folder_path: &str) -> Result<u64> {
        let folder = normalize_folder_path(folder_path)?;
        if folder.is_empty() {
            return Err(LoftError::Validation("folder path is required".to_string()));
        }

        let removed = FileRepository::new(self.pool())
            .delete_by_folder(requester_id, &folder)
            .await?;

        if let Err(e) = self.backend.remove_folder(requester_id, &folder).await {
            warn!(
                owner_id = requester_id,
                folder = %folder,
                error = %e,
                "backend folder removal failed after metadata cleanup"
            );
        }

        tracing::debug!(
            owner_id = requester_id,
            folder = %folder,
            removed,
            "deleted folder"
        );
        Ok(removed)
    }

    /// Grant a user read or write access to a file. Owner-only.
    pub async fn grant_access(
        &self,
        requester_id: i64,
        file_id: i64,
        user_id: i64,
        kind: GrantKind,
    ) -> Result<PermissionGrant> {
        let record = FileRepository::new(self.pool())
            .get_by_id(file_id)
            .await?
            .ok_or_else(|| LoftError::NotFound("file".to_string()))?;

        if record.owner_id != requester_id {
            return Err(LoftError::PermissionDenied(
                "only the owner can share a file".to_string(),
            ));
        }
        if user_id == record.owner_id {
            return Err(LoftError::Validation(
                "the owner already has full access".to_string(),
            ));
        }

        UserRepository::new(self.pool())
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| LoftError::NotFound("user".to_string()))?;

        PermissionRepository::new(self.pool())
            .grant(&NewGrant::new(user_id, file_id, kind))
            .await
    }

    /// Revoke a user's access to a file. Owner-only.
    ///
    /// Returns `false` if there was no grant to revoke.
    pub async fn revoke_access(
        &self,
        requester_id: i64,
        file_id: i64,
        user_id: i64,
    ) -> Result<bool> {
        let record = FileRepository::new(self.pool())
            .get_by_id(file_id)
            .await?
            .ok_or_else(|| LoftError::NotFound("file".to_string()))?;

        if record.owner_id != requester_id {
            return Err(LoftError::PermissionDenied(
                "only the owner can revoke access".to_string(),
            ));
        }

        PermissionRepository::new(self.pool())
            .revoke(user_id, file_id)
            .await
    }

    /// Update a file's comment or lock flag. Owner-only.
    pub async fn update_record(
        &self,
        requester_id: i64,
        file_id: i64,
        update: FileRecordUpdate,
    ) -> Result<FileRecord> {
        if let Some(ref comment) = update.comment {
            if comment.chars().count() > MAX_COMMENT_LENGTH {
                return Err(LoftError::Validation(format!(
                    "comment must be at most {MAX_COMMENT_LENGTH} characters"
                )));
            }
        }

        let files = FileRepository::new(self.pool());
        let record = files
            .get_by_id(file_id)
            .await?
            .ok_or_else(|| LoftError::NotFound("file".to_string()))?;

        if record.owner_id != requester_id {
            return Err(LoftError::PermissionDenied(
                "only the owner can edit file metadata".to_string(),
            ));
        }

        files
            .update(file_id, &update)
            .await?
            .ok_or_else(|| LoftError::NotFound("file".to_string()))
    }

    /// List every file the requester owns.
    pub async fn list_owned(&self, requester_id: i64) -> Result<Vec<FileRecord>> {
        FileRepository::new(self.pool())
            .list_by_owner(requester_id)
            .await
    }

    /// List every file shared with the requester.
    pub async fn list_shared_with(&self, requester_id: i64) -> Result<Vec<FileRecord>> {
        FileRepository::new(self.pool())
            .list_shared_with(requester_id)
            .await
    }

    /// Ownership or any grant (read or write) allows reading.
    async fn can_read(&self, requester_id: i64, record: &FileRecord) -> Result<bool> {
        if record.owner_id == requester_id {
            return Ok(true);
        }
        PermissionRepository::new(self.pool())
            .has_grant(requester_id, record.id)
            .await
    }
}

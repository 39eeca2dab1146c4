//! Local filesystem storage backend.
//!
//! Physical layout: `<upload_root>/<owner_id>/<backend_ref>`, where the
//! backend reference is the logical folder path plus a unique object
//! name. Folders are real directories.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::{
    join_path, unique_object_name, ByteStream, RetrievedObject, StorageBackend, StoredObject,
};
use crate::{LoftError, Result};

/// Local filesystem storage backend.
pub struct LocalDiskBackend {
    /// Base directory; per-owner trees live directly below it.
    root: PathBuf,
}

impl LocalDiskBackend {
    /// Create a new local backend rooted at `root`.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        info!("local storage backend initialized at {:?}", root);
        Ok(Self { root })
    }

    /// Base directory of this backend.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path inside an owner's tree.
    ///
    /// Backend references come from the database, but they are still
    /// checked segment-by-segment so a corrupted ref can never address
    /// anything outside the owner's root.
    fn resolve(&self, owner_id: i64, relative: &str) -> Result<PathBuf> {
        let mut path = self.root.join(owner_id.to_string());
        for segment in relative.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(LoftError::Validation(format!(
                    "invalid storage path: {relative:?}"
                )));
            }
            path.push(segment);
        }
        Ok(path)
    }

    /// Resolve a folder path (possibly the owner's root).
    fn resolve_folder(&self, owner_id: i64, folder_path: &str) -> Result<PathBuf> {
        if folder_path.is_empty() {
            Ok(self.root.join(owner_id.to_string()))
        } else {
            self.resolve(owner_id, folder_path)
        }
    }
}

#[async_trait]
impl StorageBackend for LocalDiskBackend {
    async fn create_folder(&self, owner_id: i64, folder_path: &str) -> Result<()> {
        let path = self.resolve_folder(owner_id, folder_path)?;
        debug!("local: create_folder {:?}", path);
        tokio::fs::create_dir_all(&path).await?;
        Ok(())
    }

    async fn folder_exists(&self, owner_id: i64, folder_path: &str) -> Result<bool> {
        let path = self.resolve_folder(owner_id, folder_path)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(
        &self,
        owner_id: i64,
        data: Vec<u8>,
        display_name: &str,
        _mime_type: &str,
        folder_path: &str,
    ) -> Result<StoredObject> {
        let backend_ref = join_path(folder_path, &unique_object_name(display_name));
        let path = self.resolve(owner_id, &backend_ref)?;
        debug!("local: store {:?} ({} bytes)", path, data.len());

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;

        Ok(StoredObject {
            backend_ref,
            public_url: None,
        })
    }

    async fn retrieve(&self, owner_id: i64, backend_ref: &str) -> Result<Option<RetrievedObject>> {
        let path = self.resolve(owner_id, backend_ref)?;
        debug!("local: retrieve {:?}", path);

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let size = file.metadata().await?.len();
        let body: ByteStream = Box::pin(ReaderStream::new(file));

        Ok(Some(RetrievedObject { size, body }))
    }

    async fn remove(&self, owner_id: i64, backend_ref: &str) -> Result<bool> {
        let path = self.resolve(owner_id, backend_ref)?;
        debug!("local: remove {:?}", path);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_folder(&self, owner_id: i64, folder_path: &str) -> Result<()> {
        let path = self.resolve_folder(owner_id, folder_path)?;
        debug!("local: remove_folder {:?}", path);

        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_child_folders(&self, owner_id: i64, folder_path: &str) -> Result<Vec<String>> {
        let path = self.resolve_folder(owner_id, folder_path)?;

        let mut entries = match tokio::fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut folders = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                folders.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        folders.sort();
        Ok(folders)
    }
}

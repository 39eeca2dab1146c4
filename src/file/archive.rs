//! Archive import pipeline.
//!
//! Accepts a gzip-compressed tar archive, extracts it into a scratch
//! directory, and replays the extracted tree through the file service:
//! `create_folder` for each directory, `upload` for each file. The
//! scratch area is removed on every exit path. Per-entry failures are
//! reported, never rolled back; atomic batch import is a non-goal.

use std::io;
use std::path::{Path, PathBuf};

use async_compression::tokio::bufread::GzipDecoder;
use tokio::io::BufReader;
use tokio_tar::Archive;
use tracing::{info, warn};

use crate::storage::{normalize_folder_path, sanitize_display_name};
use crate::{LoftError, Result};

use super::service::{FileService, UploadRequest};

/// One entry that could not be imported.
#[derive(Debug)]
pub struct ImportFailure {
    /// Path of the entry inside the archive.
    pub path: String,
    /// Why it failed.
    pub reason: String,
}

/// Outcome of an archive import.
#[derive(Debug)]
pub struct ImportReport {
    /// Folder the archive was unpacked into.
    pub folder: String,
    /// Logical paths of the uploaded files.
    pub imported: Vec<String>,
    /// Entries that failed; the rest of the tree was still imported.
    pub failed: Vec<ImportFailure>,
}

/// Batch client of the file service that replays archive contents.
pub struct ArchiveImporter<'a> {
    service: &'a FileService<'a>,
}

impl<'a> ArchiveImporter<'a> {
    /// Create a new importer on top of a file service.
    pub fn new(service: &'a FileService<'a>) -> Self {
        Self { service }
    }

    /// Import a `.tar.gz`/`.tgz` archive into the requester's namespace.
    ///
    /// The archive lands in `<target_folder>/<archive stem>`. Format and
    /// extraction problems fail the whole operation with
    /// [`LoftError::ArchiveInvalid`]; failures of individual entries
    /// during the replay are collected in the report.
    pub async fn import(
        &self,
        requester_id: i64,
        archive_name: &str,
        data: Vec<u8>,
        target_folder: &str,
    ) -> Result<ImportReport> {
        let stem = archive_stem(archive_name).ok_or_else(|| {
            LoftError::ArchiveInvalid("archive must be a .tar.gz or .tgz file".to_string())
        })?;
        let stem = sanitize_display_name(stem);

        let target = normalize_folder_path(target_folder)?;
        let folder = if target.is_empty() {
            stem
        } else {
            format!("{target}/{stem}")
        };

        // Scratch area with guaranteed deletion on all exit paths.
        let scratch = tempfile::tempdir()?;

        let decoder = GzipDecoder::new(BufReader::new(data.as_slice()));
        let mut archive = Archive::new(decoder);
        archive
            .unpack(scratch.path())
            .await
            .map_err(|e| LoftError::ArchiveInvalid(e.to_string()))?;

        match self.service.create_folder(requester_id, &folder).await {
            Ok(_) | Err(LoftError::AlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }

        let (dirs, files) = collect_tree(scratch.path())?;

        let mut report = ImportReport {
            folder: folder.clone(),
            imported: Vec::new(),
            failed: Vec::new(),
        };

        for dir in dirs {
            let path = format!("{folder}/{dir}");
            match self.service.create_folder(requester_id, &path).await {
                Ok(_) | Err(LoftError::AlreadyExists(_)) => {}
                Err(e) => {
                    warn!(owner_id = requester_id, dir = %dir, error = %e, "folder import failed");
                    report.failed.push(ImportFailure {
                        path: dir,
                        reason: e.to_string(),
                    });
                }
            }
        }

        for (rel, abs) in files {
            let (file_folder, name) = match rel.rsplit_once('/') {
                Some((parent, name)) => (format!("{folder}/{parent}"), name.to_string()),
                None => (folder.clone(), rel.clone()),
            };

            let content = match tokio::fs::read(&abs).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(entry = %rel, error = %e, "could not read extracted entry");
                    report.failed.push(ImportFailure {
                        path: rel,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let mime_type = mime_guess::from_path(&name)
                .first_or_octet_stream()
                .essence_str()
                .to_string();

            match self
                .service
                .upload(
                    requester_id,
                    UploadRequest::new(&file_folder, &name, mime_type, content),
                )
                .await
            {
                Ok(record) => report.imported.push(record.logical_path),
                Err(e) => {
                    warn!(entry = %rel, error = %e, "entry import failed");
                    report.failed.push(ImportFailure {
                        path: rel,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            owner_id = requester_id,
            folder = %report.folder,
            imported = report.imported.len(),
            failed = report.failed.len(),
            "archive imported"
        );
        Ok(report)
    }
}

/// Strip a supported archive extension; `None` for anything else.
fn archive_stem(name: &str) -> Option<&str> {
    name.strip_suffix(".tar.gz")
        .or_else(|| name.strip_suffix(".tgz"))
        .filter(|stem| !stem.is_empty())
}

/// Collect the extracted tree depth-first: relative directory paths and
/// `(relative path, absolute path)` file pairs, each in sorted order.
fn collect_tree(root: &Path) -> io::Result<(Vec<String>, Vec<(String, PathBuf)>)> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    walk(root, "", &mut dirs, &mut files)?;
    Ok((dirs, files))
}

fn walk(
    dir: &Path,
    prefix: &str,
    dirs: &mut Vec<String>,
    files: &mut Vec<(String, PathBuf)>,
) -> io::Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let rel = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            dirs.push(rel.clone());
            walk(&entry.path(), &rel, dirs, files)?;
        } else if file_type.is_file() {
            files.push((rel, entry.path()));
        }
        // Anything else (symlinks, devices) is not replayed.
    }

    Ok(())
}

//! HTTP blob object store backend.
//!
//! Objects live under flat keys of the form `<owner_id>/<backend_ref>`;
//! folders are virtual and come into existence with their first object.
//! The store speaks a small REST protocol:
//!
//! - `PUT {endpoint}/{key}` uploads bytes and answers `{ "url": ... }`
//! - `GET {endpoint}/{key}` fetches bytes (404 = absent)
//! - `DELETE {endpoint}/{key}` removes one object (404 = absent)
//! - `GET {endpoint}/?prefix=p` lists keys as `{ "blobs": [...] }`

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{
    join_path, unique_object_name, ByteStream, RetrievedObject, StorageBackend, StoredObject,
};
use crate::{LoftError, Result};

/// Connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Read timeout in seconds.
const READ_TIMEOUT_SECS: u64 = 30;

/// Total per-request timeout in seconds.
///
/// Every blob call is bounded so a slow store cannot block a worker
/// indefinitely.
const TOTAL_TIMEOUT_SECS: u64 = 60;

/// Response body of a `PUT` upload.
#[derive(Debug, Deserialize)]
struct PutResponse {
    url: String,
}

/// One entry of a prefix listing.
#[derive(Debug, Clone, Deserialize)]
struct BlobEntry {
    pathname: String,
    #[allow(dead_code)]
    size: u64,
}

/// Response body of a prefix listing.
#[derive(Debug, Deserialize)]
struct ListResponse {
    blobs: Vec<BlobEntry>,
}

/// HTTP blob store backend.
pub struct BlobStoreBackend {
    client: Client,
    endpoint: String,
    token: String,
}

impl BlobStoreBackend {
    /// Create a new blob backend for the given endpoint and bearer token.
    pub fn new(endpoint: &str, token: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .read_timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .timeout(Duration::from_secs(TOTAL_TIMEOUT_SECS))
            .build()
            .map_err(|e| LoftError::Storage(format!("failed to create HTTP client: {e}")))?;

        tracing::info!("blob storage backend initialized for {}", endpoint);

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Flat store key for an owner's backend reference.
    fn key(owner_id: i64, backend_ref: &str) -> String {
        format!("{owner_id}/{backend_ref}")
    }

    /// Full URL of an object.
    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.endpoint, key)
    }

    /// List every key under a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>> {
        let url = format!(
            "{}/?prefix={}",
            self.endpoint,
            urlencoding::encode(prefix)
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| LoftError::Storage(format!("list failed: {e}")))?;

        if !response.status().is_success() {
            return Err(LoftError::Storage(format!(
                "list failed with status {}",
                response.status()
            )));
        }

        let listing: ListResponse = response
            .json()
            .await
            .map_err(|e| LoftError::Storage(format!("invalid list response: {e}")))?;

        Ok(listing.blobs)
    }
}

#[async_trait]
impl StorageBackend for BlobStoreBackend {
    async fn create_folder(&self, owner_id: i64, folder_path: &str) -> Result<()> {
        // Folders are virtual; prefixes appear implicitly with objects.
        debug!("blob: create_folder {}/{} (no-op)", owner_id, folder_path);
        Ok(())
    }

    async fn folder_exists(&self, _owner_id: i64, _folder_path: &str) -> Result<bool> {
        // Virtual folders can never "already exist".
        Ok(false)
    }

    async fn store(
        &self,
        owner_id: i64,
        data: Vec<u8>,
        display_name: &str,
        mime_type: &str,
        folder_path: &str,
    ) -> Result<StoredObject> {
        let backend_ref = join_path(folder_path, &unique_object_name(display_name));
        let key = Self::key(owner_id, &backend_ref);
        debug!("blob: store {} ({} bytes)", key, data.len());

        let response = self
            .client
            .put(self.object_url(&key))
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(data)
            .send()
            .await
            .map_err(|e| LoftError::Storage(format!("upload failed: {e}")))?;

        if !response.status().is_success() {
            return Err(LoftError::Storage(format!(
                "upload failed with status {}",
                response.status()
            )));
        }

        let put: PutResponse = response
            .json()
            .await
            .map_err(|e| LoftError::Storage(format!("invalid upload response: {e}")))?;

        Ok(StoredObject {
            backend_ref,
            public_url: Some(put.url),
        })
    }

    async fn retrieve(&self, owner_id: i64, backend_ref: &str) -> Result<Option<RetrievedObject>> {
        let key = Self::key(owner_id, backend_ref);
        debug!("blob: retrieve {}", key);

        let response = self
            .client
            .get(self.object_url(&key))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| LoftError::Storage(format!("fetch failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(LoftError::Storage(format!(
                "fetch failed with status {}",
                response.status()
            )));
        }

        // The whole object is materialized here; blob objects are assumed
        // to be of moderate size.
        let buffer = response
            .bytes()
            .await
            .map_err(|e| LoftError::Storage(format!("fetch failed: {e}")))?;

        let size = buffer.len() as u64;
        let body: ByteStream =
            Box::pin(stream::once(async move { Ok::<Bytes, std::io::Error>(buffer) }));

        Ok(Some(RetrievedObject { size, body }))
    }

    async fn remove(&self, owner_id: i64, backend_ref: &str) -> Result<bool> {
        let key = Self::key(owner_id, backend_ref);
        debug!("blob: remove {}", key);

        let response = self
            .client
            .delete(self.object_url(&key))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| LoftError::StorageRemoveFailed(format!("delete failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(LoftError::StorageRemoveFailed(format!(
                "delete failed with status {}",
                response.status()
            )));
        }

        Ok(true)
    }

    async fn remove_folder(&self, owner_id: i64, folder_path: &str) -> Result<()> {
        let prefix = folder_prefix(owner_id, folder_path);
        debug!("blob: remove_folder prefix {}", prefix);

        for entry in self.list(&prefix).await? {
            let response = self
                .client
                .delete(self.object_url(&entry.pathname))
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(|e| LoftError::StorageRemoveFailed(format!("delete failed: {e}")))?;

            // A concurrently vanished object is not a failure here.
            if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
                return Err(LoftError::StorageRemoveFailed(format!(
                    "delete of {} failed with status {}",
                    entry.pathname,
                    response.status()
                )));
            }
        }

        Ok(())
    }

    async fn list_child_folders(&self, owner_id: i64, folder_path: &str) -> Result<Vec<String>> {
        let prefix = folder_prefix(owner_id, folder_path);
        let entries = self.list(&prefix).await?;
        let keys: Vec<String> = entries.into_iter().map(|e| e.pathname).collect();
        Ok(child_folders_from_keys(&prefix, &keys))
    }
}

/// Key prefix covering everything under an owner's folder.
fn folder_prefix(owner_id: i64, folder_path: &str) -> String {
    if folder_path.is_empty() {
        format!("{owner_id}/")
    } else {
        format!("{owner_id}/{folder_path}/")
    }
}

/// Derive immediate child folder names from flat keys under a prefix.
///
/// A key `p/a/b/c.txt` under prefix `p/` contributes child `a`; keys
/// directly under the prefix contribute nothing.
fn child_folders_from_keys(prefix: &str, keys: &[String]) -> Vec<String> {
    let mut children = BTreeSet::new();
    for key in keys {
        if let Some(rest) = key.strip_prefix(prefix) {
            if let Some((first, _)) = rest.split_once('/') {
                if !first.is_empty() {
                    children.insert(first.to_string());
                }
            }
        }
    }
    children.into_iter().collect()
}

//! Blob backend exercised against an in-process mock object store.
//!
//! The mock speaks the same protocol as the real store: PUT/GET/DELETE
//! on `/{key}`, prefix listing on `/`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::StreamExt;

use loft::{
    BlobStoreBackend, ByteStream, Database, FileService, LoftError, StorageBackend, UploadRequest,
};

#[derive(Default)]
struct MockStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

async fn put_object(
    State(store): State<Arc<MockStore>>,
    Path(key): Path<String>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    store.objects.lock().unwrap().insert(key.clone(), body.to_vec());
    Json(serde_json::json!({ "url": format!("https://blob.test/{key}") }))
}

async fn get_object(State(store): State<Arc<MockStore>>, Path(key): Path<String>) -> Response {
    match store.objects.lock().unwrap().get(&key) {
        Some(data) => data.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn delete_object(State(store): State<Arc<MockStore>>, Path(key): Path<String>) -> StatusCode {
    match store.objects.lock().unwrap().remove(&key) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

async fn list_objects(
    State(store): State<Arc<MockStore>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let prefix = params.get("prefix").cloned().unwrap_or_default();
    let objects = store.objects.lock().unwrap();
    let blobs: Vec<serde_json::Value> = objects
        .iter()
        .filter(|(key, _)| key.starts_with(&prefix))
        .map(|(key, data)| {
            serde_json::json!({
                "pathname": key,
                "size": data.len(),
                "url": format!("https://blob.test/{key}"),
            })
        })
        .collect();
    Json(serde_json::json!({ "blobs": blobs }))
}

/// Spawn the mock store, returning its endpoint and shared state.
async fn spawn_mock_store() -> (String, Arc<MockStore>) {
    let store = Arc::new(MockStore::default());
    let app = Router::new()
        .route("/", get(list_objects))
        .route(
            "/*key",
            get(get_object).put(put_object).delete(delete_object),
        )
        .with_state(store.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), store)
}

async fn collect(mut body: ByteStream) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = body.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}

#[tokio::test]
async fn store_retrieve_remove_roundtrip() {
    let (endpoint, mock) = spawn_mock_store().await;
    let backend = BlobStoreBackend::new(&endpoint, "test-token").unwrap();

    let stored = backend
        .store(7, b"blob bytes".to_vec(), "data.bin", "application/octet-stream", "docs")
        .await
        .unwrap();

    assert!(stored.backend_ref.starts_with("docs/"));
    assert!(stored
        .public_url
        .as_deref()
        .unwrap()
        .starts_with("https://blob.test/7/docs/"));
    assert_eq!(mock.objects.lock().unwrap().len(), 1);

    let retrieved = backend.retrieve(7, &stored.backend_ref).await.unwrap().unwrap();
    assert_eq!(retrieved.size, 10);
    assert_eq!(collect(retrieved.body).await, b"blob bytes");

    assert!(backend.remove(7, &stored.backend_ref).await.unwrap());
    assert!(backend.retrieve(7, &stored.backend_ref).await.unwrap().is_none());
    assert!(!backend.remove(7, &stored.backend_ref).await.unwrap());
}

#[tokio::test]
async fn virtual_folders() {
    let (endpoint, _mock) = spawn_mock_store().await;
    let backend = BlobStoreBackend::new(&endpoint, "test-token").unwrap();

    // Folder creation is a no-op and never "already exists".
    backend.create_folder(1, "docs").await.unwrap();
    backend.create_folder(1, "docs").await.unwrap();
    assert!(!backend.folder_exists(1, "docs").await.unwrap());

    // Prefixes appear with their first object.
    backend
        .store(1, b"a".to_vec(), "a.txt", "text/plain", "docs")
        .await
        .unwrap();
    backend
        .store(1, b"b".to_vec(), "b.txt", "text/plain", "docs/sub")
        .await
        .unwrap();
    backend
        .store(1, b"c".to_vec(), "c.txt", "text/plain", "")
        .await
        .unwrap();

    let top = backend.list_child_folders(1, "").await.unwrap();
    assert_eq!(top, vec!["docs".to_string()]);
    let docs = backend.list_child_folders(1, "docs").await.unwrap();
    assert_eq!(docs, vec!["sub".to_string()]);
}

#[tokio::test]
async fn remove_folder_deletes_by_prefix() {
    let (endpoint, mock) = spawn_mock_store().await;
    let backend = BlobStoreBackend::new(&endpoint, "test-token").unwrap();

    backend
        .store(1, b"x".to_vec(), "in.txt", "text/plain", "doomed")
        .await
        .unwrap();
    backend
        .store(1, b"y".to_vec(), "deep.txt", "text/plain", "doomed/sub")
        .await
        .unwrap();
    backend
        .store(1, b"z".to_vec(), "safe.txt", "text/plain", "kept")
        .await
        .unwrap();
    // Another owner's object under the same folder name survives.
    backend
        .store(2, b"w".to_vec(), "other.txt", "text/plain", "doomed")
        .await
        .unwrap();

    backend.remove_folder(1, "doomed").await.unwrap();

    let keys: Vec<String> = mock.objects.lock().unwrap().keys().cloned().collect();
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|k| !k.starts_with("1/doomed/")));
    assert!(keys.iter().any(|k| k.starts_with("2/doomed/")));
}

#[tokio::test]
async fn file_service_over_blob_backend() {
    let (endpoint, mock) = spawn_mock_store().await;
    let backend = BlobStoreBackend::new(&endpoint, "test-token").unwrap();

    let db = Database::open_in_memory().await.unwrap();
    for (name, email) in [("alice", "a@x.com"), ("bob", "b@x.com")] {
        sqlx::query("INSERT INTO users (username, email, password) VALUES ($1, $2, 'h')")
            .bind(name)
            .bind(email)
            .execute(db.pool())
            .await
            .unwrap();
    }

    let service = FileService::new(&db, &backend);

    // Upload persists a public URL alongside the backend ref.
    let record = service
        .upload(
            1,
            UploadRequest::new("docs", "report.pdf", "application/pdf", b"12345".to_vec()),
        )
        .await
        .unwrap();
    assert!(record.public_url.is_some());

    // Round-trip and counting work exactly as on local disk.
    let download = service.download(1, record.id).await.unwrap();
    assert_eq!(collect(download.body).await, b"12345");
    assert_eq!(download.record.download_count, 1);

    assert!(matches!(
        service.download(2, record.id).await,
        Err(LoftError::PermissionDenied(_))
    ));

    // Folder listings derive children from key prefixes.
    let root = service.list_directory(1, "").await.unwrap();
    assert_eq!(root.folders, vec!["docs".to_string()]);

    // Blob folders can never already exist.
    service.create_folder(1, "docs").await.unwrap();

    // Folder deletion clears metadata and the key prefix.
    let removed = service.delete_folder(1, "docs").await.unwrap();
    assert_eq!(removed, 1);
    assert!(mock.objects.lock().unwrap().is_empty());
    assert!(matches!(
        service.download(1, record.id).await,
        Err(LoftError::NotFound(_))
    ));
}

#[tokio::test]
async fn dangling_metadata_over_blob() {
    let (endpoint, mock) = spawn_mock_store().await;
    let backend = BlobStoreBackend::new(&endpoint, "test-token").unwrap();

    let db = Database::open_in_memory().await.unwrap();
    sqlx::query("INSERT INTO users (username, email, password) VALUES ('alice', 'a@x.com', 'h')")
        .execute(db.pool())
        .await
        .unwrap();

    let service = FileService::new(&db, &backend);
    let record = service
        .upload(
            1,
            UploadRequest::new("", "gone.txt", "text/plain", b"x".to_vec()),
        )
        .await
        .unwrap();

    // The object vanishes behind the service's back.
    mock.objects.lock().unwrap().clear();

    let result = service.download(1, record.id).await;
    assert!(matches!(result, Err(LoftError::NotFoundInBackend(_))));
}

//! End-to-end flows over the local-disk backend, using the public API
//! the way an HTTP boundary would.

use futures::StreamExt;
use tempfile::TempDir;

use loft::{
    ArchiveImporter, ByteStream, Database, FileService, GrantKind, LoftError, LocalDiskBackend,
    RegistrationRequest, UploadRequest,
};

async fn setup() -> (Database, TempDir, LocalDiskBackend) {
    let db = Database::open_in_memory().await.unwrap();
    let dir = TempDir::new().unwrap();
    let backend = LocalDiskBackend::new(dir.path().join("files")).unwrap();
    (db, dir, backend)
}

async fn collect(mut body: ByteStream) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = body.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}

#[tokio::test]
async fn registration_upload_share_download_lifecycle() {
    let (db, _dir, backend) = setup().await;
    let service = FileService::new(&db, &backend);

    // Two registered users.
    let u1 = loft::register(
        db.pool(),
        &RegistrationRequest::new("alice", "alice@example.com", "alice's passphrase"),
    )
    .await
    .unwrap();
    let u2 = loft::register(
        db.pool(),
        &RegistrationRequest::new("bob", "bob@example.com", "bob's passphrase"),
    )
    .await
    .unwrap();

    // Login works by username or email; failures are uniform.
    assert!(
        loft::verify_credentials(db.pool(), "alice", "alice's passphrase")
            .await
            .is_ok()
    );
    assert!(matches!(
        loft::verify_credentials(db.pool(), "alice", "wrong").await,
        Err(LoftError::AuthFailure)
    ));

    // Alice uploads into a folder.
    service.create_folder(u1.id, "docs").await.unwrap();
    let record = service
        .upload(
            u1.id,
            UploadRequest::new("docs", "report.pdf", "application/pdf", b"12345".to_vec()),
        )
        .await
        .unwrap();
    assert_eq!(record.logical_path, "docs/report.pdf");
    assert_eq!(record.owner_id, u1.id);

    // Owner round-trip.
    let download = service.download(u1.id, record.id).await.unwrap();
    assert_eq!(download.size, 5);
    assert_eq!(collect(download.body).await, b"12345");

    // Bob is denied until Alice shares.
    assert!(matches!(
        service.download(u2.id, record.id).await,
        Err(LoftError::PermissionDenied(_))
    ));

    service
        .grant_access(u1.id, record.id, u2.id, GrantKind::Read)
        .await
        .unwrap();

    let shared = service.download(u2.id, record.id).await.unwrap();
    assert_eq!(collect(shared.body).await, b"12345");
    assert_eq!(shared.record.download_count, 2);

    // Bob sees the file in his shared listing, under its parent folder.
    let listing = service.list_directory(u2.id, "docs").await.unwrap();
    assert!(listing.files.iter().any(|f| f.id == record.id));

    // A read grant is not a delete right.
    assert!(matches!(
        service.delete(u2.id, record.id).await,
        Err(LoftError::PermissionDenied(_))
    ));
    service.delete(u1.id, record.id).await.unwrap();
    assert!(matches!(
        service.download(u1.id, record.id).await,
        Err(LoftError::NotFound(_))
    ));
}

#[tokio::test]
async fn folder_tree_create_and_delete() {
    let (db, _dir, backend) = setup().await;
    let service = FileService::new(&db, &backend);

    let user = loft::register(
        db.pool(),
        &RegistrationRequest::new("carol", "carol@example.com", "carol's passphrase"),
    )
    .await
    .unwrap();

    service.create_folder(user.id, "archive/2024").await.unwrap();
    service
        .upload(
            user.id,
            UploadRequest::new("archive/2024", "ledger.csv", "text/csv", b"a,b".to_vec()),
        )
        .await
        .unwrap();
    service
        .upload(
            user.id,
            UploadRequest::new("archive", "index.txt", "text/plain", b"idx".to_vec()),
        )
        .await
        .unwrap();

    let removed = service.delete_folder(user.id, "archive").await.unwrap();
    assert_eq!(removed, 2);

    let root = service.list_directory(user.id, "").await.unwrap();
    assert!(!root.folders.contains(&"archive".to_string()));

    let under = service.list_directory(user.id, "archive/2024").await.unwrap();
    assert!(under.files.is_empty());
    assert!(under.folders.is_empty());
}

#[tokio::test]
async fn archive_import_replays_tree() {
    use tokio::io::AsyncWriteExt;

    let (db, _dir, backend) = setup().await;
    let service = FileService::new(&db, &backend);
    let importer = ArchiveImporter::new(&service);

    let user = loft::register(
        db.pool(),
        &RegistrationRequest::new("dave", "dave@example.com", "dave's passphrase"),
    )
    .await
    .unwrap();

    // Build a small tar.gz in memory.
    let mut builder = tokio_tar::Builder::new(Vec::new());
    for (path, data) in [
        ("notes.md", b"# notes".as_slice()),
        ("src/main.rs", b"fn main() {}".as_slice()),
    ] {
        let mut header = tokio_tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, data).await.unwrap();
    }
    let tar_bytes = builder.into_inner().await.unwrap();
    let mut encoder = async_compression::tokio::write::GzipEncoder::new(Vec::new());
    encoder.write_all(&tar_bytes).await.unwrap();
    encoder.shutdown().await.unwrap();
    let archive = encoder.into_inner();

    let report = importer
        .import(user.id, "project.tar.gz", archive, "")
        .await
        .unwrap();

    assert_eq!(report.folder, "project");
    assert!(report.failed.is_empty());
    assert_eq!(report.imported.len(), 2);

    let listing = service.list_directory(user.id, "project").await.unwrap();
    assert_eq!(listing.folders, vec!["src".to_string()]);

    let notes = listing
        .files
        .iter()
        .find(|f| f.display_name == "notes.md")
        .unwrap();
    let download = service.download(user.id, notes.id).await.unwrap();
    assert_eq!(collect(download.body).await, b"# notes");
}

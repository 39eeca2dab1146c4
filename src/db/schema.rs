//! Database schema and migrations for LOFT.
//!
//! Migrations are applied sequentially when the database is opened;
//! the `schema_version` table tracks which have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: Users table for identity and credential storage
    r#"
CREATE TABLE users (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    username    TEXT NOT NULL UNIQUE,
    email       TEXT NOT NULL UNIQUE,
    password    TEXT NOT NULL,           -- Argon2 hash
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_users_username ON users(username);
CREATE INDEX idx_users_email ON users(email);
"#,
    // v2: File metadata records
    r#"
-- One row per stored object. logical_path is the user-facing virtual
-- path; backend_ref is the opaque token the storage backend returned at
-- write time and is the only way to reach the bytes again.
CREATE TABLE files (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id       INTEGER NOT NULL REFERENCES users(id),
    logical_path   TEXT NOT NULL,
    display_name   TEXT NOT NULL,
    size           INTEGER NOT NULL,
    mime_type      TEXT NOT NULL,
    backend_ref    TEXT NOT NULL,
    public_url     TEXT,
    download_count INTEGER NOT NULL DEFAULT 0,
    locked         INTEGER NOT NULL DEFAULT 0,
    comment        TEXT NOT NULL DEFAULT '',
    uploaded_at    TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_files_owner_id ON files(owner_id);
CREATE INDEX idx_files_owner_path ON files(owner_id, logical_path);
"#,
    // v3: Per-(user, file) permission grants
    r#"
-- Ownership is derived from files.owner_id and is never recorded here.
CREATE TABLE permissions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    file_id     INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    kind        TEXT NOT NULL,           -- 'read' or 'write'
    granted_at  TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(user_id, file_id)
);

CREATE INDEX idx_permissions_user_id ON permissions(user_id);
CREATE INDEX idx_permissions_file_id ON permissions(file_id);
"#,
];

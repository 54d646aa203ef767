//! Database access for opencon
//!
//! SQLite via sqlx. Repositories are per-entity modules of free async
//! functions; importer-path functions take `&mut SqliteConnection` so the
//! whole reconciliation run can share one transaction, read paths take
//! the pool.

pub mod conferences;
pub mod lecturers;
pub mod rooms;
pub mod sessions;
pub mod tracks;
pub mod users;

use anyhow::Result;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    tracing::debug!("Connecting to database: {}", db_path.display());

    // foreign_keys set as a connect option so every pooled connection
    // enforces it, not just the one a PRAGMA statement happens to hit.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create all tables if they don't exist. Idempotent.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conferences (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            acronym TEXT NOT NULL,
            source_uri TEXT NOT NULL UNIQUE,
            checksum TEXT,
            last_updated TEXT NOT NULL,
            created TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS locations (
            id TEXT PRIMARY KEY,
            conference_id TEXT NOT NULL REFERENCES conferences(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            slug TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            id TEXT PRIMARY KEY,
            conference_id TEXT NOT NULL REFERENCES conferences(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            slug TEXT NOT NULL,
            color TEXT NOT NULL DEFAULT 'black',
            display_order INTEGER NOT NULL,
            UNIQUE(conference_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rooms (
            id TEXT PRIMARY KEY,
            conference_id TEXT NOT NULL REFERENCES conferences(id) ON DELETE CASCADE,
            location_id TEXT REFERENCES locations(id),
            name TEXT NOT NULL,
            slug TEXT NOT NULL,
            UNIQUE(conference_id, slug)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            conference_id TEXT NOT NULL REFERENCES conferences(id) ON DELETE CASCADE,
            unique_id TEXT NOT NULL,
            title TEXT,
            url TEXT,
            abstract TEXT,
            description TEXT,
            bookmarkable INTEGER NOT NULL DEFAULT 0,
            rateable INTEGER NOT NULL DEFAULT 0,
            track_id TEXT REFERENCES tracks(id),
            room_id TEXT REFERENCES rooms(id),
            str_start_time TEXT,
            start_at TEXT,
            duration_secs INTEGER,
            end_at TEXT,
            UNIQUE(conference_id, unique_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lecturers (
            id TEXT PRIMARY KEY,
            conference_id TEXT NOT NULL REFERENCES conferences(id) ON DELETE CASCADE,
            external_id TEXT NOT NULL,
            display_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            slug TEXT NOT NULL,
            bio TEXT,
            organization TEXT,
            thumbnail_url TEXT,
            social_networks TEXT NOT NULL DEFAULT '[]',
            UNIQUE(conference_id, external_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session_lecturers (
            session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            lecturer_id TEXT NOT NULL REFERENCES lecturers(id) ON DELETE CASCADE,
            PRIMARY KEY(session_id, lecturer_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            created TEXT NOT NULL,
            push_token TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bookmarks (
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            PRIMARY KEY(user_id, session_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rates (
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            rate INTEGER NOT NULL,
            PRIMARY KEY(user_id, session_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pooled_connections_enforce_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database_pool(&dir.path().join("opencon.db")).await.unwrap();

        // An orphan bookmark must be rejected on whichever pooled
        // connection serves the insert.
        let result = sqlx::query("INSERT INTO bookmarks (user_id, session_id) VALUES (?, ?)")
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(uuid::Uuid::new_v4().to_string())
            .execute(&pool)
            .await;
        assert!(result.is_err());
    }
}

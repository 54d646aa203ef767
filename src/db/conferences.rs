//! Conference repository
//!
//! One active conference per deployment: the most-recently-created row
//! wins. `last_updated` is stored as a naive `YYYY-MM-DD HH:MM:SS.ffffff`
//! string so the client freshness token compares lexicographically and
//! temporally at once.

use crate::Result;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Format for `last_updated` / `created` stamps.
const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Naive UTC timestamp in the lexicographically ordered stamp format.
pub fn now_stamp() -> String {
    chrono::Utc::now().naive_utc().format(STAMP_FORMAT).to_string()
}

#[derive(Debug, Clone)]
pub struct Conference {
    pub id: Uuid,
    pub name: String,
    pub acronym: String,
    pub source_uri: String,
    pub checksum: Option<String>,
    pub last_updated: String,
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Conference> {
    let id: String = row.get("id");
    Ok(Conference {
        id: Uuid::parse_str(&id)
            .map_err(|e| crate::Error::Internal(format!("Bad conference id: {}", e)))?,
        name: row.get("name"),
        acronym: row.get("acronym"),
        source_uri: row.get("source_uri"),
        checksum: row.get("checksum"),
        last_updated: row.get("last_updated"),
    })
}

pub async fn find_by_source_uri(
    conn: &mut SqliteConnection,
    source_uri: &str,
) -> Result<Option<Conference>> {
    let row = sqlx::query(
        "SELECT id, name, acronym, source_uri, checksum, last_updated
         FROM conferences WHERE source_uri = ?",
    )
    .bind(source_uri)
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(from_row).transpose()
}

/// Most-recently-created conference, if any.
pub async fn current(pool: &SqlitePool) -> Result<Option<Conference>> {
    let row = sqlx::query(
        "SELECT id, name, acronym, source_uri, checksum, last_updated
         FROM conferences ORDER BY created DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(from_row).transpose()
}

pub async fn create(
    conn: &mut SqliteConnection,
    name: &str,
    acronym: &str,
    source_uri: &str,
) -> Result<Conference> {
    let id = Uuid::new_v4();
    let stamp = now_stamp();

    sqlx::query(
        "INSERT INTO conferences (id, name, acronym, source_uri, checksum, last_updated, created)
         VALUES (?, ?, ?, ?, NULL, ?, ?)",
    )
    .bind(id.to_string())
    .bind(name)
    .bind(acronym)
    .bind(source_uri)
    .bind(&stamp)
    .bind(&stamp)
    .execute(conn)
    .await?;

    Ok(Conference {
        id,
        name: name.to_string(),
        acronym: acronym.to_string(),
        source_uri: source_uri.to_string(),
        checksum: None,
        last_updated: stamp,
    })
}

/// Refresh the stored checksum and bump `last_updated`.
pub async fn set_checksum(
    conn: &mut SqliteConnection,
    conference_id: Uuid,
    checksum: &str,
) -> Result<String> {
    let stamp = now_stamp();
    sqlx::query("UPDATE conferences SET checksum = ?, last_updated = ? WHERE id = ?")
        .bind(checksum)
        .bind(&stamp)
        .bind(conference_id.to_string())
        .execute(conn)
        .await?;
    Ok(stamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::db::init_tables(&pool).await.unwrap();
        pool
    }

    #[test]
    fn stamps_order_lexicographically() {
        let a = now_stamp();
        let b = now_stamp();
        assert!(b >= a);
        assert_eq!(a.len(), "2024-11-08 09:30:00.000000".len());
    }

    #[tokio::test]
    async fn most_recently_created_wins() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        create(&mut conn, "Old", "old-2023", "uri-a").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let newer = create(&mut conn, "New", "new-2024", "uri-b").await.unwrap();
        drop(conn);

        let current = current(&pool).await.unwrap().unwrap();
        assert_eq!(current.id, newer.id);
        assert_eq!(current.acronym, "new-2024");
    }

    #[tokio::test]
    async fn checksum_refresh_bumps_last_updated() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let conference = create(&mut conn, "C", "c-2024", "uri").await.unwrap();
        let stamp = set_checksum(&mut conn, conference.id, "abc").await.unwrap();
        drop(conn);

        let reread = current(&pool).await.unwrap().unwrap();
        assert_eq!(reread.checksum.as_deref(), Some("abc"));
        assert_eq!(reread.last_updated, stamp);
        assert!(stamp >= conference.last_updated);
    }
}

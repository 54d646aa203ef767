//! Track repository
//!
//! Tracks are upserted by name per import, with sequential display order
//! in document order. The synthetic fallback track carries order -1.

use crate::Result;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Track {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub color: String,
    pub display_order: i64,
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Track> {
    let id: String = row.get("id");
    Ok(Track {
        id: Uuid::parse_str(&id)
            .map_err(|e| crate::Error::Internal(format!("Bad track id: {}", e)))?,
        name: row.get("name"),
        slug: row.get("slug"),
        color: row.get("color"),
        display_order: row.get("display_order"),
    })
}

/// Insert or update a track by (conference, name).
pub async fn upsert(
    conn: &mut SqliteConnection,
    conference_id: Uuid,
    name: &str,
    color: &str,
    display_order: i64,
) -> Result<Track> {
    let existing = sqlx::query(
        "SELECT id, name, slug, color, display_order
         FROM tracks WHERE conference_id = ? AND name = ?",
    )
    .bind(conference_id.to_string())
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    let slug = slug::slugify(name);

    if let Some(row) = existing {
        let track = from_row(&row)?;
        sqlx::query("UPDATE tracks SET slug = ?, color = ?, display_order = ? WHERE id = ?")
            .bind(&slug)
            .bind(color)
            .bind(display_order)
            .bind(track.id.to_string())
            .execute(conn)
            .await?;
        return Ok(Track {
            slug,
            color: color.to_string(),
            display_order,
            ..track
        });
    }

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO tracks (id, conference_id, name, slug, color, display_order)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(conference_id.to_string())
    .bind(name)
    .bind(&slug)
    .bind(color)
    .bind(display_order)
    .execute(conn)
    .await?;

    Ok(Track {
        id,
        name: name.to_string(),
        slug,
        color: color.to_string(),
        display_order,
    })
}

pub async fn list_by_conference(pool: &SqlitePool, conference_id: Uuid) -> Result<Vec<Track>> {
    let rows = sqlx::query(
        "SELECT id, name, slug, color, display_order
         FROM tracks WHERE conference_id = ? ORDER BY display_order",
    )
    .bind(conference_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_is_idempotent_by_name() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::db::init_tables(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let conference =
            crate::db::conferences::create(&mut conn, "C", "c", "uri").await.unwrap();

        let first = upsert(&mut conn, conference.id, "Main track", "black", 1)
            .await
            .unwrap();
        let second = upsert(&mut conn, conference.id, "Main track", "red", 2)
            .await
            .unwrap();
        drop(conn);

        assert_eq!(first.id, second.id);
        assert_eq!(second.color, "red");
        assert_eq!(second.slug, "main-track");

        let all = list_by_conference(&pool, conference.id).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].display_order, 2);
    }
}

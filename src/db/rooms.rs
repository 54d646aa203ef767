//! Location and room repository
//!
//! Rooms live in a fixed default location seeded when the conference is
//! created, and are upserted by slugified name.

use crate::Result;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Default location seeded on conference creation.
pub const DEFAULT_LOCATION_NAME: &str = "Noi Tech Park";
pub const DEFAULT_LOCATION_SLUG: &str = "noi";

#[derive(Debug, Clone)]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: Uuid,
    pub location_id: Option<Uuid>,
    pub name: String,
    pub slug: String,
}

pub async fn create_location(
    conn: &mut SqliteConnection,
    conference_id: Uuid,
    name: &str,
    slug: &str,
) -> Result<Location> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO locations (id, conference_id, name, slug) VALUES (?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(conference_id.to_string())
        .bind(name)
        .bind(slug)
        .execute(conn)
        .await?;

    Ok(Location {
        id,
        name: name.to_string(),
        slug: slug.to_string(),
    })
}

pub async fn find_location_by_slug(
    conn: &mut SqliteConnection,
    conference_id: Uuid,
    slug: &str,
) -> Result<Option<Location>> {
    let row = sqlx::query(
        "SELECT id, name, slug FROM locations WHERE conference_id = ? AND slug = ?",
    )
    .bind(conference_id.to_string())
    .bind(slug)
    .fetch_optional(conn)
    .await?;

    row.map(|row| {
        let id: String = row.get("id");
        Ok(Location {
            id: Uuid::parse_str(&id)
                .map_err(|e| crate::Error::Internal(format!("Bad location id: {}", e)))?,
            name: row.get("name"),
            slug: row.get("slug"),
        })
    })
    .transpose()
}

pub async fn list_locations(pool: &SqlitePool, conference_id: Uuid) -> Result<Vec<Location>> {
    let rows = sqlx::query("SELECT id, name, slug FROM locations WHERE conference_id = ?")
        .bind(conference_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.into_iter()
        .map(|row| {
            let id: String = row.get("id");
            Ok(Location {
                id: Uuid::parse_str(&id)
                    .map_err(|e| crate::Error::Internal(format!("Bad location id: {}", e)))?,
                name: row.get("name"),
                slug: row.get("slug"),
            })
        })
        .collect()
}

fn room_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Room> {
    let id: String = row.get("id");
    let location_id: Option<String> = row.get("location_id");
    Ok(Room {
        id: Uuid::parse_str(&id)
            .map_err(|e| crate::Error::Internal(format!("Bad room id: {}", e)))?,
        location_id: location_id
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| crate::Error::Internal(format!("Bad location id: {}", e)))?,
        name: row.get("name"),
        slug: row.get("slug"),
    })
}

/// Find a room by slug, creating it if absent.
pub async fn upsert_by_slug(
    conn: &mut SqliteConnection,
    conference_id: Uuid,
    location_id: Option<Uuid>,
    name: &str,
) -> Result<Room> {
    let slug = slug::slugify(name);

    let existing = sqlx::query(
        "SELECT id, location_id, name, slug FROM rooms WHERE conference_id = ? AND slug = ?",
    )
    .bind(conference_id.to_string())
    .bind(&slug)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(row) = existing {
        return room_from_row(&row);
    }

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO rooms (id, conference_id, location_id, name, slug) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(conference_id.to_string())
    .bind(location_id.map(|l| l.to_string()))
    .bind(name)
    .bind(&slug)
    .execute(conn)
    .await?;

    Ok(Room {
        id,
        location_id,
        name: name.to_string(),
        slug,
    })
}

pub async fn find_room_name(pool: &SqlitePool, room_id: Uuid) -> Result<Option<String>> {
    let name: Option<String> = sqlx::query_scalar("SELECT name FROM rooms WHERE id = ?")
        .bind(room_id.to_string())
        .fetch_optional(pool)
        .await?;
    Ok(name)
}

pub async fn list_by_conference(pool: &SqlitePool, conference_id: Uuid) -> Result<Vec<Room>> {
    let rows = sqlx::query(
        "SELECT id, location_id, name, slug FROM rooms WHERE conference_id = ? ORDER BY name",
    )
    .bind(conference_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(room_from_row).collect()
}

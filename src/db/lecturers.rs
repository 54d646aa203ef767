//! Lecturer repository and session associations
//!
//! Lecturers are upserted by (conference, external id). The session↔
//! lecturer association is replaced per session on every import, so
//! re-imports never duplicate pairs.

use crate::Result;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Lecturer {
    pub id: Uuid,
    pub external_id: String,
    pub display_name: String,
    pub first_name: String,
    pub last_name: String,
    pub slug: String,
    pub bio: Option<String>,
    pub organization: Option<String>,
    pub thumbnail_url: Option<String>,
    pub social_networks: Vec<String>,
}

/// Fields written on every upsert.
#[derive(Debug, Clone)]
pub struct LecturerUpsert {
    pub external_id: String,
    pub display_name: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: Option<String>,
    pub organization: Option<String>,
    pub thumbnail_url: Option<String>,
    pub social_networks: Vec<String>,
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Lecturer> {
    let id: String = row.get("id");
    let socials: String = row.get("social_networks");
    Ok(Lecturer {
        id: Uuid::parse_str(&id)
            .map_err(|e| crate::Error::Internal(format!("Bad lecturer id: {}", e)))?,
        external_id: row.get("external_id"),
        display_name: row.get("display_name"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        slug: row.get("slug"),
        bio: row.get("bio"),
        organization: row.get("organization"),
        thumbnail_url: row.get("thumbnail_url"),
        social_networks: serde_json::from_str(&socials).unwrap_or_default(),
    })
}

const COLUMNS: &str = "id, external_id, display_name, first_name, last_name, slug, bio,
         organization, thumbnail_url, social_networks";

/// Insert or update a lecturer by (conference, external id); returns the
/// stored row id.
pub async fn upsert(
    conn: &mut SqliteConnection,
    conference_id: Uuid,
    fields: &LecturerUpsert,
) -> Result<Uuid> {
    let socials = serde_json::to_string(&fields.social_networks)
        .map_err(|e| crate::Error::Internal(format!("Failed to serialize socials: {}", e)))?;
    let lecturer_slug = slug::slugify(&fields.display_name);

    let existing: Option<String> =
        sqlx::query_scalar("SELECT id FROM lecturers WHERE conference_id = ? AND external_id = ?")
            .bind(conference_id.to_string())
            .bind(&fields.external_id)
            .fetch_optional(&mut *conn)
            .await?;

    if let Some(id) = existing {
        sqlx::query(
            r#"
            UPDATE lecturers SET
                display_name = ?, first_name = ?, last_name = ?, slug = ?,
                bio = ?, organization = ?, thumbnail_url = ?, social_networks = ?
            WHERE id = ?
            "#,
        )
        .bind(&fields.display_name)
        .bind(&fields.first_name)
        .bind(&fields.last_name)
        .bind(&lecturer_slug)
        .bind(&fields.bio)
        .bind(&fields.organization)
        .bind(&fields.thumbnail_url)
        .bind(&socials)
        .bind(&id)
        .execute(conn)
        .await?;

        return Uuid::parse_str(&id)
            .map_err(|e| crate::Error::Internal(format!("Bad lecturer id: {}", e)));
    }

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO lecturers (
            id, conference_id, external_id, display_name, first_name,
            last_name, slug, bio, organization, thumbnail_url, social_networks
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(conference_id.to_string())
    .bind(&fields.external_id)
    .bind(&fields.display_name)
    .bind(&fields.first_name)
    .bind(&fields.last_name)
    .bind(&lecturer_slug)
    .bind(&fields.bio)
    .bind(&fields.organization)
    .bind(&fields.thumbnail_url)
    .bind(&socials)
    .execute(conn)
    .await?;

    Ok(id)
}

/// Replace the lecturer set attached to a session.
pub async fn set_session_lecturers(
    conn: &mut SqliteConnection,
    session_id: Uuid,
    lecturer_ids: &[Uuid],
) -> Result<()> {
    sqlx::query("DELETE FROM session_lecturers WHERE session_id = ?")
        .bind(session_id.to_string())
        .execute(&mut *conn)
        .await?;

    for lecturer_id in lecturer_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO session_lecturers (session_id, lecturer_id) VALUES (?, ?)",
        )
        .bind(session_id.to_string())
        .bind(lecturer_id.to_string())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub async fn list_by_conference(pool: &SqlitePool, conference_id: Uuid) -> Result<Vec<Lecturer>> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM lecturers WHERE conference_id = ?"
    ))
    .bind(conference_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

/// (session id, lecturer id) pairs for a conference.
pub async fn session_associations(
    pool: &SqlitePool,
    conference_id: Uuid,
) -> Result<Vec<(Uuid, Uuid)>> {
    let rows = sqlx::query(
        r#"
        SELECT sl.session_id, sl.lecturer_id
        FROM session_lecturers sl
        JOIN sessions s ON s.id = sl.session_id
        WHERE s.conference_id = ?
        "#,
    )
    .bind(conference_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let session_id: String = row.get("session_id");
            let lecturer_id: String = row.get("lecturer_id");
            Ok((
                Uuid::parse_str(&session_id)
                    .map_err(|e| crate::Error::Internal(format!("Bad session id: {}", e)))?,
                Uuid::parse_str(&lecturer_id)
                    .map_err(|e| crate::Error::Internal(format!("Bad lecturer id: {}", e)))?,
            ))
        })
        .collect()
}

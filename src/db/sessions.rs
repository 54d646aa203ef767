//! Session repository
//!
//! Sessions are the central entity: identity key is
//! (conference, external unique id), stable across imports. Instants are
//! stored as naive `YYYY-MM-DD HH:MM:SS` strings in conference-local time,
//! matching the shape the schedule document publishes.

use crate::Result;
use chrono::NaiveDateTime;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: Uuid,
    pub unique_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub abstract_text: Option<String>,
    pub description: Option<String>,
    pub bookmarkable: bool,
    pub rateable: bool,
    pub track_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
    pub start_at: Option<NaiveDateTime>,
    pub duration_secs: Option<i64>,
    pub end_at: Option<NaiveDateTime>,
}

impl SessionRow {
    /// Start time rendered in the stored string format.
    pub fn str_start_time(&self) -> Option<String> {
        self.start_at.map(|t| t.format(TIME_FORMAT).to_string())
    }

    /// Calendar day of the session, when it has a start time.
    pub fn date(&self) -> Option<String> {
        self.start_at.map(|t| t.format("%Y-%m-%d").to_string())
    }
}

fn parse_time(value: Option<String>) -> Result<Option<NaiveDateTime>> {
    value
        .map(|s| NaiveDateTime::parse_from_str(&s, TIME_FORMAT))
        .transpose()
        .map_err(|e| crate::Error::Internal(format!("Bad stored time: {}", e)))
}

fn parse_opt_uuid(value: Option<String>, what: &str) -> Result<Option<Uuid>> {
    value
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| crate::Error::Internal(format!("Bad {} id: {}", what, e)))
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SessionRow> {
    let id: String = row.get("id");
    Ok(SessionRow {
        id: Uuid::parse_str(&id)
            .map_err(|e| crate::Error::Internal(format!("Bad session id: {}", e)))?,
        unique_id: row.get("unique_id"),
        title: row.get("title"),
        url: row.get("url"),
        abstract_text: row.get("abstract"),
        description: row.get("description"),
        bookmarkable: row.get::<i64, _>("bookmarkable") != 0,
        rateable: row.get::<i64, _>("rateable") != 0,
        track_id: parse_opt_uuid(row.get("track_id"), "track")?,
        room_id: parse_opt_uuid(row.get("room_id"), "room")?,
        start_at: parse_time(row.get("start_at"))?,
        duration_secs: row.get("duration_secs"),
        end_at: parse_time(row.get("end_at"))?,
    })
}

const COLUMNS: &str = "id, unique_id, title, url, abstract, description, bookmarkable, rateable,
         track_id, room_id, start_at, duration_secs, end_at";

pub async fn find_by_unique_id(
    conn: &mut SqliteConnection,
    conference_id: Uuid,
    unique_id: &str,
) -> Result<Option<SessionRow>> {
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM sessions WHERE conference_id = ? AND unique_id = ?"
    ))
    .bind(conference_id.to_string())
    .bind(unique_id)
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(from_row).transpose()
}

pub async fn find_by_id(pool: &SqlitePool, session_id: Uuid) -> Result<Option<SessionRow>> {
    let row = sqlx::query(&format!("SELECT {COLUMNS} FROM sessions WHERE id = ?"))
        .bind(session_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(from_row).transpose()
}

pub async fn insert(
    conn: &mut SqliteConnection,
    conference_id: Uuid,
    session: &SessionRow,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (
            id, conference_id, unique_id, title, url, abstract, description,
            bookmarkable, rateable, track_id, room_id, str_start_time,
            start_at, duration_secs, end_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(session.id.to_string())
    .bind(conference_id.to_string())
    .bind(&session.unique_id)
    .bind(&session.title)
    .bind(&session.url)
    .bind(&session.abstract_text)
    .bind(&session.description)
    .bind(session.bookmarkable as i64)
    .bind(session.rateable as i64)
    .bind(session.track_id.map(|t| t.to_string()))
    .bind(session.room_id.map(|r| r.to_string()))
    .bind(session.str_start_time())
    .bind(session.start_at.map(|t| t.format(TIME_FORMAT).to_string()))
    .bind(session.duration_secs)
    .bind(session.end_at.map(|t| t.format(TIME_FORMAT).to_string()))
    .execute(conn)
    .await?;

    Ok(())
}

/// Overwrite all mutable fields of an existing session row.
pub async fn update(conn: &mut SqliteConnection, session: &SessionRow) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE sessions SET
            title = ?, url = ?, abstract = ?, description = ?,
            bookmarkable = ?, rateable = ?, track_id = ?, room_id = ?,
            str_start_time = ?, start_at = ?, duration_secs = ?, end_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&session.title)
    .bind(&session.url)
    .bind(&session.abstract_text)
    .bind(&session.description)
    .bind(session.bookmarkable as i64)
    .bind(session.rateable as i64)
    .bind(session.track_id.map(|t| t.to_string()))
    .bind(session.room_id.map(|r| r.to_string()))
    .bind(session.str_start_time())
    .bind(session.start_at.map(|t| t.format(TIME_FORMAT).to_string()))
    .bind(session.duration_secs)
    .bind(session.end_at.map(|t| t.format(TIME_FORMAT).to_string()))
    .bind(session.id.to_string())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn list_by_conference(
    pool: &SqlitePool,
    conference_id: Uuid,
) -> Result<Vec<SessionRow>> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM sessions WHERE conference_id = ? ORDER BY start_at, title"
    ))
    .bind(conference_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

pub async fn count_by_conference(pool: &SqlitePool, conference_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE conference_id = ?")
        .bind(conference_id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

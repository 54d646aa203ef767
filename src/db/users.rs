//! Anonymous users, bookmarks and rates
//!
//! Users are ephemeral identities created on every authorize call.
//! Bookmarks and rates both key on (user, session); the primary key makes
//! concurrent duplicate writes resolve onto the single row.

use crate::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub push_token: Option<String>,
}

/// Create a fresh anonymous user. No dedup.
pub async fn create_user(pool: &SqlitePool, push_token: Option<&str>) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, created, push_token) VALUES (?, ?, ?)")
        .bind(id.to_string())
        .bind(crate::db::conferences::now_stamp())
        .bind(push_token)
        .execute(pool)
        .await?;
    Ok(id)
}

pub async fn find_user(pool: &SqlitePool, user_id: Uuid) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, push_token FROM users WHERE id = ?")
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|row| User {
        id: user_id,
        push_token: row.get("push_token"),
    }))
}

pub async fn set_push_token(
    pool: &SqlitePool,
    user_id: Uuid,
    push_token: Option<&str>,
) -> Result<()> {
    sqlx::query("UPDATE users SET push_token = ? WHERE id = ?")
        .bind(push_token)
        .bind(user_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Bookmarks
// ---------------------------------------------------------------------------

pub async fn bookmark_exists(pool: &SqlitePool, user_id: Uuid, session_id: Uuid) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM bookmarks WHERE user_id = ? AND session_id = ?")
            .bind(user_id.to_string())
            .bind(session_id.to_string())
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

pub async fn insert_bookmark(pool: &SqlitePool, user_id: Uuid, session_id: Uuid) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO bookmarks (user_id, session_id) VALUES (?, ?)")
        .bind(user_id.to_string())
        .bind(session_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_bookmark(pool: &SqlitePool, user_id: Uuid, session_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM bookmarks WHERE user_id = ? AND session_id = ?")
        .bind(user_id.to_string())
        .bind(session_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Session ids the user has bookmarked.
pub async fn user_bookmarks(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<Uuid>> {
    let rows = sqlx::query("SELECT session_id FROM bookmarks WHERE user_id = ?")
        .bind(user_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.into_iter()
        .map(|row| {
            let id: String = row.get("session_id");
            Uuid::parse_str(&id)
                .map_err(|e| crate::Error::Internal(format!("Bad session id: {}", e)))
        })
        .collect()
}

/// Users who bookmarked a session and carry a push token.
pub async fn bookmark_recipients(
    pool: &SqlitePool,
    session_id: Uuid,
) -> Result<Vec<(Uuid, String)>> {
    let rows = sqlx::query(
        r#"
        SELECT u.id, u.push_token
        FROM bookmarks b
        JOIN users u ON u.id = b.user_id
        WHERE b.session_id = ? AND u.push_token IS NOT NULL
        "#,
    )
    .bind(session_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let id: String = row.get("id");
            let token: String = row.get("push_token");
            Ok((
                Uuid::parse_str(&id)
                    .map_err(|e| crate::Error::Internal(format!("Bad user id: {}", e)))?,
                token,
            ))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Rates
// ---------------------------------------------------------------------------

/// Upsert the single rate row per (user, session).
pub async fn upsert_rate(
    pool: &SqlitePool,
    user_id: Uuid,
    session_id: Uuid,
    rate: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO rates (user_id, session_id, rate) VALUES (?, ?, ?)
        ON CONFLICT(user_id, session_id) DO UPDATE SET rate = excluded.rate
        "#,
    )
    .bind(user_id.to_string())
    .bind(session_id.to_string())
    .bind(rate)
    .execute(pool)
    .await?;
    Ok(())
}

/// Arithmetic mean and count of all rates for one session.
pub async fn session_rating(pool: &SqlitePool, session_id: Uuid) -> Result<(f64, i64)> {
    let row = sqlx::query(
        "SELECT AVG(CAST(rate AS REAL)) AS avg_rate, COUNT(*) AS total FROM rates WHERE session_id = ?",
    )
    .bind(session_id.to_string())
    .fetch_one(pool)
    .await?;

    let total: i64 = row.get("total");
    let avg: Option<f64> = row.get("avg_rate");
    Ok((avg.unwrap_or(0.0), total))
}

/// (session id, avg, count) for every session of the conference with at
/// least one rate.
pub async fn ratings_by_session(
    pool: &SqlitePool,
    conference_id: Uuid,
) -> Result<Vec<(Uuid, f64, i64)>> {
    let rows = sqlx::query(
        r#"
        SELECT r.session_id, AVG(CAST(r.rate AS REAL)) AS avg_rate, COUNT(*) AS total
        FROM rates r
        JOIN sessions s ON s.id = r.session_id
        WHERE s.conference_id = ?
        GROUP BY r.session_id
        "#,
    )
    .bind(conference_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let id: String = row.get("session_id");
            Ok((
                Uuid::parse_str(&id)
                    .map_err(|e| crate::Error::Internal(format!("Bad session id: {}", e)))?,
                row.get("avg_rate"),
                row.get("total"),
            ))
        })
        .collect()
}

/// The caller's own rate per session.
pub async fn user_rates(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<(Uuid, i64)>> {
    let rows = sqlx::query("SELECT session_id, rate FROM rates WHERE user_id = ?")
        .bind(user_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.into_iter()
        .map(|row| {
            let id: String = row.get("session_id");
            Ok((
                Uuid::parse_str(&id)
                    .map_err(|e| crate::Error::Internal(format!("Bad session id: {}", e)))?,
                row.get("rate"),
            ))
        })
        .collect()
}

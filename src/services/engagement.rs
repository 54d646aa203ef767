//! User engagement: registration, bookmarks, session ratings.
//!
//! Users are anonymous rows keyed by UUID; registration never dedups, every
//! authorize call that lacks a valid token mints a fresh user. Ratings are
//! gated on the session's rateable flag and on the talk having started.

use crate::db;
use crate::{Error, Result};
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Aggregate returned after a successful rate.
#[derive(Debug, Serialize)]
pub struct RatingSummary {
    pub avg_rate: f64,
    pub total_rates: i64,
}

/// Create a fresh anonymous user, storing the push token when given.
pub async fn register_user(pool: &SqlitePool, push_token: Option<&str>) -> Result<Uuid> {
    let user_id = db::users::create_user(pool, push_token).await?;
    tracing::info!(user_id = %user_id, has_push_token = push_token.is_some(), "Registered user");
    Ok(user_id)
}

async fn require_user(pool: &SqlitePool, user_id: Uuid) -> Result<()> {
    if db::users::find_user(pool, user_id).await?.is_none() {
        return Err(Error::NotFound(format!("user {user_id}")));
    }
    Ok(())
}

/// Flip the bookmark state for (user, session); returns the new state.
pub async fn toggle_bookmark(pool: &SqlitePool, user_id: Uuid, session_id: Uuid) -> Result<bool> {
    require_user(pool, user_id).await?;
    if db::sessions::find_by_id(pool, session_id).await?.is_none() {
        return Err(Error::NotFound(format!("session {session_id}")));
    }

    let bookmarked = if db::users::bookmark_exists(pool, user_id, session_id).await? {
        db::users::delete_bookmark(pool, user_id, session_id).await?;
        false
    } else {
        db::users::insert_bookmark(pool, user_id, session_id).await?;
        true
    };
    Ok(bookmarked)
}

/// Record a 1..=5 rating for a started, rateable session.
///
/// Re-rating replaces the user's previous value. Sessions without a start
/// time can be rated at any point.
pub async fn rate_session(
    pool: &SqlitePool,
    user_id: Uuid,
    session_id: Uuid,
    rate: i64,
) -> Result<RatingSummary> {
    if !(1..=5).contains(&rate) {
        return Err(Error::InvalidRate);
    }

    require_user(pool, user_id).await?;
    let session = db::sessions::find_by_id(pool, session_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("session {session_id}")))?;

    if !session.rateable {
        return Err(Error::NotRateable);
    }
    if let Some(start_at) = session.start_at {
        if Utc::now().naive_utc() < start_at {
            return Err(Error::TooEarly);
        }
    }

    db::users::upsert_rate(pool, user_id, session_id, rate).await?;
    let (avg_rate, total_rates) = db::users::session_rating(pool, session_id).await?;
    Ok(RatingSummary {
        avg_rate,
        total_rates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sessions::SessionRow;
    use chrono::{Duration, NaiveDate};

    async fn pool_with_session(rateable: bool, starts_in_future: bool) -> (SqlitePool, Uuid) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        db::init_tables(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let conference =
            db::conferences::create(&mut conn, "Conf", "conf-2024", "uri").await.unwrap();
        let start_at = if starts_in_future {
            Utc::now().naive_utc() + Duration::hours(2)
        } else {
            NaiveDate::from_ymd_opt(2024, 11, 8).unwrap().and_hms_opt(9, 0, 0).unwrap()
        };
        let row = SessionRow {
            id: Uuid::new_v4(),
            unique_id: "e1".to_string(),
            title: Some("Talk".to_string()),
            url: None,
            abstract_text: None,
            description: None,
            bookmarkable: true,
            rateable,
            track_id: None,
            room_id: None,
            start_at: Some(start_at),
            duration_secs: Some(1800),
            end_at: None,
        };
        db::sessions::insert(&mut conn, conference.id, &row).await.unwrap();
        drop(conn);
        (pool, row.id)
    }

    #[tokio::test]
    async fn toggle_flips_and_flips_back() {
        let (pool, session_id) = pool_with_session(true, false).await;
        let user = register_user(&pool, None).await.unwrap();

        assert!(toggle_bookmark(&pool, user, session_id).await.unwrap());
        assert!(!toggle_bookmark(&pool, user, session_id).await.unwrap());
        assert!(toggle_bookmark(&pool, user, session_id).await.unwrap());
        assert_eq!(
            db::users::user_bookmarks(&pool, user).await.unwrap(),
            vec![session_id]
        );
    }

    #[tokio::test]
    async fn unknown_user_is_not_found_not_a_database_error() {
        let (pool, session_id) = pool_with_session(true, false).await;
        let ghost = Uuid::new_v4();

        let err = toggle_bookmark(&pool, ghost, session_id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = rate_session(&pool, ghost, session_id, 3).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn toggle_unknown_session_is_not_found() {
        let (pool, _) = pool_with_session(true, false).await;
        let user = register_user(&pool, None).await.unwrap();
        let err = toggle_bookmark(&pool, user, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn rate_out_of_range_rejected() {
        let (pool, session_id) = pool_with_session(true, false).await;
        let user = register_user(&pool, None).await.unwrap();
        for bad in [0, 6, -1] {
            let err = rate_session(&pool, user, session_id, bad).await.unwrap_err();
            assert!(matches!(err, Error::InvalidRate));
        }
    }

    #[tokio::test]
    async fn rate_not_rateable_session_rejected() {
        let (pool, session_id) = pool_with_session(false, false).await;
        let user = register_user(&pool, None).await.unwrap();
        let err = rate_session(&pool, user, session_id, 3).await.unwrap_err();
        assert!(matches!(err, Error::NotRateable));
    }

    #[tokio::test]
    async fn rate_before_start_rejected() {
        let (pool, session_id) = pool_with_session(true, true).await;
        let user = register_user(&pool, None).await.unwrap();
        let err = rate_session(&pool, user, session_id, 3).await.unwrap_err();
        assert!(matches!(err, Error::TooEarly));
    }

    #[tokio::test]
    async fn re_rate_replaces_and_average_reflects_all_users() {
        let (pool, session_id) = pool_with_session(true, false).await;
        let alice = register_user(&pool, None).await.unwrap();
        let bob = register_user(&pool, None).await.unwrap();
        let carol = register_user(&pool, None).await.unwrap();

        rate_session(&pool, alice, session_id, 1).await.unwrap();
        rate_session(&pool, alice, session_id, 2).await.unwrap();
        rate_session(&pool, bob, session_id, 5).await.unwrap();
        let summary = rate_session(&pool, carol, session_id, 5).await.unwrap();

        assert_eq!(summary.total_rates, 3);
        assert!((summary.avg_rate - 4.0).abs() < f64::EPSILON);
    }
}

//! Sync snapshot builder
//!
//! Assembles the read-model payload for one client poll. Bookmarks and
//! rating aggregates are cheap and user-specific, so they ship on every
//! call; the heavy denormalized schedule snapshot ships only when the
//! client's freshness token is older than the conference's last-updated
//! stamp. The lecturer map is rebuilt in display-name order because the
//! mobile client iterates it in insertion order.

use crate::db::{self, conferences::Conference};
use crate::Result;
use indexmap::IndexMap;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use uuid::Uuid;

/// Fixed polling hint returned on every call.
pub const NEXT_TRY_IN_MS: u64 = 3_000_000;

#[derive(Debug, Serialize)]
pub struct SyncPayload {
    pub last_updated: String,
    pub ratings: Ratings,
    pub bookmarks: Vec<Uuid>,
    pub next_try_in_ms: u64,
    pub conference: Option<ConferencePayload>,
}

#[derive(Debug, Serialize)]
pub struct Ratings {
    /// session id -> [average, count], sessions with at least one rate
    pub rates_by_session: HashMap<Uuid, (f64, i64)>,
    /// the caller's own rate per session
    pub my_rate_by_session: HashMap<Uuid, i64>,
}

#[derive(Debug, Serialize)]
pub struct ConferencePayload {
    pub acronym: String,
    pub db: DbMaps,
    pub idx: Indexes,
}

#[derive(Debug, Serialize)]
pub struct DbMaps {
    pub tracks: HashMap<Uuid, TrackPayload>,
    pub locations: HashMap<Uuid, LocationPayload>,
    pub rooms: HashMap<Uuid, RoomPayload>,
    pub sessions: HashMap<Uuid, SessionPayload>,
    /// Insertion order follows the display-name index.
    pub lecturers: IndexMap<Uuid, LecturerPayload>,
    pub sponsors: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct Indexes {
    pub ordered_lecturers_by_display_name: Vec<Uuid>,
    pub ordered_sessions_by_days: BTreeMap<String, Vec<Uuid>>,
    pub ordered_sessions_by_tracks: HashMap<Uuid, Vec<Uuid>>,
    pub days: Vec<String>,
    pub ordered_sponsors: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct TrackPayload {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub color: String,
    pub order: i64,
}

#[derive(Debug, Serialize)]
pub struct LocationPayload {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Serialize)]
pub struct RoomPayload {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub id_location: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SessionPayload {
    pub id: Uuid,
    pub unique_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub r#abstract: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub str_start_time: Option<String>,
    pub duration: Option<i64>,
    pub bookmarkable: bool,
    pub rateable: bool,
    pub id_track: Option<Uuid>,
    pub id_room: Option<Uuid>,
    pub id_lecturers: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct LecturerPayload {
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

/// Build the sync payload for one caller.
///
/// `last_updated` is the client's freshness token; when it is at least as
/// new as the conference's stored stamp the heavy snapshot is omitted.
pub async fn build_snapshot(
    pool: &SqlitePool,
    user_id: Uuid,
    conference: &Conference,
    last_updated: Option<&str>,
    sponsors_file: Option<&Path>,
) -> Result<SyncPayload> {
    let rates_by_session = db::users::ratings_by_session(pool, conference.id)
        .await?
        .into_iter()
        .map(|(id, avg, count)| (id, (avg, count)))
        .collect();
    let my_rate_by_session = db::users::user_rates(pool, user_id).await?.into_iter().collect();
    let bookmarks = db::users::user_bookmarks(pool, user_id).await?;

    let ratings = Ratings {
        rates_by_session,
        my_rate_by_session,
    };

    if let Some(token) = last_updated {
        if token >= conference.last_updated.as_str() {
            return Ok(SyncPayload {
                last_updated: conference.last_updated.clone(),
                ratings,
                bookmarks,
                next_try_in_ms: NEXT_TRY_IN_MS,
                conference: None,
            });
        }
    }

    let conference_payload = build_full_payload(pool, conference, sponsors_file).await?;

    Ok(SyncPayload {
        last_updated: conference.last_updated.clone(),
        ratings,
        bookmarks,
        next_try_in_ms: NEXT_TRY_IN_MS,
        conference: Some(conference_payload),
    })
}

async fn build_full_payload(
    pool: &SqlitePool,
    conference: &Conference,
    sponsors_file: Option<&Path>,
) -> Result<ConferencePayload> {
    let tracks: HashMap<Uuid, TrackPayload> = db::tracks::list_by_conference(pool, conference.id)
        .await?
        .into_iter()
        .map(|t| {
            (
                t.id,
                TrackPayload {
                    id: t.id,
                    name: t.name,
                    slug: t.slug,
                    color: t.color,
                    order: t.display_order,
                },
            )
        })
        .collect();

    let locations = db::rooms::list_locations(pool, conference.id)
        .await?
        .into_iter()
        .map(|l| {
            (
                l.id,
                LocationPayload {
                    id: l.id,
                    name: l.name,
                    slug: l.slug,
                },
            )
        })
        .collect();

    let rooms = db::rooms::list_by_conference(pool, conference.id)
        .await?
        .into_iter()
        .map(|r| {
            (
                r.id,
                RoomPayload {
                    id: r.id,
                    name: r.name,
                    slug: r.slug,
                    id_location: r.location_id,
                },
            )
        })
        .collect();

    // session id -> attached lecturers
    let mut lecturers_by_session: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (session_id, lecturer_id) in
        db::lecturers::session_associations(pool, conference.id).await?
    {
        lecturers_by_session.entry(session_id).or_default().push(lecturer_id);
    }

    let session_rows = db::sessions::list_by_conference(pool, conference.id).await?;
    let mut sessions = HashMap::new();
    let mut sessions_by_day: BTreeMap<String, Vec<Uuid>> = BTreeMap::new();
    let mut sessions_by_track: HashMap<Uuid, Vec<Uuid>> = HashMap::new();

    for row in session_rows {
        let date = row.date();
        if let Some(day) = &date {
            sessions_by_day.entry(day.clone()).or_default().push(row.id);
        }
        if let Some(track_id) = row.track_id {
            sessions_by_track.entry(track_id).or_default().push(row.id);
        }
        sessions.insert(
            row.id,
            SessionPayload {
                id: row.id,
                unique_id: row.unique_id.clone(),
                title: row.title.clone(),
                url: row.url.clone(),
                r#abstract: row.abstract_text.clone(),
                description: row.description.clone(),
                date,
                str_start_time: row.str_start_time(),
                duration: row.duration_secs,
                bookmarkable: row.bookmarkable,
                rateable: row.rateable,
                id_track: row.track_id,
                id_room: row.room_id,
                id_lecturers: lecturers_by_session.remove(&row.id).unwrap_or_default(),
            },
        );
    }
    // Tracks with no sessions still get an (empty) index entry.
    for track_id in tracks.keys() {
        sessions_by_track.entry(*track_id).or_default();
    }

    let mut lecturer_rows = db::lecturers::list_by_conference(pool, conference.id).await?;
    lecturer_rows.sort_by(|a, b| a.display_name.cmp(&b.display_name));
    let ordered_lecturers: Vec<Uuid> = lecturer_rows.iter().map(|l| l.id).collect();

    // Re-ordered map: insertion order matches the display-name index.
    let lecturers: IndexMap<Uuid, LecturerPayload> = lecturer_rows
        .into_iter()
        .map(|l| {
            (
                l.id,
                LecturerPayload {
                    id: l.id,
                    external_id: l.external_id,
                    display_name: l.display_name,
                    first_name: l.first_name,
                    last_name: l.last_name,
                    slug: l.slug,
                    bio: l.bio,
                    organization: l.organization,
                    thumbnail_url: l.thumbnail_url,
                    social_networks: l.social_networks,
                },
            )
        })
        .collect();

    let days: Vec<String> = sessions_by_day.keys().cloned().collect();

    let sponsors = load_sponsors(sponsors_file);

    Ok(ConferencePayload {
        acronym: conference.acronym.clone(),
        db: DbMaps {
            tracks,
            locations,
            rooms,
            sessions,
            lecturers,
            sponsors,
        },
        idx: Indexes {
            ordered_lecturers_by_display_name: ordered_lecturers,
            ordered_sessions_by_days: sessions_by_day,
            ordered_sessions_by_tracks: sessions_by_track,
            days,
            ordered_sponsors: Vec::new(),
        },
    })
}

fn load_sponsors(path: Option<&Path>) -> serde_json::Value {
    let Some(path) = path else {
        return serde_json::json!({});
    };
    match std::fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
    {
        Some(value) => value,
        None => {
            tracing::warn!(path = %path.display(), "Failed to load sponsors asset");
            serde_json::json!({})
        }
    }
}

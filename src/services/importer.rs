//! Reconciliation engine
//!
//! Merges a parsed schedule into the persisted conference, detecting
//! creates and updates and collecting a changeset of session start-time
//! moves. One import runs inside a single transaction, serialized per
//! source identifier, so concurrent imports of the same source cannot
//! race and an aborted import leaves no partial writes.

use crate::db::{self, conferences::Conference, tracks::Track};
use crate::schedule::{schedule_checksum, EventNode, Schedule, TrackRef};
use crate::schedule::sanitize_markup;
use crate::{Error, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Per-source import serialization: one async mutex per source identifier.
pub type ImportLocks = Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>;

/// A session start-time move detected during reconciliation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StartChange {
    pub old_start_timestamp: Option<NaiveDateTime>,
    pub new_start_timestamp: Option<NaiveDateTime>,
}

/// Result of one import run.
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub conference_id: Uuid,
    pub acronym: String,
    pub created: bool,
    pub checksum_matches: bool,
    pub changes: HashMap<Uuid, StartChange>,
}

/// Import a parsed schedule for the given source identifier.
///
/// Holds the per-source lock for the whole run. With `force == false` an
/// unchanged content checksum short-circuits before any entity write;
/// `force == true` always writes and still refreshes the checksum.
pub async fn import_schedule(
    pool: &SqlitePool,
    locks: &ImportLocks,
    schedule: &Schedule,
    source_uri: &str,
    force: bool,
    default_track: &str,
) -> Result<ImportOutcome> {
    let lock = source_lock(locks, source_uri).await;
    let _guard = lock.lock().await;

    let mut tx = pool.begin().await?;

    let existing = db::conferences::find_by_source_uri(&mut tx, source_uri).await?;
    let (conference, created) = match existing {
        Some(conference) => (conference, false),
        None => {
            let conference = db::conferences::create(
                &mut tx,
                &schedule.conference.title,
                &schedule.conference.acronym,
                source_uri,
            )
            .await?;
            db::rooms::create_location(
                &mut tx,
                conference.id,
                db::rooms::DEFAULT_LOCATION_NAME,
                db::rooms::DEFAULT_LOCATION_SLUG,
            )
            .await?;
            tracing::info!(
                conference_id = %conference.id,
                acronym = %conference.acronym,
                "Conference created"
            );
            (conference, true)
        }
    };

    let checksum = schedule_checksum(schedule)?;
    if !force && conference.checksum.as_deref() == Some(checksum.as_str()) {
        // Nothing has been written; drop the transaction.
        tracing::info!(conference_id = %conference.id, "Schedule unchanged, import short-circuited");
        return Ok(ImportOutcome {
            conference_id: conference.id,
            acronym: conference.acronym,
            created: false,
            checksum_matches: true,
            changes: HashMap::new(),
        });
    }
    db::conferences::set_checksum(&mut tx, conference.id, &checksum).await?;

    let tracks_by_name =
        reconcile_tracks(&mut tx, &conference, &schedule.tracks, default_track).await?;

    // Pass 1: duplicate detection across the whole document.
    collect_unique_ids(schedule)?;

    // Pass 2: actual upserts; its own seen-set guards against cross-room
    // duplicates surfacing here (first occurrence wins).
    let mut processed = HashSet::new();
    let mut changes = HashMap::new();
    apply_schedule(
        &mut tx,
        &conference,
        schedule,
        &tracks_by_name,
        default_track,
        &mut processed,
        &mut changes,
    )
    .await?;

    // A brand-new conference has no audience to notify about reschedules.
    if created {
        changes.clear();
    }

    tx.commit().await?;

    tracing::info!(
        conference_id = %conference.id,
        created,
        changed_sessions = changes.len(),
        "Import committed"
    );

    Ok(ImportOutcome {
        conference_id: conference.id,
        acronym: conference.acronym,
        created,
        checksum_matches: false,
        changes,
    })
}

async fn source_lock(locks: &ImportLocks, source_uri: &str) -> Arc<Mutex<()>> {
    if let Some(lock) = locks.read().await.get(source_uri) {
        return lock.clone();
    }
    let mut map = locks.write().await;
    map.entry(source_uri.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// Upsert tracks by name in document order; inject the synthetic fallback
/// track when the schedule lacks one.
async fn reconcile_tracks(
    conn: &mut SqliteConnection,
    conference: &Conference,
    tracks: &[TrackRef],
    default_track: &str,
) -> Result<HashMap<String, Track>> {
    let mut by_name = HashMap::new();
    let mut order = 0;

    for track_ref in tracks {
        order += 1;
        let name = canonical_track_name(track_ref.name());
        let color = track_ref.color().unwrap_or("black");
        let track = db::tracks::upsert(conn, conference.id, name, color, order).await?;
        by_name.insert(track.name.clone(), track);
    }

    if !by_name.contains_key(default_track) {
        let track = db::tracks::upsert(conn, conference.id, default_track, "black", -1).await?;
        by_name.insert(track.name.clone(), track);
    }

    Ok(by_name)
}

/// Pass 1: walk every event and reject a document that carries the same
/// unique id twice. Events without a unique id are skipped.
fn collect_unique_ids(schedule: &Schedule) -> Result<HashSet<String>> {
    let mut seen = HashSet::new();
    for day in &schedule.days {
        for room in &day.rooms {
            for event in &room.events {
                if let Some(unique_id) = &event.unique_id {
                    if !seen.insert(unique_id.clone()) {
                        return Err(Error::DuplicateEvent(unique_id.clone()));
                    }
                }
            }
        }
    }
    Ok(seen)
}

/// Pass 2: upsert rooms, sessions and lecturers. `processed` keeps the
/// inherited silent-skip-after-first-occurrence behavior.
async fn apply_schedule(
    conn: &mut SqliteConnection,
    conference: &Conference,
    schedule: &Schedule,
    tracks_by_name: &HashMap<String, Track>,
    default_track: &str,
    processed: &mut HashSet<String>,
    changes: &mut HashMap<Uuid, StartChange>,
) -> Result<()> {
    let location = db::rooms::find_location_by_slug(
        conn,
        conference.id,
        db::rooms::DEFAULT_LOCATION_SLUG,
    )
    .await?;
    let location_id = location.map(|l| l.id);

    for day in &schedule.days {
        let date = day.date.as_deref().ok_or(Error::Validation {
            code: "DAY_DATE_NOT_VALID",
            message: "Day date is not valid".to_string(),
        })?;

        for room in &day.rooms {
            let room_name = room.name.as_deref().ok_or(Error::Validation {
                code: "ROOM_NAME_NOT_VALID",
                message: "Room name is not valid".to_string(),
            })?;

            let db_room =
                db::rooms::upsert_by_slug(conn, conference.id, location_id, room_name).await?;

            for event in &room.events {
                let Some(unique_id) = &event.unique_id else {
                    continue;
                };
                if !processed.insert(unique_id.clone()) {
                    continue;
                }

                upsert_event(
                    conn,
                    conference,
                    db_room.id,
                    tracks_by_name,
                    default_track,
                    date,
                    unique_id,
                    event,
                    changes,
                )
                .await?;
            }
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn upsert_event(
    conn: &mut SqliteConnection,
    conference: &Conference,
    room_id: Uuid,
    tracks_by_name: &HashMap<String, Track>,
    default_track: &str,
    date: &str,
    unique_id: &str,
    event: &EventNode,
    changes: &mut HashMap<Uuid, StartChange>,
) -> Result<()> {
    let track_id = event
        .track
        .as_ref()
        .map(|t| canonical_event_track(t.name(), default_track))
        .and_then(|name| tracks_by_name.get(name))
        .map(|t| t.id);

    let start_at = parse_start(date, event.start.as_deref());
    let duration_secs = parse_duration(event.duration.as_deref());
    let end_at = match (start_at, duration_secs) {
        (Some(start), Some(secs)) => Some(start + Duration::seconds(secs)),
        _ => None,
    };

    let existing = db::sessions::find_by_unique_id(conn, conference.id, unique_id).await?;

    match existing {
        None => {
            let row = db::sessions::SessionRow {
                id: Uuid::new_v4(),
                unique_id: unique_id.to_string(),
                title: event.title.clone(),
                url: event.url.clone(),
                abstract_text: event.abstract_text.clone(),
                description: sanitize_markup(event.description.as_deref()),
                bookmarkable: event.bookmarkable,
                rateable: event.rateable,
                track_id,
                room_id: Some(room_id),
                start_at,
                duration_secs,
                end_at,
            };
            db::sessions::insert(conn, conference.id, &row).await?;
            attach_lecturers(conn, conference, row.id, event).await?;
        }
        Some(mut row) => {
            if row.start_at != start_at {
                changes.insert(
                    row.id,
                    StartChange {
                        old_start_timestamp: row.start_at,
                        new_start_timestamp: start_at,
                    },
                );
            }

            row.title = event.title.clone();
            row.url = event.url.clone();
            row.abstract_text = event.abstract_text.clone();
            row.description = sanitize_markup(event.description.as_deref());
            row.bookmarkable = event.bookmarkable;
            row.rateable = event.rateable;
            row.track_id = track_id;
            row.room_id = Some(room_id);
            row.start_at = start_at;
            row.duration_secs = duration_secs;
            row.end_at = end_at;
            db::sessions::update(conn, &row).await?;
            attach_lecturers(conn, conference, row.id, event).await?;
        }
    }

    Ok(())
}

async fn attach_lecturers(
    conn: &mut SqliteConnection,
    conference: &Conference,
    session_id: Uuid,
    event: &EventNode,
) -> Result<()> {
    let mut lecturer_ids = Vec::new();

    for person in &event.persons {
        let Some(external_id) = &person.external_id else {
            continue;
        };
        let (first_name, last_name) = split_display_name(&person.display_name);
        let fields = db::lecturers::LecturerUpsert {
            external_id: external_id.clone(),
            display_name: person.display_name.clone(),
            first_name,
            last_name,
            bio: sanitize_markup(person.bio.as_deref()),
            organization: person.organization.clone(),
            thumbnail_url: person.thumbnail_url.clone(),
            social_networks: person.socials.clone(),
        };
        lecturer_ids.push(db::lecturers::upsert(conn, conference.id, &fields).await?);
    }

    if !lecturer_ids.is_empty() {
        db::lecturers::set_session_lecturers(conn, session_id, &lecturer_ids).await?;
    }

    Ok(())
}

/// Track-level alias collapse for near-duplicate names in the source feed.
fn canonical_track_name(name: &str) -> &str {
    if name == "Main track - Main track" {
        "Main track"
    } else {
        name
    }
}

/// Event-level alias collapse: both main-track spellings resolve to the
/// default track.
fn canonical_event_track<'a>(name: &'a str, default_track: &'a str) -> &'a str {
    if name == "SFSCON - Main track" || name == "Main track - Main track" {
        default_track
    } else {
        name
    }
}

/// Parse a start instant from the day date and a fixed 5-character `HH:MM`
/// field. Absent or malformed input yields `None`, never an error.
fn parse_start(date: &str, start: Option<&str>) -> Option<NaiveDateTime> {
    let start = start?;
    if start.len() != 5 {
        return None;
    }
    let hour: u32 = start.get(0..2)?.parse().ok()?;
    let minute: u32 = start.get(3..5)?.parse().ok()?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(hour, minute, 0)
}

/// Parse a `HH:MM` duration into seconds; malformed input yields `None`.
fn parse_duration(duration: Option<&str>) -> Option<i64> {
    let duration = duration?;
    if duration.len() != 5 {
        return None;
    }
    let hours: i64 = duration.get(0..2)?.parse().ok()?;
    let minutes: i64 = duration.get(3..5)?.parse().ok()?;
    Some(hours * 3600 + minutes * 60)
}

/// Split a display name into (first, last): first name = first
/// space-separated token, capitalized; last name = remaining tokens joined,
/// capitalized as one string.
fn split_display_name(display_name: &str) -> (String, String) {
    let mut parts = display_name.split(' ');
    let first = capitalize(parts.next().unwrap_or(""));
    let rest = parts.collect::<Vec<_>>().join(" ");
    (first, capitalize(&rest))
}

/// First character uppercased, everything after it lowercased.
fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::parse_schedule;

    #[test]
    fn parses_start_and_duration() {
        let start = parse_start("2024-11-08", Some("09:30")).unwrap();
        assert_eq!(start.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-11-08 09:30:00");

        assert_eq!(parse_duration(Some("01:30")), Some(5400));
        assert_eq!(parse_duration(Some("00:45")), Some(2700));
    }

    #[test]
    fn malformed_times_become_none() {
        assert_eq!(parse_start("2024-11-08", Some("9:30")), None);
        assert_eq!(parse_start("2024-11-08", Some("ab:cd")), None);
        assert_eq!(parse_start("not-a-date", Some("09:30")), None);
        assert_eq!(parse_start("2024-11-08", None), None);
        assert_eq!(parse_duration(Some("90")), None);
        assert_eq!(parse_duration(None), None);
    }

    #[test]
    fn name_tokenization_matches_inherited_rule() {
        assert_eq!(
            split_display_name("jane doe smith"),
            ("Jane".to_string(), "Doe smith".to_string())
        );
        assert_eq!(
            split_display_name("ADA"),
            ("Ada".to_string(), "".to_string())
        );
        assert_eq!(split_display_name(""), ("".to_string(), "".to_string()));
    }

    #[test]
    fn track_alias_collapse() {
        assert_eq!(canonical_track_name("Main track - Main track"), "Main track");
        assert_eq!(canonical_track_name("Community"), "Community");
        assert_eq!(canonical_event_track("SFSCON - Main track", "SFSCON"), "SFSCON");
        assert_eq!(
            canonical_event_track("Main track - Main track", "SFSCON"),
            "SFSCON"
        );
        assert_eq!(canonical_event_track("Community", "SFSCON"), "Community");
    }

    #[test]
    fn pass_one_raises_on_duplicate_unique_id() {
        let xml = r#"
            <schedule>
              <conference><title>T</title><acronym>t</acronym></conference>
              <day date="2024-11-08">
                <room name="A"><event unique_id="dup"><title>X</title></event></room>
                <room name="B"><event unique_id="dup"><title>Y</title></event></room>
              </day>
            </schedule>
        "#;
        let schedule = parse_schedule(xml).unwrap();
        let err = collect_unique_ids(&schedule).unwrap_err();
        assert!(matches!(err, Error::DuplicateEvent(id) if id == "dup"));
    }

    #[tokio::test]
    async fn pass_two_silently_skips_already_processed_ids() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        db::init_tables(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let conference = db::conferences::create(&mut conn, "T", "t", "uri").await.unwrap();

        let xml = r#"
            <schedule>
              <conference><title>T</title><acronym>t</acronym></conference>
              <day date="2024-11-08">
                <room name="A"><event unique_id="seen"><title>X</title></event></room>
              </day>
            </schedule>
        "#;
        let schedule = parse_schedule(xml).unwrap();

        // Simulate the id having been handled earlier in the same pass.
        let mut processed = HashSet::from(["seen".to_string()]);
        let mut changes = HashMap::new();
        apply_schedule(
            &mut conn,
            &conference,
            &schedule,
            &HashMap::new(),
            "SFSCON",
            &mut processed,
            &mut changes,
        )
        .await
        .unwrap();
        drop(conn);

        // Skipped, not upserted.
        assert_eq!(
            db::sessions::count_by_conference(&pool, conference.id).await.unwrap(),
            0
        );
        assert!(changes.is_empty());
    }
}

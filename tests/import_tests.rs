//! Integration tests for the schedule import pipeline.

use chrono::NaiveDate;
use opencon::db;
use opencon::schedule::parse_schedule;
use opencon::services::importer::{self, ImportLocks};
use opencon::Error;
use sqlx::SqlitePool;

const FIXTURE: &str = include_str!("fixtures/sfscon2024.xml");
const SOURCE: &str = "https://www.sfscon.it/?calendar=xml";
const DEFAULT_TRACK: &str = "SFSCON";

async fn fresh_pool() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    db::init_tables(&pool).await.expect("Failed to initialize schema");
    pool
}

async fn session_id(pool: &SqlitePool, unique_id: &str) -> uuid::Uuid {
    let conference = db::conferences::current(pool).await.unwrap().unwrap();
    let mut conn = pool.acquire().await.unwrap();
    db::sessions::find_by_unique_id(&mut conn, conference.id, unique_id)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("session {unique_id} not found"))
        .id
}

#[tokio::test]
async fn first_import_creates_conference_and_entities() {
    let pool = fresh_pool().await;
    let locks = ImportLocks::default();
    let schedule = parse_schedule(FIXTURE).unwrap();

    let outcome =
        importer::import_schedule(&pool, &locks, &schedule, SOURCE, false, DEFAULT_TRACK)
            .await
            .unwrap();

    assert!(outcome.created);
    assert_eq!(outcome.acronym, "sfscon-2024");
    // New audiences have nothing bookmarked yet.
    assert!(outcome.changes.is_empty());

    let conference = db::conferences::current(&pool).await.unwrap().unwrap();
    assert_eq!(
        db::sessions::count_by_conference(&pool, conference.id).await.unwrap(),
        4
    );

    // The default location is seeded alongside the conference.
    let locations = db::rooms::list_locations(&pool, conference.id).await.unwrap();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].slug, "noi");

    // Rooms come from the day/room nesting, deduplicated across days.
    let rooms = db::rooms::list_by_conference(&pool, conference.id).await.unwrap();
    let mut names: Vec<_> = rooms.iter().map(|r| r.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["Seminar 1", "Seminar 2"]);
}

#[tokio::test]
async fn unchanged_reimport_short_circuits_on_checksum() {
    let pool = fresh_pool().await;
    let locks = ImportLocks::default();
    let schedule = parse_schedule(FIXTURE).unwrap();

    importer::import_schedule(&pool, &locks, &schedule, SOURCE, false, DEFAULT_TRACK)
        .await
        .unwrap();
    let before = db::conferences::current(&pool).await.unwrap().unwrap();

    let second =
        importer::import_schedule(&pool, &locks, &schedule, SOURCE, false, DEFAULT_TRACK)
            .await
            .unwrap();

    assert!(!second.created);
    assert!(second.checksum_matches);
    assert!(second.changes.is_empty());

    // Short-circuit writes nothing, not even the last-updated stamp.
    let after = db::conferences::current(&pool).await.unwrap().unwrap();
    assert_eq!(after.last_updated, before.last_updated);
}

#[tokio::test]
async fn forced_reimport_of_identical_schedule_reports_no_changes() {
    let pool = fresh_pool().await;
    let locks = ImportLocks::default();
    let schedule = parse_schedule(FIXTURE).unwrap();

    importer::import_schedule(&pool, &locks, &schedule, SOURCE, false, DEFAULT_TRACK)
        .await
        .unwrap();
    let outcome =
        importer::import_schedule(&pool, &locks, &schedule, SOURCE, true, DEFAULT_TRACK)
            .await
            .unwrap();

    assert!(!outcome.created);
    assert!(!outcome.checksum_matches);
    assert!(outcome.changes.is_empty());

    let conference = db::conferences::current(&pool).await.unwrap().unwrap();
    assert_eq!(
        db::sessions::count_by_conference(&pool, conference.id).await.unwrap(),
        4
    );
}

#[tokio::test]
async fn moved_start_time_lands_in_the_changeset() {
    let pool = fresh_pool().await;
    let locks = ImportLocks::default();

    let schedule = parse_schedule(FIXTURE).unwrap();
    importer::import_schedule(&pool, &locks, &schedule, SOURCE, false, DEFAULT_TRACK)
        .await
        .unwrap();
    let moved_id = session_id(&pool, "2024day1event1").await;

    let rescheduled = FIXTURE.replace("<start>09:30</start>", "<start>11:00</start>");
    let schedule = parse_schedule(&rescheduled).unwrap();
    let outcome =
        importer::import_schedule(&pool, &locks, &schedule, SOURCE, false, DEFAULT_TRACK)
            .await
            .unwrap();

    assert_eq!(outcome.changes.len(), 1);
    let change = &outcome.changes[&moved_id];
    let day = NaiveDate::from_ymd_opt(2024, 11, 8).unwrap();
    assert_eq!(change.old_start_timestamp, day.and_hms_opt(9, 30, 0));
    assert_eq!(change.new_start_timestamp, day.and_hms_opt(11, 0, 0));

    // The stored row carries the new time.
    let session = db::sessions::find_by_id(&pool, moved_id).await.unwrap().unwrap();
    assert_eq!(session.start_at, day.and_hms_opt(11, 0, 0));
}

#[tokio::test]
async fn duplicate_unique_id_aborts_without_partial_writes() {
    let pool = fresh_pool().await;
    let locks = ImportLocks::default();

    let duplicated = FIXTURE.replace("unique_id=\"2024day2event1\"", "unique_id=\"2024day1event1\"");
    let schedule = parse_schedule(&duplicated).unwrap();

    let err = importer::import_schedule(&pool, &locks, &schedule, SOURCE, false, DEFAULT_TRACK)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateEvent(_)));

    // The whole transaction rolled back, including conference creation.
    assert!(db::conferences::current(&pool).await.unwrap().is_none());
}

#[tokio::test]
async fn main_track_aliases_collapse_into_default_track() {
    let pool = fresh_pool().await;
    let locks = ImportLocks::default();
    let schedule = parse_schedule(FIXTURE).unwrap();

    importer::import_schedule(&pool, &locks, &schedule, SOURCE, false, DEFAULT_TRACK)
        .await
        .unwrap();

    let conference = db::conferences::current(&pool).await.unwrap().unwrap();
    let tracks = db::tracks::list_by_conference(&pool, conference.id).await.unwrap();
    let default_track = tracks
        .iter()
        .find(|t| t.name == DEFAULT_TRACK)
        .expect("fallback track missing");

    // "SFSCON - Main track" and "Main track - Main track" events both land
    // on the fallback track.
    let keynote = session_id(&pool, "2024day1event1").await;
    let hardware = session_id(&pool, "2024day2event1").await;
    let keynote_row = db::sessions::find_by_id(&pool, keynote).await.unwrap().unwrap();
    let hardware_row = db::sessions::find_by_id(&pool, hardware).await.unwrap().unwrap();
    assert_eq!(keynote_row.track_id, Some(default_track.id));
    assert_eq!(hardware_row.track_id, Some(default_track.id));
}

#[tokio::test]
async fn lecturers_are_upserted_and_attached() {
    let pool = fresh_pool().await;
    let locks = ImportLocks::default();
    let schedule = parse_schedule(FIXTURE).unwrap();

    importer::import_schedule(&pool, &locks, &schedule, SOURCE, false, DEFAULT_TRACK)
        .await
        .unwrap();

    let conference = db::conferences::current(&pool).await.unwrap().unwrap();
    let lecturers = db::lecturers::list_by_conference(&pool, conference.id).await.unwrap();
    // Three persons carry ids; the anonymous panel entry is skipped and the
    // speaker appearing on both days collapses into one row.
    assert_eq!(lecturers.len(), 3);

    let anna = lecturers.iter().find(|l| l.external_id == "p-anna").unwrap();
    assert_eq!(anna.first_name, "Anna");
    assert_eq!(anna.last_name, "Rossi mayr");
    assert_eq!(anna.social_networks, vec!["https://fosstodon.org/@anna"]);

    let assoc = db::lecturers::session_associations(&pool, conference.id).await.unwrap();
    let hardware = session_id(&pool, "2024day2event1").await;
    let on_hardware = assoc.iter().filter(|(s, _)| *s == hardware).count();
    assert_eq!(on_hardware, 2);
}

#[tokio::test]
async fn description_markup_is_sanitized_on_import() {
    let pool = fresh_pool().await;
    let locks = ImportLocks::default();
    let schedule = parse_schedule(FIXTURE).unwrap();

    importer::import_schedule(&pool, &locks, &schedule, SOURCE, false, DEFAULT_TRACK)
        .await
        .unwrap();

    let keynote = session_id(&pool, "2024day1event1").await;
    let row = db::sessions::find_by_id(&pool, keynote).await.unwrap().unwrap();
    let description = row.description.unwrap();
    assert!(description.contains("<Text style={styles.bold}>Seminar 1</Text>"));
    assert!(!description.contains("<br"));
}

#[tokio::test]
async fn day_without_date_is_rejected() {
    let pool = fresh_pool().await;
    let locks = ImportLocks::default();

    let broken = FIXTURE.replace("<day date=\"2024-11-09\">", "<day>");
    let schedule = parse_schedule(&broken).unwrap();

    let err = importer::import_schedule(&pool, &locks, &schedule, SOURCE, false, DEFAULT_TRACK)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { code: "DAY_DATE_NOT_VALID", .. }));
    assert!(db::conferences::current(&pool).await.unwrap().is_none());
}

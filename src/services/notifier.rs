//! Notification dispatcher
//!
//! Turns an import changeset into push-notification jobs for every user
//! who bookmarked an affected session and registered a push token. Jobs
//! go onto a bounded outbound queue consumed by a delivery worker that
//! POSTs them to the push gateway. Publish is fire-and-forget: a full
//! queue or a failed delivery is logged and never propagates back into
//! the import that already committed.

use crate::db;
use crate::services::importer::StartChange;
use crate::Result;
use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::OnceLock;
use tokio::sync::mpsc;
use uuid::Uuid;

/// One push-notification job for the external delivery queue.
#[derive(Debug, Clone, Serialize)]
pub struct PushJob {
    pub id: String,
    pub expo_push_notification_token: String,
    pub subject: String,
    pub message: String,
    pub data: serde_json::Value,
}

/// Bounded outbound queue handle. Cloneable; publish never blocks.
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<PushJob>,
}

impl NotificationQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PushJob>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Publish-and-forget: a full or closed queue is logged, not surfaced.
    pub fn publish(&self, job: PushJob) {
        if let Err(e) = self.tx.try_send(job) {
            tracing::warn!(error = %e, "Failed to enqueue push notification job");
        }
    }
}

/// Delivery worker: drains the queue and POSTs each job to the gateway.
/// Without a configured gateway, jobs are logged and dropped.
pub fn spawn_delivery_worker(
    mut rx: mpsc::Receiver<PushJob>,
    gateway_url: Option<String>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        while let Some(job) = rx.recv().await {
            match &gateway_url {
                Some(url) => {
                    let result = client.post(url).json(&job).send().await;
                    match result.and_then(|r| r.error_for_status()) {
                        Ok(_) => {
                            tracing::info!(token = %job.expo_push_notification_token, "Push job delivered")
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Push job delivery failed")
                        }
                    }
                }
                None => {
                    tracing::debug!(
                        subject = %job.subject,
                        "No push gateway configured, dropping job"
                    );
                }
            }
        }
    })
}

/// Fan a changeset out into push jobs.
///
/// Grouped mode (default) merges all affected sessions per user into one
/// job; ungrouped mode emits one job per (user, session) change with
/// human-readable before/after times.
pub async fn dispatch_reschedules(
    pool: &SqlitePool,
    queue: &NotificationQueue,
    changes: &HashMap<Uuid, StartChange>,
    grouped: bool,
) -> Result<()> {
    // user id -> (token, affected session count)
    let mut notify_users: HashMap<Uuid, (String, usize)> = HashMap::new();

    for (session_id, change) in changes {
        let Some(session) = db::sessions::find_by_id(pool, *session_id).await? else {
            continue;
        };
        let room_name = match session.room_id {
            Some(room_id) => db::rooms::find_room_name(pool, room_id).await?,
            None => None,
        };

        for (user_id, token) in db::users::bookmark_recipients(pool, *session_id).await? {
            if grouped {
                let entry = notify_users.entry(user_id).or_insert((token, 0));
                entry.1 += 1;
            } else {
                let (from, to) =
                    format_change(change.old_start_timestamp, change.new_start_timestamp);
                let title = clean_title(session.title.as_deref().unwrap_or(""));
                let mut message = format!(
                    "Session '{}' has been rescheduled from {} to {}",
                    title, from, to
                );
                if let Some(room) = &room_name {
                    message.push_str(&format!(" in room {}", room));
                }

                tracing::info!(user_id = %user_id, session_id = %session_id, "Queueing reschedule notification");
                queue.publish(PushJob {
                    id: token.clone(),
                    expo_push_notification_token: token,
                    subject: "Event rescheduled".to_string(),
                    message,
                    data: serde_json::json!({
                        "command": "SESSION_START_CHANGED",
                        "session_id": session_id.to_string(),
                        "value": change
                            .new_start_timestamp
                            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
                    }),
                });
            }
        }
    }

    if grouped {
        for (user_id, (token, session_count)) in notify_users {
            let subject = if session_count == 1 {
                "Event rescheduled"
            } else {
                "Events rescheduled"
            };
            tracing::info!(user_id = %user_id, session_count, "Queueing grouped reschedule notification");
            queue.publish(PushJob {
                id: token.clone(),
                expo_push_notification_token: token,
                subject: subject.to_string(),
                message: "Some of your bookmarked events have been rescheduled".to_string(),
                data: serde_json::json!({ "command": "OPEN_BOOKMARKS" }),
            });
        }
    }

    Ok(())
}

/// Render old/new start times: same calendar day as `HH:MM`, cross-day as
/// `MM.DD. HH:MM`. A missing side renders as "unscheduled".
fn format_change(
    old: Option<NaiveDateTime>,
    new: Option<NaiveDateTime>,
) -> (String, String) {
    match (old, new) {
        (Some(old), Some(new)) => {
            if old.date() == new.date() {
                (
                    old.format("%H:%M").to_string(),
                    new.format("%H:%M").to_string(),
                )
            } else {
                (
                    old.format("%m.%d. %H:%M").to_string(),
                    new.format("%m.%d. %H:%M").to_string(),
                )
            }
        }
        _ => (
            old.map(|t| t.format("%m.%d. %H:%M").to_string())
                .unwrap_or_else(|| "unscheduled".to_string()),
            new.map(|t| t.format("%m.%d. %H:%M").to_string())
                .unwrap_or_else(|| "unscheduled".to_string()),
        ),
    }
}

/// Strip characters outside the plain-text set before a title goes into a
/// notification body.
fn clean_title(title: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"[^\w\s.,:;!?-]").expect("valid regex"));
    pattern.replace_all(title, "").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(date: (i32, u32, u32), time: (u32, u32)) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(time.0, time.1, 0)
            .unwrap()
    }

    #[test]
    fn same_day_changes_render_time_only() {
        let (from, to) = format_change(
            Some(at((2024, 11, 8), (9, 30))),
            Some(at((2024, 11, 8), (11, 0))),
        );
        assert_eq!(from, "09:30");
        assert_eq!(to, "11:00");
    }

    #[test]
    fn cross_day_changes_render_date_and_time() {
        let (from, to) = format_change(
            Some(at((2024, 11, 8), (9, 30))),
            Some(at((2024, 11, 9), (9, 30))),
        );
        assert_eq!(from, "11.08. 09:30");
        assert_eq!(to, "11.09. 09:30");
    }

    #[test]
    fn clean_title_strips_special_characters() {
        assert_eq!(
            clean_title("Rust & WebAssembly: a (gentle) intro!"),
            "Rust  WebAssembly: a gentle intro!"
        );
    }

    #[tokio::test]
    async fn grouped_dispatch_merges_sessions_per_user() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        db::init_tables(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let conference = db::conferences::create(&mut conn, "C", "c", "uri").await.unwrap();

        let mut session_ids = Vec::new();
        for unique_id in ["e1", "e2"] {
            let row = db::sessions::SessionRow {
                id: Uuid::new_v4(),
                unique_id: unique_id.to_string(),
                title: Some("Talk".to_string()),
                url: None,
                abstract_text: None,
                description: None,
                bookmarkable: true,
                rateable: true,
                track_id: None,
                room_id: None,
                start_at: None,
                duration_secs: None,
                end_at: None,
            };
            db::sessions::insert(&mut conn, conference.id, &row).await.unwrap();
            session_ids.push(row.id);
        }
        drop(conn);

        let user = db::users::create_user(&pool, Some("token-1")).await.unwrap();
        for session_id in &session_ids {
            db::users::insert_bookmark(&pool, user, *session_id).await.unwrap();
        }
        // A user without a push token never receives jobs.
        let silent = db::users::create_user(&pool, None).await.unwrap();
        db::users::insert_bookmark(&pool, silent, session_ids[0]).await.unwrap();

        let changes: HashMap<Uuid, StartChange> = session_ids
            .iter()
            .map(|id| {
                (
                    *id,
                    StartChange {
                        old_start_timestamp: Some(at((2024, 11, 8), (9, 0))),
                        new_start_timestamp: Some(at((2024, 11, 8), (10, 0))),
                    },
                )
            })
            .collect();

        let (queue, mut rx) = NotificationQueue::new(16);
        dispatch_reschedules(&pool, &queue, &changes, true).await.unwrap();
        drop(queue);

        let job = rx.recv().await.unwrap();
        assert_eq!(job.subject, "Events rescheduled");
        assert_eq!(job.expo_push_notification_token, "token-1");
        assert_eq!(job.data["command"], "OPEN_BOOKMARKS");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn ungrouped_dispatch_emits_one_job_per_change() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        db::init_tables(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let conference = db::conferences::create(&mut conn, "C", "c", "uri").await.unwrap();
        let room = db::rooms::upsert_by_slug(&mut conn, conference.id, None, "Seminar 1")
            .await
            .unwrap();

        let row = db::sessions::SessionRow {
            id: Uuid::new_v4(),
            unique_id: "e1".to_string(),
            title: Some("Rust & friends".to_string()),
            url: None,
            abstract_text: None,
            description: None,
            bookmarkable: true,
            rateable: true,
            track_id: None,
            room_id: Some(room.id),
            start_at: Some(at((2024, 11, 8), (10, 0))),
            duration_secs: None,
            end_at: None,
        };
        db::sessions::insert(&mut conn, conference.id, &row).await.unwrap();
        drop(conn);

        let user = db::users::create_user(&pool, Some("token-2")).await.unwrap();
        db::users::insert_bookmark(&pool, user, row.id).await.unwrap();

        let changes = HashMap::from([(
            row.id,
            StartChange {
                old_start_timestamp: Some(at((2024, 11, 8), (9, 0))),
                new_start_timestamp: Some(at((2024, 11, 8), (10, 0))),
            },
        )]);

        let (queue, mut rx) = NotificationQueue::new(16);
        dispatch_reschedules(&pool, &queue, &changes, false).await.unwrap();
        drop(queue);

        let job = rx.recv().await.unwrap();
        assert_eq!(job.subject, "Event rescheduled");
        assert_eq!(
            job.message,
            "Session 'Rust  friends' has been rescheduled from 09:00 to 10:00 in room Seminar 1"
        );
        assert_eq!(job.data["command"], "SESSION_START_CHANGED");
        assert_eq!(job.data["value"], "2024-11-08 10:00:00");
        assert!(rx.recv().await.is_none());
    }
}

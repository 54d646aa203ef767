//! Schedule import endpoint.
//!
//! Fetches the schedule XML (remote URL or bundled local asset), runs the
//! reconciliation import, then hands any detected start-time moves to the
//! notification dispatcher. Dispatch failures never fail the import.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::schedule;
use crate::services::{importer, notifier};
use crate::{ApiResult, AppState, Error};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ImportRequest {
    /// Read the schedule from the local asset directory instead of the
    /// configured URL.
    pub use_local_xml: bool,
    /// Local asset filename override.
    pub local_xml_fname: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub id: Uuid,
    pub created: bool,
    pub changes: HashMap<Uuid, importer::StartChange>,
}

/// POST /api/import-xml
pub async fn import_xml(
    State(state): State<AppState>,
    body: Option<Json<ImportRequest>>,
) -> ApiResult<Json<ImportResponse>> {
    let Json(request) = body.unwrap_or_default();

    let (xml, source_uri) = if request.use_local_xml {
        let fname = request
            .local_xml_fname
            .as_deref()
            .unwrap_or(&state.config.local_schedule_file);
        let path = state.config.local_schedule_path(fname);
        let xml = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::Parse(format!("Failed to read schedule asset {}: {e}", path.display()))
        })?;
        (xml, path.display().to_string())
    } else {
        let url = state.config.schedule_url()?.to_string();
        let response = reqwest::get(&url)
            .await
            .map_err(|e| Error::Parse(format!("Failed to fetch schedule: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Parse(format!(
                "Schedule fetch returned {}",
                response.status()
            )));
        }
        let xml = response
            .text()
            .await
            .map_err(|e| Error::Parse(format!("Failed to read schedule body: {e}")))?;
        (xml, url)
    };

    let parsed = schedule::parse_schedule(&xml)?;
    let outcome = importer::import_schedule(
        &state.db,
        &state.import_locks,
        &parsed,
        &source_uri,
        true,
        &state.config.default_track,
    )
    .await?;

    tracing::info!(
        conference_id = %outcome.conference_id,
        created = outcome.created,
        changes = outcome.changes.len(),
        "Schedule import finished"
    );

    if !outcome.changes.is_empty() {
        if let Err(e) = notifier::dispatch_reschedules(
            &state.db,
            &state.notifier,
            &outcome.changes,
            state.config.group_notifications,
        )
        .await
        {
            tracing::error!(error = %e, "Reschedule notification dispatch failed");
        }
    }

    Ok(Json(ImportResponse {
        id: outcome.conference_id,
        created: outcome.created,
        changes: outcome.changes,
    }))
}

/// Build import routes
pub fn import_routes() -> Router<AppState> {
    Router::new().route("/api/import-xml", post(import_xml))
}

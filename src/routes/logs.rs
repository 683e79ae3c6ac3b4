// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Audit log routes.

use crate::error::{AppError, Result};
use crate::models::LogEntry;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MAX_PER_PAGE: usize = 200;
const CURSOR_PREFIX: &str = "seq:";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/logs", get(get_logs))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogsQuery {
    /// Only entries for this activity
    activity_id: Option<String>,
    /// Cursor for the next (older) page (opaque token)
    cursor: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsResponse {
    pub entries: Vec<LogEntry>,
    pub next_cursor: Option<String>,
}

fn parse_cursor(cursor: Option<&str>) -> Result<Option<u64>> {
    cursor
        .map(|raw| {
            let invalid_cursor = || AppError::BadRequest("Invalid 'cursor' parameter".to_string());

            let decoded = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid_cursor())?;
            let decoded_str = std::str::from_utf8(&decoded).map_err(|_| invalid_cursor())?;
            decoded_str
                .strip_prefix(CURSOR_PREFIX)
                .and_then(|seq| seq.parse::<u64>().ok())
                .ok_or_else(invalid_cursor)
        })
        .transpose()
}

fn encode_cursor(seq: u64) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}{}", CURSOR_PREFIX, seq))
}

/// Audit entries, newest first.
async fn get_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogsQuery>,
) -> Result<Json<LogsResponse>> {
    if params.limit == 0 {
        return Err(AppError::BadRequest("'limit' must be greater than 0".to_string()));
    }
    let limit = params.limit.min(MAX_PER_PAGE);
    let before = parse_cursor(params.cursor.as_deref())?;

    // Fetch one extra entry to know whether another page exists.
    let mut entries: Vec<LogEntry> = state
        .store
        .read(|data| {
            data.logs
                .iter()
                .rev()
                .filter(|e| before.map_or(true, |seq| e.seq < seq))
                .filter(|e| {
                    params
                        .activity_id
                        .as_deref()
                        .map_or(true, |id| e.activity_id.as_deref() == Some(id))
                })
                .take(limit + 1)
                .cloned()
                .collect()
        })
        .await;

    let has_more = entries.len() > limit;
    if has_more {
        entries.truncate(limit);
    }
    let next_cursor = if has_more {
        entries.last().map(|e| encode_cursor(e.seq))
    } else {
        None
    };

    Ok(Json(LogsResponse {
        entries,
        next_cursor,
    }))
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use agora_types::api::{Claims, NotificationListResponse, NotificationSummaryResponse};
use agora_types::models::{NotificationKind, NotificationSettings};

use crate::auth::AppState;
use crate::convert;
use crate::{db_status, join_error};

/// Full-page cap; the popover uses the smaller one.
const PAGE_LIMIT: u32 = 100;
const POPOVER_LIMIT: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    /// Category tab on the full page (mention, moderation_alert, system, ...).
    pub kind: Option<String>,
    pub limit: Option<u32>,
}

/// The full notification page: newest first, optional category tab.
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let kind = match query.kind.as_deref() {
        Some(raw) => Some(
            NotificationKind::parse(raw)
                .ok_or(StatusCode::BAD_REQUEST)?
                .as_str()
                .to_string(),
        ),
        None => None,
    };
    let limit = query.limit.unwrap_or(PAGE_LIMIT).min(PAGE_LIMIT);

    let db = state.clone();
    let me = claims.sub.to_string();
    let (rows, unread) = tokio::task::spawn_blocking(move || {
        let rows = db.db.list_notifications(&me, kind.as_deref(), limit)?;
        let unread = db.db.unread_notification_count(&me)?;
        Ok::<_, agora_db::DbError>((rows, unread))
    })
    .await
    .map_err(join_error)?
    .map_err(db_status)?;

    Ok(Json(NotificationListResponse {
        notifications: rows.into_iter().map(convert::notification_response).collect(),
        unread_count: unread.max(0) as u32,
    }))
}

/// The popover: capped at 50 and bucketed by elapsed time.
pub async fn notification_summary(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();
    let (rows, unread) = tokio::task::spawn_blocking(move || {
        let rows = db.db.list_notifications(&me, None, POPOVER_LIMIT)?;
        let unread = db.db.unread_notification_count(&me)?;
        Ok::<_, agora_db::DbError>((rows, unread))
    })
    .await
    .map_err(join_error)?
    .map_err(db_status)?;

    let now = Utc::now();
    let mut summary = NotificationSummaryResponse {
        today: vec![],
        this_week: vec![],
        earlier: vec![],
        unread_count: unread.max(0) as u32,
    };
    for row in rows {
        let notification = convert::notification_response(row);
        match bucket(notification.created_at, now) {
            Bucket::Today => summary.today.push(notification),
            Bucket::ThisWeek => summary.this_week.push(notification),
            Bucket::Earlier => summary.earlier.push(notification),
        }
    }

    Ok(Json(summary))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let id = notification_id.to_string();
    let me = claims.sub.to_string();
    tokio::task::spawn_blocking(move || db.db.mark_notification_read(&id, &me))
        .await
        .map_err(join_error)?
        .map_err(db_status)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();
    let updated = tokio::task::spawn_blocking(move || db.db.mark_all_notifications_read(&me))
        .await
        .map_err(join_error)?
        .map_err(db_status)?;

    Ok(Json(serde_json::json!({ "updated": updated })))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let id = notification_id.to_string();
    let me = claims.sub.to_string();
    tokio::task::spawn_blocking(move || db.db.delete_notification(&id, &me))
        .await
        .map_err(join_error)?
        .map_err(db_status)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();
    let settings = tokio::task::spawn_blocking(move || db.db.get_notification_settings(&me))
        .await
        .map_err(join_error)?
        .map_err(db_status)?;

    Ok(Json(settings))
}

/// Replace the caller's per-category toggles. Takes effect at the next
/// fan-out; rows already written stay in the inbox.
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(settings): Json<NotificationSettings>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();
    tokio::task::spawn_blocking(move || db.db.set_notification_settings(&me, &settings))
        .await
        .map_err(join_error)?
        .map_err(db_status)?;

    Ok(StatusCode::NO_CONTENT)
}

enum Bucket {
    Today,
    ThisWeek,
    Earlier,
}

fn bucket(created_at: DateTime<Utc>, now: DateTime<Utc>) -> Bucket {
    let age = now - created_at;
    if age < Duration::hours(24) {
        Bucket::Today
    } else if age < Duration::days(7) {
        Bucket::ThisWeek
    } else {
        Bucket::Earlier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_split_at_a_day_and_a_week() {
        let now = Utc::now();
        assert!(matches!(bucket(now - Duration::hours(2), now), Bucket::Today));
        assert!(matches!(bucket(now - Duration::hours(30), now), Bucket::ThisWeek));
        assert!(matches!(bucket(now - Duration::days(6), now), Bucket::ThisWeek));
        assert!(matches!(bucket(now - Duration::days(8), now), Bucket::Earlier));
    }
}

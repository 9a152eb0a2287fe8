use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use agora_types::api::{Claims, MessageResponse, SendMessageRequest};
use agora_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::convert;
use crate::{db_status, join_error};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination — pass the `created_at` timestamp of the
    /// oldest message from the previous page to fetch older messages.
    pub before: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// History page, oldest first. Active participants only; an empty page is
/// a valid state, not an error.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let cid = conversation_id.to_string();
    let me = claims.sub.to_string();
    let limit = query.limit.min(200);
    let before = query.before;

    let (role, rows) = tokio::task::spawn_blocking(move || {
        let role = db.db.participant_role(&cid, &me)?;
        let rows = db.db.get_messages(&cid, &me, limit, before.as_deref())?;
        Ok::<_, agora_db::DbError>((role, rows))
    })
    .await
    .map_err(join_error)?
    .map_err(db_status)?;

    if role.is_none() {
        return Err(StatusCode::FORBIDDEN);
    }

    let messages: Vec<MessageResponse> =
        rows.into_iter().map(convert::message_response).collect();
    Ok(Json(messages))
}

/// Persist and fan out a message. The store rejects blank content and
/// non-participants; on success the hydrated row goes out as a
/// conversation-scoped event and each written notification as a targeted
/// one.
pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.content.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.clone();
    let cid = conversation_id.to_string();
    let me = claims.sub.to_string();
    let sent = tokio::task::spawn_blocking(move || db.db.send_message(&cid, &me, &req.content))
        .await
        .map_err(join_error)?
        .map_err(db_status)?;

    let message = convert::message_response(sent.message);

    state.dispatcher.broadcast(GatewayEvent::MessageCreate {
        message: message.clone(),
    });
    for row in sent.notifications {
        let recipient = convert::parse_uuid(&row.user_id, "user");
        state
            .dispatcher
            .send_to_user(
                recipient,
                GatewayEvent::NotificationCreate {
                    notification: convert::notification_response(row),
                },
            )
            .await;
    }

    Ok((StatusCode::CREATED, Json(message)))
}

/// Advance the caller's read watermark to the newest message. Cheap and
/// idempotent; clients fire it on every history render.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let cid = conversation_id.to_string();
    let me = claims.sub.to_string();
    tokio::task::spawn_blocking(move || db.db.mark_conversation_read(&cid, &me))
        .await
        .map_err(join_error)?
        .map_err(db_status)?;

    Ok(StatusCode::NO_CONTENT)
}

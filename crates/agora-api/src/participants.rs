use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use agora_types::api::{AddMembersRequest, AddMembersResponse, Claims, ParticipantInfo};
use agora_types::events::GatewayEvent;
use agora_types::models::{ConversationKind, ParticipantRole};

use crate::auth::AppState;
use crate::convert;
use crate::{db_status, join_error};

/// Active roster for the member sheet. Participants only.
pub async fn get_participants(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let cid = conversation_id.to_string();
    let me = claims.sub.to_string();

    let (role, roster) = tokio::task::spawn_blocking(move || {
        let role = db.db.participant_role(&cid, &me)?;
        let roster = db.db.participants(&cid)?;
        Ok::<_, agora_db::DbError>((role, roster))
    })
    .await
    .map_err(join_error)?
    .map_err(db_status)?;

    if role.is_none() {
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(Json(
        roster
            .into_iter()
            .map(convert::participant_info)
            .collect::<Vec<ParticipantInfo>>(),
    ))
}

/// Owner/admin: add community members to the group. Each new member gets a
/// participant row, a notification, and a targeted directory event.
pub async fn add_members(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddMembersRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.user_ids.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.clone();
    let cid = conversation_id.to_string();
    let me = claims.sub.to_string();
    let targets: Vec<String> = req.user_ids.iter().map(Uuid::to_string).collect();

    let result = tokio::task::spawn_blocking(move || db.db.add_participants(&cid, &me, &targets))
        .await
        .map_err(join_error)?
        .map_err(db_status)?;

    for (user_id, username) in &result.added {
        let user_uuid = convert::parse_uuid(user_id, "user");
        state.dispatcher.broadcast(GatewayEvent::ParticipantJoin {
            conversation_id,
            user_id: user_uuid,
            username: username.clone(),
            role: ParticipantRole::Member,
        });
        state
            .dispatcher
            .send_to_user(
                user_uuid,
                GatewayEvent::ConversationCreate {
                    conversation_id,
                    kind: ConversationKind::Group,
                },
            )
            .await;
    }
    for row in result.notifications {
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

    Ok(Json(AddMembersResponse {
        added: result.added.len() as u32,
    }))
}

/// Owner/admin: stamp a non-owner participant's departure.
pub async fn remove_participant(
    State(state): State<AppState>,
    Path((conversation_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let cid = conversation_id.to_string();
    let me = claims.sub.to_string();
    let target = user_id.to_string();

    let notification =
        tokio::task::spawn_blocking(move || db.db.remove_participant(&cid, &me, &target))
            .await
            .map_err(join_error)?
            .map_err(db_status)?;

    state.dispatcher.broadcast(GatewayEvent::ParticipantLeave {
        conversation_id,
        user_id,
    });
    if let Some(row) = notification {
        state
            .dispatcher
            .send_to_user(
                user_id,
                GatewayEvent::NotificationCreate {
                    notification: convert::notification_response(row),
                },
            )
            .await;
    }

    Ok(StatusCode::NO_CONTENT)
}

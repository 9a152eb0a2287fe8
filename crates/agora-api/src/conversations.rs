use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use agora_types::api::{
    Claims, ConversationCreatedResponse, ConversationDetail, CreateDirectRequest,
    CreateGroupRequest,
};
use agora_types::events::GatewayEvent;
use agora_types::models::ConversationKind;

use crate::auth::AppState;
use crate::convert;
use crate::{db_status, join_error};

#[derive(Debug, Deserialize)]
pub struct DirectoryQuery {
    pub q: Option<String>,
}

/// The conversation directory: every conversation the caller is an active
/// participant of, hydrated and ordered by last activity. `q` narrows by
/// counterpart, group, or community name.
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<DirectoryQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();
    let rows = tokio::task::spawn_blocking(move || db.db.list_conversations(&me))
        .await
        .map_err(join_error)?
        .map_err(db_status)?;

    let mut summaries: Vec<_> = rows.into_iter().map(convert::conversation_summary).collect();

    if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let q = q.to_lowercase();
        summaries.retain(|conv| {
            let other = conv
                .other_user
                .as_ref()
                .is_some_and(|u| u.username.to_lowercase().contains(&q));
            let name = conv
                .name
                .as_ref()
                .is_some_and(|n| n.to_lowercase().contains(&q));
            let community = conv
                .community_name
                .as_ref()
                .is_some_and(|n| n.to_lowercase().contains(&q));
            other || name || community
        });
    }

    Ok(Json(summaries))
}

/// Load one conversation: metadata, active roster, and the caller's role.
/// Only active participants may look inside.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let cid = conversation_id.to_string();
    let me = claims.sub.to_string();

    let (conv, role, roster) = tokio::task::spawn_blocking(move || {
        let conv = db.db.get_conversation(&cid)?;
        let role = db.db.participant_role(&cid, &me)?;
        let roster = db.db.participants(&cid)?;
        Ok::<_, agora_db::DbError>((conv, role, roster))
    })
    .await
    .map_err(join_error)?
    .map_err(db_status)?;

    let conv = conv.ok_or(StatusCode::NOT_FOUND)?;
    let my_role = role.ok_or(StatusCode::FORBIDDEN)?;

    let kind = ConversationKind::parse(&conv.kind).unwrap_or(ConversationKind::Direct);
    let community_name = match conv.community_id.as_deref() {
        Some(cid) => state.db.community_name(cid).map_err(db_status)?,
        None => None,
    };

    let me_str = claims.sub.to_string();
    let other_user = if kind == ConversationKind::Direct {
        roster
            .iter()
            .find(|p| p.user_id != me_str)
            .map(|p| agora_types::models::UserSummary {
                id: convert::parse_uuid(&p.user_id, "user"),
                username: p.username.clone(),
                avatar_url: p.avatar_url.clone(),
            })
    } else {
        None
    };

    Ok(Json(ConversationDetail {
        id: conversation_id,
        kind,
        name: conv.name,
        community_id: conv.community_id.as_deref().map(|c| convert::parse_uuid(c, "community")),
        community_name,
        other_user,
        participants: roster.into_iter().map(convert::participant_info).collect(),
        my_role,
    }))
}

/// Start (or resume) a direct conversation. Creating the same pair twice
/// lands on the same conversation.
pub async fn create_direct(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateDirectRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();
    let other = req.user_id.to_string();

    let (conversation_id, created) =
        tokio::task::spawn_blocking(move || db.db.create_direct_conversation(&me, &other))
            .await
            .map_err(join_error)?
            .map_err(db_status)?;

    let conv_uuid = convert::parse_uuid(&conversation_id, "conversation");
    if created {
        for user in [claims.sub, req.user_id] {
            state
                .dispatcher
                .send_to_user(
                    user,
                    GatewayEvent::ConversationCreate {
                        conversation_id: conv_uuid,
                        kind: ConversationKind::Direct,
                    },
                )
                .await;
        }
    }

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(ConversationCreatedResponse {
            conversation_id: conv_uuid,
            created,
        }),
    ))
}

/// Create a community-scoped group chat: creator becomes owner, selected
/// members join with a notification each.
pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.clone();
    let me = claims.sub.to_string();
    let community = req.community_id.to_string();
    let members: Vec<String> = req.member_ids.iter().map(Uuid::to_string).collect();
    let name = req.name.clone();

    let created = tokio::task::spawn_blocking(move || {
        db.db.create_group_conversation(&me, &community, &name, &members)
    })
    .await
    .map_err(join_error)?
    .map_err(db_status)?;

    let conv_uuid = convert::parse_uuid(&created.conversation_id, "conversation");
    for member in &created.member_ids {
        state
            .dispatcher
            .send_to_user(
                convert::parse_uuid(member, "user"),
                GatewayEvent::ConversationCreate {
                    conversation_id: conv_uuid,
                    kind: ConversationKind::Group,
                },
            )
            .await;
    }
    for row in created.notifications {
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

    Ok((
        StatusCode::CREATED,
        Json(ConversationCreatedResponse {
            conversation_id: conv_uuid,
            created: true,
        }),
    ))
}

/// Owner-only: delete the group and everything under it.
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let cid = conversation_id.to_string();
    let me = claims.sub.to_string();
    tokio::task::spawn_blocking(move || db.db.delete_conversation(&cid, &me))
        .await
        .map_err(join_error)?
        .map_err(db_status)?;

    state
        .dispatcher
        .broadcast(GatewayEvent::ConversationDelete { conversation_id });

    Ok(StatusCode::NO_CONTENT)
}

/// Non-owner exit: stamp the caller's own departure.
pub async fn leave_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let cid = conversation_id.to_string();
    let me = claims.sub.to_string();
    tokio::task::spawn_blocking(move || db.db.leave_conversation(&cid, &me))
        .await
        .map_err(join_error)?
        .map_err(db_status)?;

    state.dispatcher.broadcast(GatewayEvent::ParticipantLeave {
        conversation_id,
        user_id: claims.sub,
    });

    Ok(StatusCode::NO_CONTENT)
}

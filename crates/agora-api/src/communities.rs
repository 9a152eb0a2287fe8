use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use agora_types::api::Claims;

use crate::auth::AppState;
use crate::convert;
use crate::{db_status, join_error};

/// Communities the caller belongs to — the group-chat wizard's first step.
pub async fn my_communities(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();
    let rows = tokio::task::spawn_blocking(move || db.db.user_communities(&me))
        .await
        .map_err(join_error)?
        .map_err(db_status)?;

    Ok(Json(rows.into_iter().map(convert::community).collect::<Vec<_>>()))
}

/// The membership roster: candidates for group creation and add-member.
pub async fn community_members(
    State(state): State<AppState>,
    Path(community_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let cid = community_id.to_string();
    let rows = tokio::task::spawn_blocking(move || db.db.community_members(&cid))
        .await
        .map_err(join_error)?
        .map_err(db_status)?;

    Ok(Json(
        rows.into_iter().map(convert::community_member).collect::<Vec<_>>(),
    ))
}

pub async fn join_community(
    State(state): State<AppState>,
    Path(community_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let cid = community_id.to_string();
    let me = claims.sub.to_string();
    tokio::task::spawn_blocking(move || db.db.join_community(&me, &cid))
        .await
        .map_err(join_error)?
        .map_err(db_status)?;

    Ok(StatusCode::CREATED)
}

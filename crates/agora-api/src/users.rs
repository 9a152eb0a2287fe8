use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;

use agora_types::api::{Claims, SearchedUser};

use crate::auth::AppState;
use crate::convert;
use crate::{db_status, join_error};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Substring search on username or email for starting a direct chat.
/// A blank query short-circuits to an empty result without a store call;
/// clients debounce on top of this, but the guard belongs on the server.
pub async fn search_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    if query.q.trim().is_empty() {
        return Ok(Json(Vec::<SearchedUser>::new()));
    }

    let db = state.clone();
    let me = claims.sub.to_string();
    let rows = tokio::task::spawn_blocking(move || db.db.search_users(&query.q, &me))
        .await
        .map_err(join_error)?
        .map_err(db_status)?;

    Ok(Json(rows.into_iter().map(convert::searched_user).collect()))
}

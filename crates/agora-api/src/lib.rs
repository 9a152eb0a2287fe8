pub mod auth;
pub mod communities;
pub mod conversations;
mod convert;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod participants;
pub mod users;

use axum::http::StatusCode;
use tracing::error;

use agora_db::DbError;

/// Map store errors onto HTTP statuses. Validation and permission
/// failures carry their own statuses; anything else is a 500 and gets
/// logged here since the client only sees the code.
pub(crate) fn db_status(err: DbError) -> StatusCode {
    match err {
        DbError::NotFound { .. } => StatusCode::NOT_FOUND,
        DbError::AlreadyExists { .. } => StatusCode::CONFLICT,
        DbError::Forbidden(_) => StatusCode::FORBIDDEN,
        DbError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        other => {
            error!("store error: {}", other);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn join_error(err: tokio::task::JoinError) -> StatusCode {
    error!("spawn_blocking join error: {}", err);
    StatusCode::INTERNAL_SERVER_ERROR
}

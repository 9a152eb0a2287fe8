use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    ConversationKind, NotificationKind, ParticipantRole, UserRole, UserSummary,
};

// -- JWT Claims --

/// JWT claims shared between the REST middleware and the WebSocket gateway
/// authentication. Canonical definition lives here in agora-types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: UserRole,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
    pub role: UserRole,
    pub avatar_url: Option<String>,
    pub token: String,
}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchedUser {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    pub email: String,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateDirectRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub community_id: Uuid,
    pub name: String,
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ConversationCreatedResponse {
    pub conversation_id: Uuid,
    /// false when an existing direct conversation was reused.
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    pub sender_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// One directory entry: everything a conversation list needs to render a
/// row without further per-item fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub name: Option<String>,
    pub community_id: Option<Uuid>,
    pub community_name: Option<String>,
    pub other_user: Option<UserSummary>,
    pub last_message: Option<LastMessage>,
    pub unread_count: u32,
    pub participant_count: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub user_id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    pub email: String,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub name: Option<String>,
    pub community_id: Option<Uuid>,
    pub community_name: Option<String>,
    /// Direct chats: the single counterpart.
    pub other_user: Option<UserSummary>,
    /// Group chats: the full active roster.
    pub participants: Vec<ParticipantInfo>,
    pub my_role: ParticipantRole,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddMembersRequest {
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct AddMembersResponse {
    pub added: u32,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Whether the requesting viewer has seen this message.
    pub read: bool,
    /// Whether every other active participant has seen it (sender-side
    /// receipt; meaningful in group chats where a shared flag cannot be).
    pub read_by_recipients: bool,
    pub sender: Option<UserSummary>,
}

// -- Notifications --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub community_id: Option<Uuid>,
    pub community_name: Option<String>,
    pub related_user: Option<UserSummary>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<NotificationResponse>,
    pub unread_count: u32,
}

/// Popover shape: bucketed by elapsed time.
#[derive(Debug, Serialize)]
pub struct NotificationSummaryResponse {
    pub today: Vec<NotificationResponse>,
    pub this_week: Vec<NotificationResponse>,
    pub earlier: Vec<NotificationResponse>,
    pub unread_count: u32,
}

// -- Communities --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityMember {
    pub user_id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    pub email: String,
}

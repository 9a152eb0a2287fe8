//! Database row types — these map directly to SQLite rows.
//! Distinct from the agora-types API models to keep the store layer
//! independent; timestamps stay strings here and are parsed at the edge.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub role: String,
    pub avatar_url: Option<String>,
    pub notification_settings: Option<String>,
    pub created_at: String,
}

pub struct SearchedUserRow {
    pub id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub email: String,
}

pub struct CommunityRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

pub struct CommunityMemberRow {
    pub user_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub email: String,
}

pub struct ConversationRow {
    pub id: String,
    pub kind: String,
    pub community_id: Option<String>,
    pub name: Option<String>,
    pub created_at: String,
}

pub struct ParticipantRow {
    pub id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub role: String,
    pub joined_at: String,
    pub left_at: Option<String>,
    pub last_read_at: Option<String>,
}

/// Active roster entry with user display fields joined in.
pub struct ParticipantInfoRow {
    pub user_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub email: String,
    pub role: String,
    pub joined_at: String,
}

#[derive(Debug)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub sender_avatar_url: Option<String>,
    pub content: String,
    pub created_at: String,
    /// Seen by the viewer the query ran for.
    pub read: bool,
    /// Seen by every other currently-active participant.
    pub read_by_recipients: bool,
}

pub struct LastMessageRow {
    pub content: String,
    pub sender_id: String,
    pub created_at: String,
}

/// One directory entry, fully hydrated.
pub struct ConversationSummaryRow {
    pub id: String,
    pub kind: String,
    pub name: Option<String>,
    pub community_id: Option<String>,
    pub community_name: Option<String>,
    pub other_user: Option<SearchedUserRow>,
    pub last_message: Option<LastMessageRow>,
    pub unread_count: i64,
    pub participant_count: i64,
    pub created_at: String,
}

#[derive(Debug)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub community_id: Option<String>,
    pub community_name: Option<String>,
    pub related_user_id: Option<String>,
    pub related_username: Option<String>,
    pub related_avatar_url: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

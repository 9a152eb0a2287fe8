//! Row-to-DTO conversions. The store keeps ids and timestamps as text;
//! corrupt values are logged and defaulted rather than failing a whole
//! response.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use agora_db::models::{
    CommunityMemberRow, CommunityRow, ConversationSummaryRow, MessageRow, NotificationRow,
    ParticipantInfoRow, SearchedUserRow,
};
use agora_types::api::{
    CommunityMember, ConversationSummary, LastMessage, MessageResponse, NotificationResponse,
    ParticipantInfo, SearchedUser,
};
use agora_types::models::{
    Community, ConversationKind, NotificationKind, ParticipantRole, UserSummary,
};

pub(crate) fn parse_uuid(raw: &str, context: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} id '{}': {}", context, raw, e);
        Uuid::default()
    })
}

pub(crate) fn parse_ts(raw: &str, context: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps without a timezone suffix.
            // Parse as naive UTC and convert; %.f tolerates both
            // second- and microsecond-precision rows.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} timestamp '{}': {}", context, raw, e);
            DateTime::default()
        })
}

pub(crate) fn searched_user(row: SearchedUserRow) -> SearchedUser {
    SearchedUser {
        id: parse_uuid(&row.id, "user"),
        username: row.username,
        avatar_url: row.avatar_url,
        email: row.email,
    }
}

pub(crate) fn user_summary(row: SearchedUserRow) -> UserSummary {
    UserSummary {
        id: parse_uuid(&row.id, "user"),
        username: row.username,
        avatar_url: row.avatar_url,
    }
}

pub(crate) fn community(row: CommunityRow) -> Community {
    Community {
        id: parse_uuid(&row.id, "community"),
        name: row.name,
        description: row.description,
    }
}

pub(crate) fn community_member(row: CommunityMemberRow) -> CommunityMember {
    CommunityMember {
        user_id: parse_uuid(&row.user_id, "user"),
        username: row.username,
        avatar_url: row.avatar_url,
        email: row.email,
    }
}

pub(crate) fn participant_info(row: ParticipantInfoRow) -> ParticipantInfo {
    ParticipantInfo {
        user_id: parse_uuid(&row.user_id, "user"),
        username: row.username,
        avatar_url: row.avatar_url,
        email: row.email,
        role: ParticipantRole::parse(&row.role).unwrap_or(ParticipantRole::Member),
        joined_at: parse_ts(&row.joined_at, "participant"),
    }
}

pub(crate) fn message_response(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: parse_uuid(&row.id, "message"),
        conversation_id: parse_uuid(&row.conversation_id, "conversation"),
        sender_id: parse_uuid(&row.sender_id, "sender"),
        content: row.content,
        created_at: parse_ts(&row.created_at, "message"),
        read: row.read,
        read_by_recipients: row.read_by_recipients,
        sender: Some(UserSummary {
            id: parse_uuid(&row.sender_id, "sender"),
            username: row.sender_username,
            avatar_url: row.sender_avatar_url,
        }),
    }
}

pub(crate) fn notification_response(row: NotificationRow) -> NotificationResponse {
    NotificationResponse {
        id: parse_uuid(&row.id, "notification"),
        kind: NotificationKind::parse(&row.kind).unwrap_or(NotificationKind::System),
        title: row.title,
        message: row.message,
        link: row.link,
        community_id: row.community_id.as_deref().map(|c| parse_uuid(c, "community")),
        community_name: row.community_name,
        related_user: match (row.related_user_id, row.related_username) {
            (Some(id), Some(username)) => Some(UserSummary {
                id: parse_uuid(&id, "user"),
                username,
                avatar_url: row.related_avatar_url,
            }),
            _ => None,
        },
        is_read: row.is_read,
        created_at: parse_ts(&row.created_at, "notification"),
    }
}

pub(crate) fn conversation_summary(row: ConversationSummaryRow) -> ConversationSummary {
    ConversationSummary {
        id: parse_uuid(&row.id, "conversation"),
        kind: ConversationKind::parse(&row.kind).unwrap_or(ConversationKind::Direct),
        name: row.name,
        community_id: row.community_id.as_deref().map(|c| parse_uuid(c, "community")),
        community_name: row.community_name,
        other_user: row.other_user.map(user_summary),
        last_message: row.last_message.map(|m| LastMessage {
            content: m.content,
            sender_id: parse_uuid(&m.sender_id, "sender"),
            created_at: parse_ts(&m.created_at, "message"),
        }),
        unread_count: row.unread_count.max(0) as u32,
        participant_count: row.participant_count.max(0) as u32,
        created_at: parse_ts(&row.created_at, "conversation"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_parse_at_both_precisions() {
        let coarse = parse_ts("2026-08-06 10:15:00", "test");
        let fine = parse_ts("2026-08-06 10:15:00.123456", "test");
        assert_eq!(coarse.date_naive(), fine.date_naive());
        assert!(fine > coarse);
    }

    #[test]
    fn corrupt_values_default_instead_of_failing() {
        assert_eq!(parse_uuid("not-a-uuid", "test"), Uuid::default());
        assert_eq!(parse_ts("yesterday-ish", "test"), DateTime::<Utc>::default());
    }
}

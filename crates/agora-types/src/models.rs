use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Member,
    Moderator,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "member" => Some(Self::Member),
            "moderator" => Some(Self::Moderator),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Direct,
    Group,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(Self::Direct),
            "group" => Some(Self::Group),
            _ => None,
        }
    }
}

/// Participant roles in precedence order: owner > admin > member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Owner,
    Admin,
    Member,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            _ => None,
        }
    }

    /// Owners and admins may add members and remove non-owner participants.
    pub fn can_manage(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Reply,
    Mention,
    Comment,
    ModerationAlert,
    CommunityUpdate,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reply => "reply",
            Self::Mention => "mention",
            Self::Comment => "comment",
            Self::ModerationAlert => "moderation_alert",
            Self::CommunityUpdate => "community_update",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reply" => Some(Self::Reply),
            "mention" => Some(Self::Mention),
            "comment" => Some(Self::Comment),
            "moderation_alert" => Some(Self::ModerationAlert),
            "community_update" => Some(Self::CommunityUpdate),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Per-category delivery toggles stored on the user row. Consulted at
/// fan-out time: a disabled category is never written for that recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub reply: bool,
    pub mention: bool,
    pub comment: bool,
    pub moderation_alert: bool,
    pub community_update: bool,
    pub system: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            reply: true,
            mention: true,
            comment: true,
            moderation_alert: true,
            community_update: true,
            system: true,
        }
    }
}

impl NotificationSettings {
    pub fn allows(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::Reply => self.reply,
            NotificationKind::Mention => self.mention,
            NotificationKind::Comment => self.comment,
            NotificationKind::ModerationAlert => self.moderation_alert,
            NotificationKind::CommunityUpdate => self.community_update,
            NotificationKind::System => self.system,
        }
    }
}

/// The display fields other users see: enough to render an avatar and name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// Notification message previews are clipped to this many characters.
pub const MESSAGE_PREVIEW_LEN: usize = 50;

/// Truncate message content for a notification body, appending an ellipsis
/// when anything was cut. Operates on characters, not bytes.
pub fn message_preview(content: &str) -> String {
    let mut preview: String = content.chars().take(MESSAGE_PREVIEW_LEN).collect();
    if content.chars().count() > MESSAGE_PREVIEW_LEN {
        preview.push_str("...");
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_precedence() {
        assert!(ParticipantRole::Owner.can_manage());
        assert!(ParticipantRole::Admin.can_manage());
        assert!(!ParticipantRole::Member.can_manage());
    }

    #[test]
    fn enum_round_trips() {
        for kind in [
            NotificationKind::Reply,
            NotificationKind::Mention,
            NotificationKind::Comment,
            NotificationKind::ModerationAlert,
            NotificationKind::CommunityUpdate,
            NotificationKind::System,
        ] {
            assert_eq!(NotificationKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ConversationKind::parse("direct"), Some(ConversationKind::Direct));
        assert_eq!(ParticipantRole::parse("nobody"), None);
    }

    #[test]
    fn preview_truncates_at_fifty_chars() {
        let short = "hello";
        assert_eq!(message_preview(short), "hello");

        let long = "x".repeat(80);
        let preview = message_preview(&long);
        assert_eq!(preview.chars().count(), MESSAGE_PREVIEW_LEN + 3);
        assert!(preview.ends_with("..."));

        // Exactly at the limit: no ellipsis.
        let exact = "y".repeat(MESSAGE_PREVIEW_LEN);
        assert_eq!(message_preview(&exact), exact);
    }

    #[test]
    fn settings_default_allows_everything() {
        let settings = NotificationSettings::default();
        assert!(settings.allows(NotificationKind::Comment));
        assert!(settings.allows(NotificationKind::System));
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{MessageResponse, NotificationResponse};
use crate::models::{ConversationKind, ParticipantRole};

/// Events pushed over the WebSocket gateway. Every event carries the full
/// row(s) a client needs to patch its local view incrementally; none of
/// them require a follow-up fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A message was posted to a conversation
    MessageCreate { message: MessageResponse },

    /// A user started typing in a conversation
    TypingStart {
        conversation_id: Uuid,
        user_id: Uuid,
        username: String,
    },

    /// A user came online or went offline
    PresenceUpdate {
        user_id: Uuid,
        username: String,
        online: bool,
    },

    /// A participant joined (or was added to) a conversation
    ParticipantJoin {
        conversation_id: Uuid,
        user_id: Uuid,
        username: String,
        role: ParticipantRole,
    },

    /// A participant left or was removed; departed rows stay in history
    ParticipantLeave {
        conversation_id: Uuid,
        user_id: Uuid,
    },

    /// Targeted at each initial participant of a new conversation so their
    /// directory picks it up without polling
    ConversationCreate {
        conversation_id: Uuid,
        kind: ConversationKind,
    },

    /// The conversation and its history are gone
    ConversationDelete { conversation_id: Uuid },

    /// Targeted at the recipient; carries the full row for incremental
    /// feed patching
    NotificationCreate { notification: NotificationResponse },
}

impl GatewayEvent {
    /// Returns the conversation_id if this event is scoped to a specific
    /// conversation. Scoped events are only forwarded to connections
    /// subscribed to that conversation; `None` means the event is either
    /// global or delivered through a per-user targeted channel.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { message } => Some(message.conversation_id),
            Self::TypingStart { conversation_id, .. } => Some(*conversation_id),
            Self::ParticipantJoin { conversation_id, .. } => Some(*conversation_id),
            Self::ParticipantLeave { conversation_id, .. } => Some(*conversation_id),
            Self::ConversationDelete { conversation_id } => Some(*conversation_id),
            // Ready, PresenceUpdate, ConversationCreate, NotificationCreate
            // are global or user-targeted
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Replace this connection's conversation subscriptions. The server
    /// only forwards conversation-scoped events for subscribed ids.
    Subscribe { conversation_ids: Vec<Uuid> },

    /// Indicate typing in a conversation
    StartTyping { conversation_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn message_events_are_conversation_scoped() {
        let conversation_id = Uuid::new_v4();
        let event = GatewayEvent::MessageCreate {
            message: MessageResponse {
                id: Uuid::new_v4(),
                conversation_id,
                sender_id: Uuid::new_v4(),
                content: "hi".into(),
                created_at: Utc::now(),
                read: false,
                read_by_recipients: false,
                sender: None,
            },
        };
        assert_eq!(event.conversation_id(), Some(conversation_id));
    }

    #[test]
    fn presence_and_notifications_are_unscoped() {
        let presence = GatewayEvent::PresenceUpdate {
            user_id: Uuid::new_v4(),
            username: "ada".into(),
            online: true,
        };
        assert_eq!(presence.conversation_id(), None);

        let notification = GatewayEvent::NotificationCreate {
            notification: NotificationResponse {
                id: Uuid::new_v4(),
                kind: crate::models::NotificationKind::Comment,
                title: "New message".into(),
                message: "You have a new message: hi".into(),
                link: Some("/messages".into()),
                community_id: None,
                community_name: None,
                related_user: None,
                is_read: false,
                created_at: Utc::now(),
            },
        };
        assert_eq!(notification.conversation_id(), None);
    }

    #[test]
    fn command_wire_format_is_tagged() {
        let cmd = GatewayCommand::Subscribe {
            conversation_ids: vec![],
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"type\":\"Subscribe\""));
        let back: GatewayCommand = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, GatewayCommand::Subscribe { .. }));
    }
}

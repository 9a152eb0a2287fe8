use rusqlite::Connection;
use uuid::Uuid;

use agora_types::models::{message_preview, NotificationKind};

use crate::models::{MessageRow, NotificationRow};
use crate::queries::{conversations, notifications, participants, users, OptionalExt};
use crate::{now_ts, Database, DbError, Result};

/// A persisted message plus the notification rows fanned out alongside it.
#[derive(Debug)]
pub struct SentMessage {
    pub message: MessageRow,
    pub notifications: Vec<NotificationRow>,
}

impl Database {
    /// Persist a message and fan out one notification per other active
    /// participant, atomically. Recipients who disabled the category are
    /// skipped at write time; departed participants never qualify.
    pub fn send_message(
        &self,
        conversation_id: &str,
        sender: &str,
        content: &str,
    ) -> Result<SentMessage> {
        let content = content.trim();
        if content.is_empty() {
            return Err(DbError::InvalidInput("message content must not be empty"));
        }

        self.with_tx(|tx| {
            if conversations::query_conversation(tx, conversation_id)?.is_none() {
                return Err(DbError::NotFound {
                    entity: "conversation",
                    id: conversation_id.to_string(),
                });
            }
            if participants::conversation_role(tx, conversation_id, sender)?.is_none() {
                return Err(DbError::Forbidden("only active participants may post"));
            }

            let id = Uuid::new_v4().to_string();
            let created_at = now_ts();
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (&id, conversation_id, sender, content, &created_at),
            )?;

            let recipients = participants::other_active_ids(tx, conversation_id, sender)?;
            let body = format!("You have a new message: {}", message_preview(content));
            let mut fanned_out = Vec::new();
            for recipient in &recipients {
                if let Some(row) = notifications::insert_if_enabled(
                    tx,
                    recipient,
                    NotificationKind::Comment,
                    "New message",
                    &body,
                    Some("/messages"),
                    None,
                    Some(sender),
                )? {
                    fanned_out.push(row);
                }
            }

            let (sender_username, sender_avatar_url) = users::display_for(tx, sender)?
                .unwrap_or_else(|| ("unknown".to_string(), None));

            Ok(SentMessage {
                message: MessageRow {
                    id,
                    conversation_id: conversation_id.to_string(),
                    sender_id: sender.to_string(),
                    sender_username,
                    sender_avatar_url,
                    content: content.to_string(),
                    created_at,
                    read: true,
                    read_by_recipients: recipients.is_empty(),
                },
                notifications: fanned_out,
            })
        })
    }

    /// History page, oldest first, with per-viewer read state derived from
    /// the watermarks. `before` is a cursor: pass the `created_at` of the
    /// oldest message from the previous page to fetch older ones.
    pub fn get_messages(
        &self,
        conversation_id: &str,
        viewer: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            // JOIN users for sender display in a single query; the two
            // subselects derive read state from participant watermarks.
            let mut stmt = conn.prepare(
                "SELECT m.id, m.conversation_id, m.sender_id, u.username, u.avatar_url,
                        m.content, m.created_at,
                        (m.sender_id = ?2 OR m.created_at <= COALESCE(
                            (SELECT p.last_read_at FROM conversation_participants p
                             WHERE p.conversation_id = m.conversation_id
                               AND p.user_id = ?2 AND p.left_at IS NULL), '')),
                        (NOT EXISTS
                            (SELECT 1 FROM conversation_participants p2
                             WHERE p2.conversation_id = m.conversation_id
                               AND p2.left_at IS NULL
                               AND p2.user_id != m.sender_id
                               AND COALESCE(p2.last_read_at, '') < m.created_at))
                 FROM messages m
                 LEFT JOIN users u ON m.sender_id = u.id
                 WHERE m.conversation_id = ?1 AND (?3 IS NULL OR m.created_at < ?3)
                 ORDER BY m.created_at DESC
                 LIMIT ?4",
            )?;

            let mut rows = stmt
                .query_map(rusqlite::params![conversation_id, viewer, before, limit], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        sender_id: row.get(2)?,
                        sender_username: row
                            .get::<_, Option<String>>(3)?
                            .unwrap_or_else(|| "unknown".to_string()),
                        sender_avatar_url: row.get(4)?,
                        content: row.get(5)?,
                        created_at: row.get(6)?,
                        read: row.get(7)?,
                        read_by_recipients: row.get(8)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.reverse();
            Ok(rows)
        })
    }

    /// Advance the caller's read watermark to the newest message. Monotonic:
    /// never moves backward, and a conversation with no messages is a no-op.
    pub fn mark_conversation_read(&self, conversation_id: &str, user_id: &str) -> Result<()> {
        self.with_tx(|tx| {
            if conversations::query_conversation(tx, conversation_id)?.is_none() {
                return Err(DbError::NotFound {
                    entity: "conversation",
                    id: conversation_id.to_string(),
                });
            }
            if participants::conversation_role(tx, conversation_id, user_id)?.is_none() {
                return Err(DbError::Forbidden(
                    "only active participants may mark a conversation read",
                ));
            }

            let newest: Option<String> = tx
                .query_row(
                    "SELECT MAX(created_at) FROM messages WHERE conversation_id = ?1",
                    [conversation_id],
                    |row| row.get(0),
                )
                .optional()?
                .flatten();

            if let Some(newest) = newest {
                tx.execute(
                    "UPDATE conversation_participants SET last_read_at = ?1
                     WHERE conversation_id = ?2 AND user_id = ?3 AND left_at IS NULL
                       AND (last_read_at IS NULL OR last_read_at < ?1)",
                    (&newest, conversation_id, user_id),
                )?;
            }
            Ok(())
        })
    }
}

/// Unread count for a viewer: messages from others newer than the viewer's
/// watermark. A null watermark means nothing has been read yet.
pub(crate) fn unread_count(conn: &Connection, conversation_id: &str, viewer: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM messages m
         WHERE m.conversation_id = ?1
           AND m.sender_id != ?2
           AND m.created_at > COALESCE(
               (SELECT p.last_read_at FROM conversation_participants p
                WHERE p.conversation_id = ?1 AND p.user_id = ?2 AND p.left_at IS NULL), '')",
        (conversation_id, viewer),
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{add_community, add_user, db, join};
    use agora_types::models::NotificationSettings;

    #[test]
    fn blank_content_is_rejected_before_any_write() {
        let db = db();
        let ada = add_user(&db, "ada");
        let grace = add_user(&db, "grace");
        let (conv, _) = db.create_direct_conversation(&ada, &grace).unwrap();

        let err = db.send_message(&conv, &ada, "   ").unwrap_err();
        assert!(matches!(err, DbError::InvalidInput(_)));
        assert!(db.get_messages(&conv, &ada, 50, None).unwrap().is_empty());
    }

    #[test]
    fn non_participants_cannot_post() {
        let db = db();
        let ada = add_user(&db, "ada");
        let grace = add_user(&db, "grace");
        let linus = add_user(&db, "linus");
        let (conv, _) = db.create_direct_conversation(&ada, &grace).unwrap();

        let err = db.send_message(&conv, &linus, "hi").unwrap_err();
        assert!(matches!(err, DbError::Forbidden(_)));
    }

    #[test]
    fn offline_direct_scenario_unread_goes_one_to_zero() {
        let db = db();
        let ada = add_user(&db, "ada");
        let grace = add_user(&db, "grace");
        let (conv, _) = db.create_direct_conversation(&ada, &grace).unwrap();

        let sent = db.send_message(&conv, &ada, "hello").unwrap();
        assert_eq!(sent.notifications.len(), 1);
        assert_eq!(sent.notifications[0].user_id, grace);
        assert!(sent.notifications[0]
            .message
            .contains("You have a new message: hello"));

        let unread = db
            .with_conn(|conn| unread_count(conn, &conv, &grace))
            .unwrap();
        assert_eq!(unread, 1);
        // The sender's own view has nothing unread.
        assert_eq!(db.with_conn(|conn| unread_count(conn, &conv, &ada)).unwrap(), 0);

        db.mark_conversation_read(&conv, &grace).unwrap();
        assert_eq!(
            db.with_conn(|conn| unread_count(conn, &conv, &grace)).unwrap(),
            0
        );

        // From Grace's side the message now reads as seen; Ada's receipt
        // flips too.
        let history = db.get_messages(&conv, &grace, 50, None).unwrap();
        assert!(history[0].read);
        let history = db.get_messages(&conv, &ada, 50, None).unwrap();
        assert!(history[0].read_by_recipients);
    }

    #[test]
    fn mark_read_is_monotonic_until_new_messages_arrive() {
        let db = db();
        let ada = add_user(&db, "ada");
        let grace = add_user(&db, "grace");
        let (conv, _) = db.create_direct_conversation(&ada, &grace).unwrap();

        db.send_message(&conv, &ada, "one").unwrap();
        db.mark_conversation_read(&conv, &grace).unwrap();
        db.mark_conversation_read(&conv, &grace).unwrap(); // no-op
        assert_eq!(
            db.with_conn(|conn| unread_count(conn, &conv, &grace)).unwrap(),
            0
        );

        db.send_message(&conv, &ada, "two").unwrap();
        assert_eq!(
            db.with_conn(|conn| unread_count(conn, &conv, &grace)).unwrap(),
            1
        );
    }

    #[test]
    fn fan_out_skips_departed_and_muted_participants() {
        let db = db();
        let ada = add_user(&db, "ada");
        let grace = add_user(&db, "grace");
        let barbara = add_user(&db, "barbara");
        let linus = add_user(&db, "linus");
        let rust = add_community(&db, "rustaceans");
        for u in [&ada, &grace, &barbara, &linus] {
            join(&db, u, &rust);
        }

        let created = db
            .create_group_conversation(
                &ada,
                &rust,
                "Team Chat",
                &[grace.clone(), barbara.clone(), linus.clone()],
            )
            .unwrap();
        let conv = created.conversation_id;

        // Barbara left; Linus muted message notifications.
        db.leave_conversation(&conv, &barbara).unwrap();
        let mut muted = NotificationSettings::default();
        muted.comment = false;
        db.set_notification_settings(&linus, &muted).unwrap();

        let sent = db.send_message(&conv, &ada, "standup in five").unwrap();
        assert_eq!(sent.notifications.len(), 1);
        assert_eq!(sent.notifications[0].user_id, grace);
    }

    #[test]
    fn departed_participants_messages_stay_in_history() {
        let db = db();
        let ada = add_user(&db, "ada");
        let grace = add_user(&db, "grace");
        let rust = add_community(&db, "rustaceans");
        join(&db, &ada, &rust);
        join(&db, &grace, &rust);

        let created = db
            .create_group_conversation(&ada, &rust, "Team Chat", &[grace.clone()])
            .unwrap();
        let conv = created.conversation_id;

        db.send_message(&conv, &grace, "my last word").unwrap();
        db.leave_conversation(&conv, &grace).unwrap();

        let history = db.get_messages(&conv, &ada, 50, None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sender_username, "grace");

        // And the departed member cannot post anymore.
        let err = db.send_message(&conv, &grace, "one more").unwrap_err();
        assert!(matches!(err, DbError::Forbidden(_)));
    }

    #[test]
    fn long_content_is_truncated_in_the_notification_preview() {
        let db = db();
        let ada = add_user(&db, "ada");
        let grace = add_user(&db, "grace");
        let (conv, _) = db.create_direct_conversation(&ada, &grace).unwrap();

        let long = "a".repeat(80);
        let sent = db.send_message(&conv, &ada, &long).unwrap();
        let body = &sent.notifications[0].message;
        assert!(body.ends_with("..."));
        assert!(body.len() < long.len());
    }

    #[test]
    fn history_is_ascending_with_a_working_cursor() {
        let db = db();
        let ada = add_user(&db, "ada");
        let grace = add_user(&db, "grace");
        let (conv, _) = db.create_direct_conversation(&ada, &grace).unwrap();

        for n in 1..=5 {
            db.send_message(&conv, &ada, &format!("msg {n}")).unwrap();
        }

        let newest = db.get_messages(&conv, &ada, 2, None).unwrap();
        let contents: Vec<_> = newest.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 4", "msg 5"]);

        let older = db
            .get_messages(&conv, &ada, 2, Some(&newest[0].created_at))
            .unwrap();
        let contents: Vec<_> = older.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 2", "msg 3"]);
    }
}

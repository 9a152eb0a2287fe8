use rusqlite::Connection;
use uuid::Uuid;

use agora_types::models::{NotificationKind, ParticipantRole};

use crate::models::{
    ConversationRow, ConversationSummaryRow, LastMessageRow, NotificationRow, SearchedUserRow,
};
use crate::queries::{communities, messages, notifications, participants, OptionalExt};
use crate::{now_ts, Database, DbError, Result};

/// Outcome of creating a group: the new conversation, the member ids that
/// actually joined, and the notification rows fanned out to them.
#[derive(Debug)]
pub struct GroupCreated {
    pub conversation_id: String,
    pub member_ids: Vec<String>,
    pub notifications: Vec<NotificationRow>,
}

impl Database {
    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    pub fn community_name(&self, community_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT name FROM communities WHERE id = ?1",
                [community_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Find-or-create the direct conversation between two users. Returns
    /// (conversation_id, created): creating twice yields the same id with
    /// created = false the second time.
    pub fn create_direct_conversation(&self, creator: &str, other: &str) -> Result<(String, bool)> {
        if creator == other {
            return Err(DbError::InvalidInput(
                "a direct conversation needs two distinct users",
            ));
        }

        self.with_tx(|tx| {
            let other_exists: Option<i32> = tx
                .query_row("SELECT 1 FROM users WHERE id = ?1", [other], |row| {
                    row.get(0)
                })
                .optional()?;
            if other_exists.is_none() {
                return Err(DbError::NotFound {
                    entity: "user",
                    id: other.to_string(),
                });
            }

            if let Some(existing) = find_direct_between(tx, creator, other)? {
                return Ok((existing, false));
            }

            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO conversations (id, kind, created_at) VALUES (?1, 'direct', ?2)",
                (&id, now_ts()),
            )?;
            participants::insert_participant(tx, &id, creator, ParticipantRole::Member)?;
            participants::insert_participant(tx, &id, other, ParticipantRole::Member)?;

            Ok((id, true))
        })
    }

    /// Create a community-scoped group chat: the creator joins as owner,
    /// the selected members join as members, and each member gets one
    /// notification — all in one transaction.
    pub fn create_group_conversation(
        &self,
        creator: &str,
        community_id: &str,
        name: &str,
        member_ids: &[String],
    ) -> Result<GroupCreated> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DbError::InvalidInput("group name must not be empty"));
        }

        self.with_tx(|tx| {
            if !communities::is_member(tx, creator, community_id)? {
                return Err(DbError::Forbidden(
                    "you must belong to the community to create a group chat",
                ));
            }

            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO conversations (id, kind, community_id, name, created_at)
                 VALUES (?1, 'group', ?2, ?3, ?4)",
                (&id, community_id, name, now_ts()),
            )?;
            participants::insert_participant(tx, &id, creator, ParticipantRole::Owner)?;

            let link = format!("/messages?conversation={id}");
            let body = format!("You've been added to {name}");
            let mut member_rows = Vec::new();
            let mut fanned_out = Vec::new();

            for user_id in member_ids {
                if user_id == creator || member_rows.contains(user_id) {
                    continue;
                }
                if !communities::is_member(tx, user_id, community_id)? {
                    return Err(DbError::Forbidden(
                        "user is not a member of this community",
                    ));
                }

                participants::insert_participant(tx, &id, user_id, ParticipantRole::Member)?;
                if let Some(row) = notifications::insert_if_enabled(
                    tx,
                    user_id,
                    NotificationKind::CommunityUpdate,
                    "Added to group chat",
                    &body,
                    Some(&link),
                    Some(community_id),
                    Some(creator),
                )? {
                    fanned_out.push(row);
                }
                member_rows.push(user_id.clone());
            }

            Ok(GroupCreated {
                conversation_id: id,
                member_ids: member_rows,
                notifications: fanned_out,
            })
        })
    }

    /// Delete a group and everything under it (participants and messages
    /// cascade). Owner only.
    pub fn delete_conversation(&self, id: &str, actor: &str) -> Result<()> {
        self.with_tx(|tx| {
            let conv = query_conversation(tx, id)?.ok_or_else(|| DbError::NotFound {
                entity: "conversation",
                id: id.to_string(),
            })?;
            if conv.kind != "group" {
                return Err(DbError::InvalidInput(
                    "only group conversations can be deleted",
                ));
            }

            let role = participants::conversation_role(tx, id, actor)?;
            if role.as_deref() != Some("owner") {
                return Err(DbError::Forbidden("only the owner may delete the group"));
            }

            tx.execute("DELETE FROM conversations WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    /// The directory: every conversation where the user is an active
    /// participant, hydrated with counterpart/group display data, the last
    /// message, and the unread count, ordered by last activity (newest
    /// message, falling back to creation time).
    pub fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.kind, c.name, c.community_id, com.name, c.created_at
                 FROM conversations c
                 INNER JOIN conversation_participants p ON p.conversation_id = c.id
                 LEFT JOIN communities com ON com.id = c.community_id
                 WHERE p.user_id = ?1 AND p.left_at IS NULL",
            )?;

            let convs = stmt
                .query_map([user_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut summaries = Vec::with_capacity(convs.len());
            for (id, kind, name, community_id, community_name, created_at) in convs {
                let other_user = if kind == "direct" {
                    counterpart(conn, &id, user_id)?
                } else {
                    None
                };
                let last_message = last_message(conn, &id)?;
                let unread_count = messages::unread_count(conn, &id, user_id)?;
                let participant_count = active_count(conn, &id)?;

                summaries.push(ConversationSummaryRow {
                    id,
                    kind,
                    name,
                    community_id,
                    community_name,
                    other_user,
                    last_message,
                    unread_count,
                    participant_count,
                    created_at,
                });
            }

            // Last activity beats creation order; timestamps share one
            // lexicographically-sortable format.
            summaries.sort_by(|a, b| {
                let a_key = a
                    .last_message
                    .as_ref()
                    .map(|m| m.created_at.as_str())
                    .unwrap_or(a.created_at.as_str());
                let b_key = b
                    .last_message
                    .as_ref()
                    .map(|m| m.created_at.as_str())
                    .unwrap_or(b.created_at.as_str());
                b_key.cmp(a_key)
            });

            Ok(summaries)
        })
    }
}

pub(crate) fn query_conversation(conn: &Connection, id: &str) -> Result<Option<ConversationRow>> {
    conn.query_row(
        "SELECT id, kind, community_id, name, created_at FROM conversations WHERE id = ?1",
        [id],
        |row| {
            Ok(ConversationRow {
                id: row.get(0)?,
                kind: row.get(1)?,
                community_id: row.get(2)?,
                name: row.get(3)?,
                created_at: row.get(4)?,
            })
        },
    )
    .optional()
}

/// The direct conversation both users participate in, if one exists.
/// Matches any participant row regardless of left_at — a direct chat's
/// pair identifies it for all time.
pub(crate) fn find_direct_between(
    conn: &Connection,
    user_a: &str,
    user_b: &str,
) -> Result<Option<String>> {
    conn.query_row(
        "SELECT c.id
         FROM conversations c
         INNER JOIN conversation_participants pa ON pa.conversation_id = c.id
         INNER JOIN conversation_participants pb ON pb.conversation_id = c.id
         WHERE c.kind = 'direct' AND pa.user_id = ?1 AND pb.user_id = ?2
         LIMIT 1",
        (user_a, user_b),
        |row| row.get(0),
    )
    .optional()
}

fn counterpart(
    conn: &Connection,
    conversation_id: &str,
    user_id: &str,
) -> Result<Option<SearchedUserRow>> {
    conn.query_row(
        "SELECT u.id, u.username, u.avatar_url, u.email
         FROM conversation_participants p
         INNER JOIN users u ON u.id = p.user_id
         WHERE p.conversation_id = ?1 AND p.user_id != ?2
         LIMIT 1",
        (conversation_id, user_id),
        |row| {
            Ok(SearchedUserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                avatar_url: row.get(2)?,
                email: row.get(3)?,
            })
        },
    )
    .optional()
}

fn last_message(conn: &Connection, conversation_id: &str) -> Result<Option<LastMessageRow>> {
    conn.query_row(
        "SELECT content, sender_id, created_at
         FROM messages
         WHERE conversation_id = ?1
         ORDER BY created_at DESC
         LIMIT 1",
        [conversation_id],
        |row| {
            Ok(LastMessageRow {
                content: row.get(0)?,
                sender_id: row.get(1)?,
                created_at: row.get(2)?,
            })
        },
    )
    .optional()
}

fn active_count(conn: &Connection, conversation_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM conversation_participants
         WHERE conversation_id = ?1 AND left_at IS NULL",
        [conversation_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{add_community, add_user, db, join};

    #[test]
    fn direct_creation_is_idempotent() {
        let db = db();
        let ada = add_user(&db, "ada");
        let grace = add_user(&db, "grace");

        let (first, created) = db.create_direct_conversation(&ada, &grace).unwrap();
        assert!(created);

        // Same pair again, and from the other side: same conversation.
        let (second, created) = db.create_direct_conversation(&ada, &grace).unwrap();
        assert!(!created);
        assert_eq!(first, second);

        let (third, created) = db.create_direct_conversation(&grace, &ada).unwrap();
        assert!(!created);
        assert_eq!(first, third);
    }

    #[test]
    fn direct_requires_two_distinct_existing_users() {
        let db = db();
        let ada = add_user(&db, "ada");

        let err = db.create_direct_conversation(&ada, &ada).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput(_)));

        let err = db.create_direct_conversation(&ada, "ghost").unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[test]
    fn group_creator_becomes_owner_and_members_are_notified() {
        let db = db();
        let ada = add_user(&db, "ada");
        let grace = add_user(&db, "grace");
        let barbara = add_user(&db, "barbara");
        let rust = add_community(&db, "rustaceans");
        for u in [&ada, &grace, &barbara] {
            join(&db, u, &rust);
        }

        let created = db
            .create_group_conversation(&ada, &rust, "Team Chat", &[grace.clone(), barbara.clone()])
            .unwrap();

        let conv = db.get_conversation(&created.conversation_id).unwrap().unwrap();
        assert_eq!(conv.kind, "group");
        assert_eq!(conv.name.as_deref(), Some("Team Chat"));

        let roster = db.participants(&created.conversation_id).unwrap();
        assert_eq!(roster.len(), 3);
        let owner_role = db
            .participant_role(&created.conversation_id, &ada)
            .unwrap()
            .unwrap();
        assert_eq!(owner_role, ParticipantRole::Owner);

        assert_eq!(created.notifications.len(), 2);
        for n in &created.notifications {
            assert_eq!(n.title, "Added to group chat");
            assert_eq!(n.message, "You've been added to Team Chat");
            assert!(n.user_id == grace || n.user_id == barbara);
        }
    }

    #[test]
    fn group_name_and_creator_membership_are_validated() {
        let db = db();
        let ada = add_user(&db, "ada");
        let rust = add_community(&db, "rustaceans");

        let err = db
            .create_group_conversation(&ada, &rust, "Chat", &[])
            .unwrap_err();
        assert!(matches!(err, DbError::Forbidden(_)));

        join(&db, &ada, &rust);
        let err = db
            .create_group_conversation(&ada, &rust, "   ", &[])
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidInput(_)));
    }

    #[test]
    fn delete_is_owner_only_and_cascades() {
        let db = db();
        let ada = add_user(&db, "ada");
        let grace = add_user(&db, "grace");
        let rust = add_community(&db, "rustaceans");
        join(&db, &ada, &rust);
        join(&db, &grace, &rust);

        let created = db
            .create_group_conversation(&ada, &rust, "Team Chat", &[grace.clone()])
            .unwrap();
        let conv_id = created.conversation_id;
        db.send_message(&conv_id, &ada, "hello").unwrap();

        let err = db.delete_conversation(&conv_id, &grace).unwrap_err();
        assert!(matches!(err, DbError::Forbidden(_)));

        db.delete_conversation(&conv_id, &ada).unwrap();
        assert!(db.get_conversation(&conv_id).unwrap().is_none());

        let orphans: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT (SELECT COUNT(*) FROM messages WHERE conversation_id = ?1)
                          + (SELECT COUNT(*) FROM conversation_participants WHERE conversation_id = ?1)",
                    [conv_id.as_str()],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn directory_orders_by_last_activity_and_counts_unread() {
        let db = db();
        let ada = add_user(&db, "ada");
        let grace = add_user(&db, "grace");
        let barbara = add_user(&db, "barbara");

        // Older conversation first, then a newer one.
        let (with_grace, _) = db.create_direct_conversation(&ada, &grace).unwrap();
        let (with_barbara, _) = db.create_direct_conversation(&ada, &barbara).unwrap();

        // Activity in the older conversation bubbles it to the top.
        db.send_message(&with_grace, &grace, "ping").unwrap();

        let directory = db.list_conversations(&ada).unwrap();
        assert_eq!(directory.len(), 2);
        assert_eq!(directory[0].id, with_grace);
        assert_eq!(directory[0].unread_count, 1);
        assert_eq!(directory[0].other_user.as_ref().unwrap().username, "grace");
        assert_eq!(directory[0].last_message.as_ref().unwrap().content, "ping");
        assert_eq!(directory[1].id, with_barbara);
        assert_eq!(directory[1].unread_count, 0);
        assert!(directory[1].last_message.is_none());
    }

    #[test]
    fn directory_excludes_conversations_the_user_left() {
        let db = db();
        let ada = add_user(&db, "ada");
        let grace = add_user(&db, "grace");
        let rust = add_community(&db, "rustaceans");
        join(&db, &ada, &rust);
        join(&db, &grace, &rust);

        let created = db
            .create_group_conversation(&ada, &rust, "Team Chat", &[grace.clone()])
            .unwrap();

        assert_eq!(db.list_conversations(&grace).unwrap().len(), 1);
        db.leave_conversation(&created.conversation_id, &grace).unwrap();
        assert!(db.list_conversations(&grace).unwrap().is_empty());
        // The owner still sees it.
        assert_eq!(db.list_conversations(&ada).unwrap().len(), 1);
    }
}

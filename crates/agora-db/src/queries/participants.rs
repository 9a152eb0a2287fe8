use rusqlite::Connection;
use uuid::Uuid;

use agora_types::models::{NotificationKind, ParticipantRole};

use crate::models::{NotificationRow, ParticipantInfoRow};
use crate::queries::{communities, conversations, notifications, users, OptionalExt};
use crate::{now_ts, Database, DbError, Result};

/// Outcome of an add-members call: who actually joined (already-active ids
/// are skipped) and the notification rows written for them.
#[derive(Debug)]
pub struct AddedMembers {
    pub added: Vec<(String, String)>,
    pub notifications: Vec<NotificationRow>,
}

impl Database {
    /// Active roster with user display fields.
    pub fn participants(&self, conversation_id: &str) -> Result<Vec<ParticipantInfoRow>> {
        self.with_conn(|conn| active_roster(conn, conversation_id))
    }

    /// The caller's active role in a conversation, if any.
    pub fn participant_role(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Option<ParticipantRole>> {
        self.with_conn(|conn| {
            Ok(conversation_role(conn, conversation_id, user_id)?
                .and_then(|r| ParticipantRole::parse(&r)))
        })
    }

    /// Add community members to a group chat. Owner/admin only; targets
    /// must belong to the conversation's community. Already-active targets
    /// are skipped; a previously-departed target gets a fresh row.
    /// Participant inserts and their notifications commit atomically.
    pub fn add_participants(
        &self,
        conversation_id: &str,
        actor: &str,
        user_ids: &[String],
    ) -> Result<AddedMembers> {
        self.with_tx(|tx| {
            let conv = conversations::query_conversation(tx, conversation_id)?.ok_or_else(|| {
                DbError::NotFound {
                    entity: "conversation",
                    id: conversation_id.to_string(),
                }
            })?;
            if conv.kind != "group" {
                return Err(DbError::InvalidInput(
                    "members can only be added to group conversations",
                ));
            }
            let community_id = conv.community_id.as_deref().ok_or(DbError::InvalidInput(
                "group conversation has no community",
            ))?;

            require_manager(tx, conversation_id, actor)?;

            let mut added = Vec::new();
            let mut fanned_out = Vec::new();

            for user_id in user_ids {
                if user_id == actor || added.iter().any(|(id, _)| id == user_id) {
                    continue;
                }
                if conversation_role(tx, conversation_id, user_id)?.is_some() {
                    continue;
                }
                if !communities::is_member(tx, user_id, community_id)? {
                    return Err(DbError::Forbidden(
                        "user is not a member of this community",
                    ));
                }

                insert_participant(tx, conversation_id, user_id, ParticipantRole::Member)?;

                let link = format!("/messages?conversation={conversation_id}");
                if let Some(row) = notifications::insert_if_enabled(
                    tx,
                    user_id,
                    NotificationKind::CommunityUpdate,
                    "Added to group chat",
                    "You've been added to a group conversation",
                    Some(&link),
                    Some(community_id),
                    Some(actor),
                )? {
                    fanned_out.push(row);
                }

                let username = users::display_for(tx, user_id)?
                    .map(|(name, _)| name)
                    .unwrap_or_else(|| "unknown".to_string());
                added.push((user_id.clone(), username));
            }

            Ok(AddedMembers {
                added,
                notifications: fanned_out,
            })
        })
    }

    /// Stamp left_at on the target's active row. Owner/admin only; the
    /// owner cannot be removed and an actor cannot remove themselves.
    /// Returns the removal notification, if the target has the category
    /// enabled.
    pub fn remove_participant(
        &self,
        conversation_id: &str,
        actor: &str,
        target: &str,
    ) -> Result<Option<NotificationRow>> {
        self.with_tx(|tx| {
            let conv = conversations::query_conversation(tx, conversation_id)?.ok_or_else(|| {
                DbError::NotFound {
                    entity: "conversation",
                    id: conversation_id.to_string(),
                }
            })?;
            if conv.kind != "group" {
                return Err(DbError::InvalidInput(
                    "participants can only be removed from group conversations",
                ));
            }
            if target == actor {
                return Err(DbError::InvalidInput("leave the group instead"));
            }

            require_manager(tx, conversation_id, actor)?;

            let target_role =
                conversation_role(tx, conversation_id, target)?.ok_or_else(|| DbError::NotFound {
                    entity: "participant",
                    id: target.to_string(),
                })?;
            if target_role == "owner" {
                return Err(DbError::Forbidden("the owner cannot be removed"));
            }

            stamp_left_at(tx, conversation_id, target)?;

            notifications::insert_if_enabled(
                tx,
                target,
                NotificationKind::System,
                "Removed from group chat",
                "You have been removed from a group conversation",
                None,
                None,
                Some(actor),
            )
        })
    }

    /// Stamp left_at on the actor's own row. Group-only; the owner must
    /// delete the group instead of leaving it ownerless.
    pub fn leave_conversation(&self, conversation_id: &str, actor: &str) -> Result<()> {
        self.with_tx(|tx| {
            let conv = conversations::query_conversation(tx, conversation_id)?.ok_or_else(|| {
                DbError::NotFound {
                    entity: "conversation",
                    id: conversation_id.to_string(),
                }
            })?;
            if conv.kind != "group" {
                return Err(DbError::InvalidInput("direct conversations cannot be left"));
            }

            let role =
                conversation_role(tx, conversation_id, actor)?.ok_or_else(|| DbError::NotFound {
                    entity: "participant",
                    id: actor.to_string(),
                })?;
            if role == "owner" {
                return Err(DbError::Forbidden("the owner must delete the group instead"));
            }

            stamp_left_at(tx, conversation_id, actor)
        })
    }
}

/// Role on the caller's *active* row, as stored. Departed rows never count.
pub(crate) fn conversation_role(
    conn: &Connection,
    conversation_id: &str,
    user_id: &str,
) -> Result<Option<String>> {
    conn.query_row(
        "SELECT role FROM conversation_participants
         WHERE conversation_id = ?1 AND user_id = ?2 AND left_at IS NULL",
        (conversation_id, user_id),
        |row| row.get(0),
    )
    .optional()
}

pub(crate) fn active_roster(
    conn: &Connection,
    conversation_id: &str,
) -> Result<Vec<ParticipantInfoRow>> {
    let mut stmt = conn.prepare(
        "SELECT p.user_id, u.username, u.avatar_url, u.email, p.role, p.joined_at
         FROM conversation_participants p
         LEFT JOIN users u ON p.user_id = u.id
         WHERE p.conversation_id = ?1 AND p.left_at IS NULL
         ORDER BY p.joined_at",
    )?;

    let rows = stmt
        .query_map([conversation_id], |row| {
            Ok(ParticipantInfoRow {
                user_id: row.get(0)?,
                username: row
                    .get::<_, Option<String>>(1)?
                    .unwrap_or_else(|| "unknown".to_string()),
                avatar_url: row.get(2)?,
                email: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                role: row.get(4)?,
                joined_at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Everyone who receives a fan-out for an action by `excluding`: the other
/// active participants.
pub(crate) fn other_active_ids(
    conn: &Connection,
    conversation_id: &str,
    excluding: &str,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM conversation_participants
         WHERE conversation_id = ?1 AND user_id != ?2 AND left_at IS NULL",
    )?;

    let rows = stmt
        .query_map((conversation_id, excluding), |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub(crate) fn insert_participant(
    conn: &Connection,
    conversation_id: &str,
    user_id: &str,
    role: ParticipantRole,
) -> Result<()> {
    conn.execute(
        "INSERT INTO conversation_participants (id, conversation_id, user_id, role, joined_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            Uuid::new_v4().to_string(),
            conversation_id,
            user_id,
            role.as_str(),
            now_ts(),
        ),
    )?;
    Ok(())
}

fn require_manager(conn: &Connection, conversation_id: &str, actor: &str) -> Result<()> {
    let role = conversation_role(conn, conversation_id, actor)?
        .and_then(|r| ParticipantRole::parse(&r))
        .ok_or(DbError::Forbidden("not an active participant"))?;
    if !role.can_manage() {
        return Err(DbError::Forbidden(
            "only the owner or an admin may manage members",
        ));
    }
    Ok(())
}

fn stamp_left_at(conn: &Connection, conversation_id: &str, user_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE conversation_participants SET left_at = ?1
         WHERE conversation_id = ?2 AND user_id = ?3 AND left_at IS NULL",
        (now_ts(), conversation_id, user_id),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{add_community, add_user, db, join};

    struct Group {
        db: Database,
        community: String,
        conversation: String,
        owner: String,
        member: String,
        outsider: String,
    }

    fn group() -> Group {
        let db = db();
        let owner = add_user(&db, "ada");
        let member = add_user(&db, "grace");
        let outsider = add_user(&db, "linus");
        let community = add_community(&db, "rustaceans");
        join(&db, &owner, &community);
        join(&db, &member, &community);

        let created = db
            .create_group_conversation(&owner, &community, "Team Chat", &[member.clone()])
            .unwrap();

        Group {
            db,
            community,
            conversation: created.conversation_id,
            owner,
            member,
            outsider,
        }
    }

    #[test]
    fn member_cannot_manage_roster() {
        let g = group();
        let joiner = add_user(&g.db, "barbara");
        join(&g.db, &joiner, &g.community);

        let err = g
            .db
            .add_participants(&g.conversation, &g.member, &[joiner.clone()])
            .unwrap_err();
        assert!(matches!(err, DbError::Forbidden(_)));

        let err = g
            .db
            .remove_participant(&g.conversation, &g.member, &g.owner)
            .unwrap_err();
        assert!(matches!(err, DbError::Forbidden(_)));
    }

    #[test]
    fn non_community_members_cannot_be_added() {
        let g = group();
        let err = g
            .db
            .add_participants(&g.conversation, &g.owner, &[g.outsider.clone()])
            .unwrap_err();
        assert!(matches!(err, DbError::Forbidden(_)));
    }

    #[test]
    fn already_active_targets_are_skipped() {
        let g = group();
        let result = g
            .db
            .add_participants(&g.conversation, &g.owner, &[g.member.clone()])
            .unwrap();
        assert!(result.added.is_empty());
        assert!(result.notifications.is_empty());
    }

    #[test]
    fn add_notifies_each_new_member() {
        let g = group();
        let barbara = add_user(&g.db, "barbara");
        join(&g.db, &barbara, &g.community);

        let result = g
            .db
            .add_participants(&g.conversation, &g.owner, &[barbara.clone()])
            .unwrap();
        assert_eq!(result.added.len(), 1);
        assert_eq!(result.added[0].1, "barbara");
        assert_eq!(result.notifications.len(), 1);
        assert_eq!(result.notifications[0].title, "Added to group chat");
        assert_eq!(result.notifications[0].user_id, barbara);
        assert_eq!(result.notifications[0].community_name.as_deref(), Some("rustaceans"));
    }

    #[test]
    fn removal_stamps_left_at_and_shrinks_roster() {
        let g = group();
        let notif = g
            .db
            .remove_participant(&g.conversation, &g.owner, &g.member)
            .unwrap();
        assert_eq!(notif.unwrap().kind, "system");

        let roster = g.db.participants(&g.conversation).unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].user_id, g.owner);

        // The departed row persists for history.
        let rows: i64 = g
            .db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM conversation_participants WHERE conversation_id = ?1",
                    [g.conversation.as_str()],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn owner_cannot_be_removed_or_leave() {
        let g = group();
        let err = g
            .db
            .remove_participant(&g.conversation, &g.owner, &g.owner)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidInput(_)));

        let err = g
            .db
            .leave_conversation(&g.conversation, &g.owner)
            .unwrap_err();
        assert!(matches!(err, DbError::Forbidden(_)));
    }

    #[test]
    fn rejoining_after_leave_creates_a_fresh_row() {
        let g = group();
        g.db.leave_conversation(&g.conversation, &g.member).unwrap();
        assert!(g
            .db
            .participant_role(&g.conversation, &g.member)
            .unwrap()
            .is_none());

        let result = g
            .db
            .add_participants(&g.conversation, &g.owner, &[g.member.clone()])
            .unwrap();
        assert_eq!(result.added.len(), 1);

        // Two rows total for the member: the departed one and the new one.
        let rows: i64 = g
            .db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM conversation_participants
                     WHERE conversation_id = ?1 AND user_id = ?2",
                    (g.conversation.as_str(), g.member.as_str()),
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(rows, 2);
        assert_eq!(
            g.db.participant_role(&g.conversation, &g.member).unwrap(),
            Some(ParticipantRole::Member)
        );
    }
}

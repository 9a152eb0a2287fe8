use rusqlite::Connection;
use uuid::Uuid;

use agora_types::models::NotificationKind;

use crate::models::NotificationRow;
use crate::queries::{users, OptionalExt};
use crate::{now_ts, Database, DbError, Result};

/// Write one notification row, unless the recipient has disabled the
/// category — suppression happens here, at write time, so a muted category
/// never grows the inbox. Returns the hydrated row for gateway delivery,
/// or None when suppressed.
pub(crate) fn insert_if_enabled(
    conn: &Connection,
    recipient: &str,
    kind: NotificationKind,
    title: &str,
    message: &str,
    link: Option<&str>,
    community_id: Option<&str>,
    related_user_id: Option<&str>,
) -> Result<Option<NotificationRow>> {
    let settings = users::settings_for(conn, recipient)?;
    if !settings.allows(kind) {
        return Ok(None);
    }

    let id = Uuid::new_v4().to_string();
    let created_at = now_ts();
    conn.execute(
        "INSERT INTO notifications
             (id, user_id, kind, title, message, link, community_id, related_user_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        (
            &id,
            recipient,
            kind.as_str(),
            title,
            message,
            link,
            community_id,
            related_user_id,
            &created_at,
        ),
    )?;

    let related = match related_user_id {
        Some(uid) => users::display_for(conn, uid)?,
        None => None,
    };
    let community_name = match community_id {
        Some(cid) => conn
            .query_row("SELECT name FROM communities WHERE id = ?1", [cid], |row| {
                row.get(0)
            })
            .optional()?,
        None => None,
    };

    Ok(Some(NotificationRow {
        id,
        user_id: recipient.to_string(),
        kind: kind.as_str().to_string(),
        title: title.to_string(),
        message: message.to_string(),
        link: link.map(str::to_string),
        community_id: community_id.map(str::to_string),
        community_name,
        related_user_id: related_user_id.map(str::to_string),
        related_username: related.as_ref().map(|(name, _)| name.clone()),
        related_avatar_url: related.and_then(|(_, avatar)| avatar),
        is_read: false,
        created_at,
    }))
}

impl Database {
    /// Newest-first feed with display joins. `kind` narrows to one category
    /// (the full page's tabs); `limit` is the surface cap (50 popover, 100
    /// full page).
    pub fn list_notifications(
        &self,
        user_id: &str,
        kind: Option<&str>,
        limit: u32,
    ) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            // JOIN users and communities for display names in one query
            let mut stmt = conn.prepare(
                "SELECT n.id, n.user_id, n.kind, n.title, n.message, n.link,
                        n.community_id, c.name, n.related_user_id, u.username, u.avatar_url,
                        n.is_read, n.created_at
                 FROM notifications n
                 LEFT JOIN users u ON n.related_user_id = u.id
                 LEFT JOIN communities c ON n.community_id = c.id
                 WHERE n.user_id = ?1 AND (?2 IS NULL OR n.kind = ?2)
                 ORDER BY n.created_at DESC
                 LIMIT ?3",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![user_id, kind, limit], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        kind: row.get(2)?,
                        title: row.get(3)?,
                        message: row.get(4)?,
                        link: row.get(5)?,
                        community_id: row.get(6)?,
                        community_name: row.get(7)?,
                        related_user_id: row.get(8)?,
                        related_username: row.get(9)?,
                        related_avatar_url: row.get(10)?,
                        is_read: row.get(11)?,
                        created_at: row.get(12)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn unread_notification_count(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Mark one of the caller's notifications read. Scoped by user so one
    /// user cannot flip another's rows.
    pub fn mark_notification_read(&self, id: &str, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                (id, user_id),
            )?;
            if updated == 0 {
                return Err(DbError::NotFound {
                    entity: "notification",
                    id: id.to_string(),
                });
            }
            Ok(())
        })
    }

    /// Batch-update every currently-unread row. Returns how many flipped.
    pub fn mark_all_notifications_read(&self, user_id: &str) -> Result<u64> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user_id],
            )?;
            Ok(updated as u64)
        })
    }

    pub fn delete_notification(&self, id: &str, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2",
                (id, user_id),
            )?;
            if deleted == 0 {
                return Err(DbError::NotFound {
                    entity: "notification",
                    id: id.to_string(),
                });
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{add_user, db};
    use agora_types::models::NotificationSettings;

    fn notify(db: &Database, recipient: &str, kind: NotificationKind) -> Option<NotificationRow> {
        db.with_tx(|tx| insert_if_enabled(tx, recipient, kind, "t", "m", None, None, None))
            .unwrap()
    }

    #[test]
    fn disabled_category_is_never_written() {
        let db = db();
        let ada = add_user(&db, "ada");

        let mut settings = NotificationSettings::default();
        settings.comment = false;
        db.set_notification_settings(&ada, &settings).unwrap();

        assert!(notify(&db, &ada, NotificationKind::Comment).is_none());
        assert!(notify(&db, &ada, NotificationKind::System).is_some());

        let feed = db.list_notifications(&ada, None, 100).unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].kind, "system");
    }

    #[test]
    fn feed_is_newest_first_capped_and_filterable() {
        let db = db();
        let ada = add_user(&db, "ada");

        notify(&db, &ada, NotificationKind::Comment);
        notify(&db, &ada, NotificationKind::Mention);
        notify(&db, &ada, NotificationKind::System);

        let all = db.list_notifications(&ada, None, 100).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].kind, "system"); // newest first

        let capped = db.list_notifications(&ada, None, 2).unwrap();
        assert_eq!(capped.len(), 2);

        let mentions = db.list_notifications(&ada, Some("mention"), 100).unwrap();
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].kind, "mention");
    }

    #[test]
    fn mark_all_flips_only_unread_rows() {
        let db = db();
        let ada = add_user(&db, "ada");

        let first = notify(&db, &ada, NotificationKind::Comment).unwrap();
        notify(&db, &ada, NotificationKind::Comment);
        db.mark_notification_read(&first.id, &ada).unwrap();

        assert_eq!(db.unread_notification_count(&ada).unwrap(), 1);
        assert_eq!(db.mark_all_notifications_read(&ada).unwrap(), 1);
        assert_eq!(db.unread_notification_count(&ada).unwrap(), 0);
    }

    #[test]
    fn cross_user_mutation_is_rejected() {
        let db = db();
        let ada = add_user(&db, "ada");
        let grace = add_user(&db, "grace");

        let row = notify(&db, &ada, NotificationKind::Comment).unwrap();

        let err = db.mark_notification_read(&row.id, &grace).unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
        let err = db.delete_notification(&row.id, &grace).unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        // Ada still sees it unread, then deletes it for real.
        assert_eq!(db.unread_notification_count(&ada).unwrap(), 1);
        db.delete_notification(&row.id, &ada).unwrap();
        assert!(db.list_notifications(&ada, None, 100).unwrap().is_empty());
    }
}

use rusqlite::Connection;

use agora_types::models::NotificationSettings;

use crate::error::is_unique_violation;
use crate::models::{SearchedUserRow, UserRow};
use crate::queries::OptionalExt;
use crate::{Database, DbError, Result};

impl Database {
    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, username, password) VALUES (?1, ?2, ?3, ?4)",
                (id, email, username, password_hash),
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DbError::AlreadyExists {
                        entity: "user",
                        id: format!("{username} <{email}>"),
                    }
                } else {
                    e.into()
                }
            })?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Substring search on username or email, excluding the caller. A blank
    /// query returns nothing without touching the table.
    pub fn search_users(&self, query: &str, excluding_user: &str) -> Result<Vec<SearchedUserRow>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let pattern = format!("%{query}%");
            let mut stmt = conn.prepare(
                "SELECT id, username, avatar_url, email
                 FROM users
                 WHERE id != ?1 AND (username LIKE ?2 OR email LIKE ?2)
                 ORDER BY username
                 LIMIT 20",
            )?;

            let rows = stmt
                .query_map((excluding_user, &pattern), |row| {
                    Ok(SearchedUserRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        avatar_url: row.get(2)?,
                        email: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn get_notification_settings(&self, user_id: &str) -> Result<NotificationSettings> {
        self.with_conn(|conn| settings_for(conn, user_id))
    }

    pub fn set_notification_settings(
        &self,
        user_id: &str,
        settings: &NotificationSettings,
    ) -> Result<()> {
        let json = serde_json::to_string(settings)
            .map_err(|_| DbError::InvalidInput("unserializable settings"))?;

        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE users SET notification_settings = ?1 WHERE id = ?2",
                (&json, user_id),
            )?;
            if updated == 0 {
                return Err(DbError::NotFound {
                    entity: "user",
                    id: user_id.to_string(),
                });
            }
            Ok(())
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is a fixed identifier chosen by the callers above, never
    // user input.
    let sql = format!(
        "SELECT id, email, username, password, role, avatar_url, notification_settings, created_at
         FROM users WHERE {column} = ?1"
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                username: row.get(2)?,
                password: row.get(3)?,
                role: row.get(4)?,
                avatar_url: row.get(5)?,
                notification_settings: row.get(6)?,
                created_at: row.get(7)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Parse a user's stored settings, falling back to the defaults when the
/// column is null or unreadable. Used inside fan-out transactions.
pub(crate) fn settings_for(conn: &Connection, user_id: &str) -> Result<NotificationSettings> {
    let raw: Option<Option<String>> = conn
        .query_row(
            "SELECT notification_settings FROM users WHERE id = ?1",
            [user_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(raw) = raw else {
        return Err(DbError::NotFound {
            entity: "user",
            id: user_id.to_string(),
        });
    };

    Ok(raw
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default())
}

/// Display fields for hydrating rows that reference a user.
pub(crate) fn display_for(
    conn: &Connection,
    user_id: &str,
) -> Result<Option<(String, Option<String>)>> {
    conn.query_row(
        "SELECT username, avatar_url FROM users WHERE id = ?1",
        [user_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{add_user, db};
    use agora_types::models::NotificationKind;

    #[test]
    fn duplicate_email_or_username_is_rejected() {
        let db = db();
        add_user(&db, "ada");

        let err = db
            .create_user("other-id", "ada@example.com", "ada2", "h")
            .unwrap_err();
        assert!(matches!(err, DbError::AlreadyExists { entity: "user", .. }));

        let err = db
            .create_user("other-id", "ada2@example.com", "ada", "h")
            .unwrap_err();
        assert!(matches!(err, DbError::AlreadyExists { entity: "user", .. }));
    }

    #[test]
    fn search_excludes_self_and_matches_email_substring() {
        let db = db();
        let ada = add_user(&db, "ada");
        add_user(&db, "grace");
        add_user(&db, "adamant");

        let hits = db.search_users("ada", &ada).unwrap();
        let names: Vec<_> = hits.iter().map(|u| u.username.as_str()).collect();
        // "ada" herself is excluded; "adamant" matches by username,
        // "grace" does not match at all.
        assert_eq!(names, vec!["adamant"]);

        let by_email = db.search_users("grace@example", &ada).unwrap();
        assert_eq!(by_email.len(), 1);
        assert_eq!(by_email[0].username, "grace");
    }

    #[test]
    fn blank_search_returns_empty() {
        let db = db();
        let ada = add_user(&db, "ada");
        assert!(db.search_users("", &ada).unwrap().is_empty());
        assert!(db.search_users("   ", &ada).unwrap().is_empty());
    }

    #[test]
    fn settings_default_until_set_and_round_trip() {
        let db = db();
        let ada = add_user(&db, "ada");

        let settings = db.get_notification_settings(&ada).unwrap();
        assert!(settings.allows(NotificationKind::Comment));

        let mut muted = settings.clone();
        muted.comment = false;
        db.set_notification_settings(&ada, &muted).unwrap();

        let reloaded = db.get_notification_settings(&ada).unwrap();
        assert!(!reloaded.allows(NotificationKind::Comment));
        assert!(reloaded.allows(NotificationKind::System));
    }

    #[test]
    fn settings_update_for_unknown_user_is_not_found() {
        let db = db();
        let err = db
            .set_notification_settings("missing", &NotificationSettings::default())
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}

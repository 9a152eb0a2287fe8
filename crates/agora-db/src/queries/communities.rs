use rusqlite::Connection;

use crate::error::is_unique_violation;
use crate::models::{CommunityMemberRow, CommunityRow};
use crate::queries::OptionalExt;
use crate::{Database, DbError, Result};

impl Database {
    pub fn create_community(&self, id: &str, name: &str, description: Option<&str>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO communities (id, name, description) VALUES (?1, ?2, ?3)",
                (id, name, description),
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DbError::AlreadyExists {
                        entity: "community",
                        id: name.to_string(),
                    }
                } else {
                    e.into()
                }
            })?;
            Ok(())
        })
    }

    /// Communities the user belongs to, for the group-chat wizard.
    pub fn user_communities(&self, user_id: &str) -> Result<Vec<CommunityRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.description
                 FROM communities c
                 INNER JOIN memberships m ON m.community_id = c.id
                 WHERE m.user_id = ?1
                 ORDER BY c.name",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(CommunityRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn community_members(&self, community_id: &str) -> Result<Vec<CommunityMemberRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.avatar_url, u.email
                 FROM users u
                 INNER JOIN memberships m ON m.user_id = u.id
                 WHERE m.community_id = ?1
                 ORDER BY u.username",
            )?;

            let rows = stmt
                .query_map([community_id], |row| {
                    Ok(CommunityMemberRow {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        avatar_url: row.get(2)?,
                        email: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn join_community(&self, user_id: &str, community_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let exists: Option<i32> = conn
                .query_row(
                    "SELECT 1 FROM communities WHERE id = ?1",
                    [community_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(DbError::NotFound {
                    entity: "community",
                    id: community_id.to_string(),
                });
            }

            conn.execute(
                "INSERT INTO memberships (user_id, community_id) VALUES (?1, ?2)",
                (user_id, community_id),
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DbError::AlreadyExists {
                        entity: "membership",
                        id: format!("{user_id}/{community_id}"),
                    }
                } else {
                    e.into()
                }
            })?;
            Ok(())
        })
    }
}

pub(crate) fn is_member(conn: &Connection, user_id: &str, community_id: &str) -> Result<bool> {
    let hit: Option<i32> = conn
        .query_row(
            "SELECT 1 FROM memberships WHERE user_id = ?1 AND community_id = ?2",
            (user_id, community_id),
            |row| row.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{add_community, add_user, db, join};

    #[test]
    fn membership_drives_community_listing() {
        let db = db();
        let ada = add_user(&db, "ada");
        let rust = add_community(&db, "rustaceans");
        let zig = add_community(&db, "ziggurat");
        join(&db, &ada, &zig);
        join(&db, &ada, &rust);

        let mine = db.user_communities(&ada).unwrap();
        let names: Vec<_> = mine.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["rustaceans", "ziggurat"]);
    }

    #[test]
    fn joining_twice_conflicts() {
        let db = db();
        let ada = add_user(&db, "ada");
        let rust = add_community(&db, "rustaceans");
        join(&db, &ada, &rust);

        let err = db.join_community(&ada, &rust).unwrap_err();
        assert!(matches!(err, DbError::AlreadyExists { entity: "membership", .. }));
    }

    #[test]
    fn joining_missing_community_is_not_found() {
        let db = db();
        let ada = add_user(&db, "ada");
        let err = db.join_community(&ada, "nope").unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[test]
    fn roster_lists_members_only() {
        let db = db();
        let ada = add_user(&db, "ada");
        let grace = add_user(&db, "grace");
        add_user(&db, "outsider");
        let rust = add_community(&db, "rustaceans");
        join(&db, &ada, &rust);
        join(&db, &grace, &rust);

        let members = db.community_members(&rust).unwrap();
        let names: Vec<_> = members.iter().map(|m| m.username.as_str()).collect();
        assert_eq!(names, vec!["ada", "grace"]);
    }
}

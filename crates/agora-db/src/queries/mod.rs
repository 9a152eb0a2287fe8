pub mod communities;
pub mod conversations;
pub mod messages;
pub mod notifications;
pub mod participants;
pub mod users;

use crate::Result;

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use uuid::Uuid;

    use crate::Database;

    pub fn db() -> Database {
        Database::open_in_memory().expect("in-memory database")
    }

    pub fn add_user(db: &Database, username: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let email = format!("{username}@example.com");
        db.create_user(&id, &email, username, "argon2-hash")
            .expect("create user");
        id
    }

    pub fn add_community(db: &Database, name: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_community(&id, name, None).expect("create community");
        id
    }

    pub fn join(db: &Database, user_id: &str, community_id: &str) {
        db.join_community(user_id, community_id).expect("join community");
    }
}

use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                      TEXT PRIMARY KEY,
            email                   TEXT NOT NULL UNIQUE,
            username                TEXT NOT NULL UNIQUE,
            password                TEXT NOT NULL,
            role                    TEXT NOT NULL DEFAULT 'member',
            avatar_url              TEXT,
            notification_settings   TEXT,
            created_at              TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS communities (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            description TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS memberships (
            user_id      TEXT NOT NULL REFERENCES users(id),
            community_id TEXT NOT NULL REFERENCES communities(id),
            joined_at    TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(user_id, community_id)
        );

        CREATE INDEX IF NOT EXISTS idx_memberships_community
            ON memberships(community_id);

        CREATE TABLE IF NOT EXISTS conversations (
            id           TEXT PRIMARY KEY,
            kind         TEXT NOT NULL CHECK (kind IN ('direct', 'group')),
            community_id TEXT REFERENCES communities(id),
            name         TEXT,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- A departed participant keeps their row (left_at stamped); being
        -- re-added inserts a fresh row. The partial index caps it at one
        -- active row per (conversation, user).
        CREATE TABLE IF NOT EXISTS conversation_participants (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            user_id         TEXT NOT NULL REFERENCES users(id),
            role            TEXT NOT NULL DEFAULT 'member',
            joined_at       TEXT NOT NULL DEFAULT (datetime('now')),
            left_at         TEXT,
            last_read_at    TEXT
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_participants_active
            ON conversation_participants(conversation_id, user_id)
            WHERE left_at IS NULL;

        CREATE INDEX IF NOT EXISTS idx_participants_user
            ON conversation_participants(user_id);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            sender_id       TEXT NOT NULL REFERENCES users(id),
            content         TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);

        CREATE TABLE IF NOT EXISTS notifications (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL REFERENCES users(id),
            kind            TEXT NOT NULL,
            title           TEXT NOT NULL,
            message         TEXT NOT NULL,
            link            TEXT,
            community_id    TEXT REFERENCES communities(id),
            related_user_id TEXT REFERENCES users(id),
            is_read         INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

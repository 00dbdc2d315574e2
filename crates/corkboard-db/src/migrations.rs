use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub const GENERAL_CHANNEL_ID: &str = "00000000-0000-0000-0000-000000000001";

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS channels (
            id          TEXT PRIMARY KEY,
            world_id    TEXT,
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS user_roles (
            user_id     TEXT NOT NULL,
            role_id     TEXT NOT NULL,
            scope_id    TEXT NOT NULL,
            scope_kind  TEXT NOT NULL,
            PRIMARY KEY (user_id, role_id, scope_id, scope_kind)
        );

        CREATE INDEX IF NOT EXISTS idx_user_roles_scope
            ON user_roles(user_id, scope_id, scope_kind);

        CREATE TABLE IF NOT EXISTS sticky_note_folders (
            id          TEXT PRIMARY KEY,
            channel_id  TEXT NOT NULL REFERENCES channels(id),
            world_id    TEXT,
            parent_id   TEXT REFERENCES sticky_note_folders(id) ON DELETE SET NULL,
            name        TEXT NOT NULL,
            color       TEXT,
            creator_id  TEXT NOT NULL,
            order_index INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sticky_note_folders_channel
            ON sticky_note_folders(channel_id, order_index);

        CREATE TABLE IF NOT EXISTS sticky_notes (
            id              TEXT PRIMARY KEY,
            channel_id      TEXT NOT NULL REFERENCES channels(id),
            world_id        TEXT,
            folder_id       TEXT REFERENCES sticky_note_folders(id) ON DELETE SET NULL,
            title           TEXT NOT NULL DEFAULT '',
            content         TEXT NOT NULL DEFAULT '',
            content_text    TEXT NOT NULL DEFAULT '',
            color           TEXT NOT NULL,
            creator_id      TEXT NOT NULL,
            note_type       TEXT NOT NULL,
            type_data       TEXT NOT NULL DEFAULT 'null',
            visibility      TEXT NOT NULL,
            viewer_ids      TEXT,
            editor_ids      TEXT,
            x               REAL NOT NULL DEFAULT 0,
            y               REAL NOT NULL DEFAULT 0,
            width           REAL NOT NULL,
            height          REAL NOT NULL,
            pinned          INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sticky_notes_channel
            ON sticky_notes(channel_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_sticky_notes_folder
            ON sticky_notes(folder_id);

        CREATE TABLE IF NOT EXISTS sticky_note_user_states (
            id              TEXT PRIMARY KEY,
            note_id         TEXT NOT NULL REFERENCES sticky_notes(id) ON DELETE CASCADE,
            user_id         TEXT NOT NULL,
            is_open         INTEGER NOT NULL DEFAULT 0,
            last_opened_at  TEXT,
            x               REAL,
            y               REAL,
            width           REAL,
            height          REAL,
            minimized       INTEGER NOT NULL DEFAULT 0,
            z_index         INTEGER NOT NULL DEFAULT 0,
            updated_at      TEXT NOT NULL,
            UNIQUE(note_id, user_id)
        );

        -- Seed the default general channel
        INSERT OR IGNORE INTO channels (id, name)
            VALUES ('00000000-0000-0000-0000-000000000001', 'general');
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

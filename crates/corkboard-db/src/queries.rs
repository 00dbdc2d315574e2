use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use rusqlite::types::Value;
use tracing::{debug, info};
use uuid::Uuid;

use corkboard_types::api::{UpdateFolderRequest, UpdateStickyNoteRequest, UpdateStickyNoteStateRequest};
use corkboard_types::models::{Channel, StickyNote, StickyNoteFolder, StickyNoteUserState};

use crate::Database;
use crate::models::{
    CHANNEL_COLUMNS, FOLDER_COLUMNS, NOTE_COLUMNS, USER_STATE_COLUMNS, channel_from_row,
    folder_from_row, format_ts, ids_to_sql, note_from_row, user_state_from_row,
};
use crate::store::WriteOutcome;

impl Database {
    // -- Channels --

    pub fn create_channel(&self, id: Uuid, world_id: Option<Uuid>, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channels (id, world_id, name) VALUES (?1, ?2, ?3)",
                (id.to_string(), world_id.map(|w| w.to_string()), name),
            )?;
            Ok(())
        })
    }

    pub fn get_channel(&self, id: Uuid) -> Result<Option<Channel>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?1"),
                [id.to_string()],
                channel_from_row,
            )
            .optional()
        })
    }

    // -- Roles --

    pub fn assign_role(&self, user_id: Uuid, role_id: &str, scope_id: Uuid, scope_kind: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO user_roles (user_id, role_id, scope_id, scope_kind)
                 VALUES (?1, ?2, ?3, ?4)",
                (user_id.to_string(), role_id, scope_id.to_string(), scope_kind),
            )?;
            Ok(())
        })
    }

    pub fn list_role_ids(&self, user_id: Uuid, scope_id: Uuid, scope_kind: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT role_id FROM user_roles
                 WHERE user_id = ?1 AND scope_id = ?2 AND scope_kind = ?3",
            )?;
            let ids = stmt
                .query_map((user_id.to_string(), scope_id.to_string(), scope_kind), |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    // -- Sticky notes --

    pub fn insert_note(&self, note: &StickyNote) -> Result<WriteOutcome> {
        let type_data = serde_json::to_string(&note.type_data)?;
        self.with_conn(|conn| {
            if let Some(folder_id) = note.folder_id {
                if let Some(reason) = note_folder_rejection(conn, folder_id, &note.channel_id.to_string())? {
                    return Ok(WriteOutcome::Rejected(reason));
                }
            }
            conn.execute(
                &format!(
                    "INSERT INTO sticky_notes ({NOTE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                             ?15, ?16, ?17, ?18, ?19, ?20, ?21)"
                ),
                rusqlite::params![
                    note.id.to_string(),
                    note.channel_id.to_string(),
                    note.world_id.map(|w| w.to_string()),
                    note.folder_id.map(|f| f.to_string()),
                    note.title,
                    note.content,
                    note.content_text,
                    note.color,
                    note.creator_id.to_string(),
                    note.note_type,
                    type_data,
                    note.visibility.as_str(),
                    ids_to_sql(note.viewer_ids.as_deref()),
                    ids_to_sql(note.editor_ids.as_deref()),
                    note.x,
                    note.y,
                    note.width,
                    note.height,
                    note.pinned,
                    format_ts(note.created_at),
                    format_ts(note.updated_at),
                ],
            )?;
            Ok(WriteOutcome::Applied)
        })
    }

    pub fn get_note(&self, id: Uuid) -> Result<Option<StickyNote>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM sticky_notes WHERE id = ?1"),
                [id.to_string()],
                note_from_row,
            )
            .optional()
        })
    }

    pub fn list_notes(&self, channel_id: Uuid) -> Result<Vec<StickyNote>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTE_COLUMNS} FROM sticky_notes
                 WHERE channel_id = ?1
                 ORDER BY created_at ASC"
            ))?;
            let notes = stmt
                .query_map([channel_id.to_string()], note_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(notes)
        })
    }

    /// Applies only the supplied fields.
    pub fn update_note(
        &self,
        id: Uuid,
        patch: &UpdateStickyNoteRequest,
        updated_at: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        let mut set = Assignments::default();
        if let Some(folder_id) = patch.folder_id {
            set.push("folder_id", folder_id.map(|f| f.to_string()));
        }
        if let Some(title) = &patch.title {
            set.push("title", title.clone());
        }
        if let Some(content) = &patch.content {
            set.push("content", content.clone());
        }
        if let Some(content_text) = &patch.content_text {
            set.push("content_text", content_text.clone());
        }
        if let Some(color) = &patch.color {
            set.push("color", color.clone());
        }
        if let Some(note_type) = &patch.note_type {
            set.push("note_type", note_type.clone());
        }
        if let Some(type_data) = &patch.type_data {
            set.push("type_data", serde_json::to_string(type_data)?);
        }
        if let Some(visibility) = patch.visibility {
            set.push("visibility", visibility.as_str().to_string());
        }
        if let Some(viewer_ids) = &patch.viewer_ids {
            set.push("viewer_ids", ids_to_sql(viewer_ids.as_deref()));
        }
        if let Some(editor_ids) = &patch.editor_ids {
            set.push("editor_ids", ids_to_sql(editor_ids.as_deref()));
        }
        if let Some(x) = patch.x {
            set.push("x", x);
        }
        if let Some(y) = patch.y {
            set.push("y", y);
        }
        if let Some(width) = patch.width {
            set.push("width", width);
        }
        if let Some(height) = patch.height {
            set.push("height", height);
        }
        if let Some(pinned) = patch.pinned {
            set.push("pinned", pinned);
        }
        set.push("updated_at", format_ts(updated_at));

        self.with_conn(|conn| {
            let Some(channel_id) = channel_of(conn, "sticky_notes", id)? else {
                return Ok(WriteOutcome::Missing);
            };
            if let Some(Some(folder_id)) = patch.folder_id {
                if let Some(reason) = note_folder_rejection(conn, folder_id, &channel_id)? {
                    return Ok(WriteOutcome::Rejected(reason));
                }
            }
            let rows = set.execute(conn, "sticky_notes", &[("id", id)])?;
            Ok(if rows > 0 { WriteOutcome::Applied } else { WriteOutcome::Missing })
        })
    }

    pub fn delete_note(&self, id: Uuid, actor_id: Uuid) -> Result<bool> {
        let rows = self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM sticky_notes WHERE id = ?1", [id.to_string()])?)
        })?;
        if rows > 0 {
            info!("Sticky note {} deleted by {}", id, actor_id);
        }
        Ok(rows > 0)
    }

    // -- Folders --

    pub fn insert_folder(&self, folder: &StickyNoteFolder) -> Result<WriteOutcome> {
        self.with_conn(|conn| {
            if let Some(parent_id) = folder.parent_id {
                let channel_id = folder.channel_id.to_string();
                if let Some(reason) = parent_rejection(conn, folder.id, parent_id, &channel_id)? {
                    return Ok(WriteOutcome::Rejected(reason));
                }
            }
            conn.execute(
                &format!(
                    "INSERT INTO sticky_note_folders ({FOLDER_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                rusqlite::params![
                    folder.id.to_string(),
                    folder.channel_id.to_string(),
                    folder.world_id.map(|w| w.to_string()),
                    folder.parent_id.map(|p| p.to_string()),
                    folder.name,
                    folder.color,
                    folder.creator_id.to_string(),
                    folder.order_index,
                    format_ts(folder.created_at),
                    format_ts(folder.updated_at),
                ],
            )?;
            Ok(WriteOutcome::Applied)
        })
    }

    pub fn get_folder(&self, id: Uuid) -> Result<Option<StickyNoteFolder>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {FOLDER_COLUMNS} FROM sticky_note_folders WHERE id = ?1"),
                [id.to_string()],
                folder_from_row,
            )
            .optional()
        })
    }

    pub fn list_folders(&self, channel_id: Uuid) -> Result<Vec<StickyNoteFolder>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FOLDER_COLUMNS} FROM sticky_note_folders
                 WHERE channel_id = ?1
                 ORDER BY order_index ASC, created_at ASC"
            ))?;
            let folders = stmt
                .query_map([channel_id.to_string()], folder_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(folders)
        })
    }

    pub fn update_folder(
        &self,
        id: Uuid,
        patch: &UpdateFolderRequest,
        updated_at: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        let mut set = Assignments::default();
        if let Some(name) = &patch.name {
            set.push("name", name.clone());
        }
        if let Some(parent_id) = patch.parent_id {
            set.push("parent_id", parent_id.map(|p| p.to_string()));
        }
        if let Some(color) = &patch.color {
            set.push("color", color.clone());
        }
        if let Some(order_index) = patch.order_index {
            set.push("order_index", order_index);
        }
        set.push("updated_at", format_ts(updated_at));

        self.with_conn(|conn| {
            let Some(channel_id) = channel_of(conn, "sticky_note_folders", id)? else {
                return Ok(WriteOutcome::Missing);
            };
            if let Some(Some(parent_id)) = patch.parent_id {
                if let Some(reason) = parent_rejection(conn, id, parent_id, &channel_id)? {
                    return Ok(WriteOutcome::Rejected(reason));
                }
            }
            let rows = set.execute(conn, "sticky_note_folders", &[("id", id)])?;
            Ok(if rows > 0 { WriteOutcome::Applied } else { WriteOutcome::Missing })
        })
    }

    /// Detaches the folder's notes, re-parents its children to its own
    /// parent and deletes it, in one transaction. Returns the number of
    /// notes detached, or `None` if the folder does not exist.
    pub fn delete_folder(&self, id: Uuid, actor_id: Uuid) -> Result<Option<usize>> {
        let detached = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let parent: Option<Option<String>> = tx
                .query_row(
                    "SELECT parent_id FROM sticky_note_folders WHERE id = ?1",
                    [id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(parent) = parent else {
                return Ok(None);
            };

            let detached = clear_folder_reference(&tx, id)?;
            tx.execute(
                "UPDATE sticky_note_folders SET parent_id = ?1 WHERE parent_id = ?2",
                (parent, id.to_string()),
            )?;
            tx.execute("DELETE FROM sticky_note_folders WHERE id = ?1", [id.to_string()])?;
            tx.commit()?;
            Ok(Some(detached))
        })?;

        if detached.is_some() {
            info!("Sticky note folder {} deleted by {}", id, actor_id);
        }
        Ok(detached)
    }

    // -- Per-user note state --

    pub fn get_user_state(&self, note_id: Uuid, user_id: Uuid) -> Result<Option<StickyNoteUserState>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {USER_STATE_COLUMNS} FROM sticky_note_user_states
                     WHERE note_id = ?1 AND user_id = ?2"
                ),
                (note_id.to_string(), user_id.to_string()),
                user_state_from_row,
            )
            .optional()
        })
    }

    /// Inserts the row unless one already exists for `(note_id, user_id)`.
    /// Returns true if this call created it.
    pub fn insert_user_state(&self, state: &StickyNoteUserState) -> Result<bool> {
        let rows = self.with_conn(|conn| {
            Ok(conn.execute(
                &format!(
                    "INSERT INTO sticky_note_user_states ({USER_STATE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                     ON CONFLICT(note_id, user_id) DO NOTHING"
                ),
                rusqlite::params![
                    state.id.to_string(),
                    state.note_id.to_string(),
                    state.user_id.to_string(),
                    state.is_open,
                    state.last_opened_at.map(format_ts),
                    state.x,
                    state.y,
                    state.width,
                    state.height,
                    state.minimized,
                    state.z_index,
                    format_ts(state.updated_at),
                ],
            )?)
        })?;
        Ok(rows > 0)
    }

    pub fn update_user_state(
        &self,
        note_id: Uuid,
        user_id: Uuid,
        patch: &UpdateStickyNoteStateRequest,
        opened_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut set = Assignments::default();
        if let Some(is_open) = patch.is_open {
            set.push("is_open", is_open);
        }
        if let Some(opened_at) = opened_at {
            set.push("last_opened_at", format_ts(opened_at));
        }
        if let Some(x) = patch.x {
            set.push("x", x);
        }
        if let Some(y) = patch.y {
            set.push("y", y);
        }
        if let Some(width) = patch.width {
            set.push("width", width);
        }
        if let Some(height) = patch.height {
            set.push("height", height);
        }
        if let Some(minimized) = patch.minimized {
            set.push("minimized", minimized);
        }
        if let Some(z_index) = patch.z_index {
            set.push("z_index", z_index);
        }
        set.push("updated_at", format_ts(updated_at));

        let rows = self.with_conn(|conn| {
            set.execute(
                conn,
                "sticky_note_user_states",
                &[("note_id", note_id), ("user_id", user_id)],
            )
        })?;
        Ok(rows > 0)
    }
}

/// Detach every note from `folder_id`. Returns the number of notes touched.
fn clear_folder_reference(conn: &Connection, folder_id: Uuid) -> Result<usize> {
    let rows = conn.execute(
        "UPDATE sticky_notes SET folder_id = NULL, updated_at = ?1 WHERE folder_id = ?2",
        (format_ts(Utc::now()), folder_id.to_string()),
    )?;
    debug!("Cleared folder {} from {} sticky notes", folder_id, rows);
    Ok(rows)
}

/// Stored `channel_id` of a row in `table`, or `None` if there is no such row.
fn channel_of(conn: &Connection, table: &str, id: Uuid) -> Result<Option<String>> {
    conn.query_row(
        &format!("SELECT channel_id FROM {table} WHERE id = ?1"),
        [id.to_string()],
        |row| row.get(0),
    )
    .optional()
}

/// Why a note in `channel_id` may not be filed under `folder_id`.
fn note_folder_rejection(conn: &Connection, folder_id: Uuid, channel_id: &str) -> Result<Option<&'static str>> {
    Ok(match channel_of(conn, "sticky_note_folders", folder_id)? {
        None => Some("folder does not exist"),
        Some(folder_channel) if folder_channel != channel_id => Some("folder belongs to another channel"),
        Some(_) => None,
    })
}

/// Why `parent_id` may not become the parent of `folder_id`.
fn parent_rejection(
    conn: &Connection,
    folder_id: Uuid,
    parent_id: Uuid,
    channel_id: &str,
) -> Result<Option<&'static str>> {
    if parent_id == folder_id {
        return Ok(Some("a folder cannot be its own parent"));
    }
    match channel_of(conn, "sticky_note_folders", parent_id)? {
        None => return Ok(Some("parent folder does not exist")),
        Some(parent_channel) if parent_channel != channel_id => {
            return Ok(Some("parent folder belongs to another channel"));
        }
        Some(_) => {}
    }

    // Walk up from the new parent. Reaching `folder_id` would close a cycle.
    let target = folder_id.to_string();
    let mut seen = HashSet::new();
    let mut cursor = Some(parent_id.to_string());
    while let Some(current) = cursor {
        if current == target {
            return Ok(Some("a folder cannot be moved under its own descendant"));
        }
        if !seen.insert(current.clone()) {
            break;
        }
        cursor = conn
            .query_row(
                "SELECT parent_id FROM sticky_note_folders WHERE id = ?1",
                [current.as_str()],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten();
    }
    Ok(None)
}

/// Column assignments for a partial UPDATE, built from the supplied fields.
#[derive(Default)]
struct Assignments {
    columns: Vec<&'static str>,
    values: Vec<Value>,
}

impl Assignments {
    fn push(&mut self, column: &'static str, value: impl Into<Value>) {
        self.columns.push(column);
        self.values.push(value.into());
    }

    fn execute(self, conn: &Connection, table: &str, keys: &[(&str, Uuid)]) -> Result<usize> {
        let set_clause = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let where_clause = keys
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", column, self.columns.len() + i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");

        let sql = format!("UPDATE {} SET {} WHERE {}", table, set_clause, where_clause);
        let mut values = self.values;
        values.extend(keys.iter().map(|(_, id)| Value::Text(id.to_string())));

        Ok(conn.execute(&sql, rusqlite::params_from_iter(values))?)
    }
}

/// Extension trait for optional query results
trait OptionalExt<T> {
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

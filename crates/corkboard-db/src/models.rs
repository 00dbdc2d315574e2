//! Row decoding. Ids and timestamps are stored as TEXT, id lists and
//! type payloads as JSON TEXT.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use corkboard_types::models::{
    Channel, StickyNote, StickyNoteFolder, StickyNoteUserState, Visibility,
};

pub const CHANNEL_COLUMNS: &str = "id, world_id, name, created_at";

pub const NOTE_COLUMNS: &str = "id, channel_id, world_id, folder_id, title, content, content_text, \
     color, creator_id, note_type, type_data, visibility, viewer_ids, editor_ids, \
     x, y, width, height, pinned, created_at, updated_at";

pub const FOLDER_COLUMNS: &str = "id, channel_id, world_id, parent_id, name, color, creator_id, \
     order_index, created_at, updated_at";

pub const USER_STATE_COLUMNS: &str = "id, note_id, user_id, is_open, last_opened_at, x, y, width, \
     height, minimized, z_index, updated_at";

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_uuid(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone: "YYYY-MM-DD HH:MM:SS", UTC.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| conversion_error(idx, e))
}

fn uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    parse_uuid(idx, &row.get::<_, String>(idx)?)
}

fn opt_uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| parse_uuid(idx, &raw))
        .transpose()
}

fn ts_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    parse_ts(idx, &row.get::<_, String>(idx)?)
}

fn opt_ts_at(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| parse_ts(idx, &raw))
        .transpose()
}

fn opt_ids_at(row: &Row, idx: usize) -> rusqlite::Result<Option<Vec<Uuid>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn ids_to_sql(ids: Option<&[Uuid]>) -> Option<String> {
    // Vec<Uuid> serialization cannot fail.
    ids.map(|ids| serde_json::to_string(ids).unwrap_or_else(|_| "[]".into()))
}

pub(crate) fn channel_from_row(row: &Row) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: uuid_at(row, 0)?,
        world_id: opt_uuid_at(row, 1)?,
        name: row.get(2)?,
        created_at: ts_at(row, 3)?,
    })
}

pub(crate) fn note_from_row(row: &Row) -> rusqlite::Result<StickyNote> {
    let type_data: String = row.get(10)?;
    let visibility: String = row.get(11)?;

    Ok(StickyNote {
        id: uuid_at(row, 0)?,
        channel_id: uuid_at(row, 1)?,
        world_id: opt_uuid_at(row, 2)?,
        folder_id: opt_uuid_at(row, 3)?,
        title: row.get(4)?,
        content: row.get(5)?,
        content_text: row.get(6)?,
        color: row.get(7)?,
        creator_id: uuid_at(row, 8)?,
        note_type: row.get(9)?,
        type_data: serde_json::from_str(&type_data).map_err(|e| conversion_error(10, e))?,
        visibility: Visibility::parse(&visibility).unwrap_or_default(),
        viewer_ids: opt_ids_at(row, 12)?,
        editor_ids: opt_ids_at(row, 13)?,
        x: row.get(14)?,
        y: row.get(15)?,
        width: row.get(16)?,
        height: row.get(17)?,
        pinned: row.get(18)?,
        created_at: ts_at(row, 19)?,
        updated_at: ts_at(row, 20)?,
        creator: None,
    })
}

pub(crate) fn folder_from_row(row: &Row) -> rusqlite::Result<StickyNoteFolder> {
    Ok(StickyNoteFolder {
        id: uuid_at(row, 0)?,
        channel_id: uuid_at(row, 1)?,
        world_id: opt_uuid_at(row, 2)?,
        parent_id: opt_uuid_at(row, 3)?,
        name: row.get(4)?,
        color: row.get(5)?,
        creator_id: uuid_at(row, 6)?,
        order_index: row.get(7)?,
        created_at: ts_at(row, 8)?,
        updated_at: ts_at(row, 9)?,
    })
}

pub(crate) fn user_state_from_row(row: &Row) -> rusqlite::Result<StickyNoteUserState> {
    Ok(StickyNoteUserState {
        id: uuid_at(row, 0)?,
        note_id: uuid_at(row, 1)?,
        user_id: uuid_at(row, 2)?,
        is_open: row.get(3)?,
        last_opened_at: opt_ts_at(row, 4)?,
        x: row.get(5)?,
        y: row.get(6)?,
        width: row.get(7)?,
        height: row.get(8)?,
        minimized: row.get(9)?,
        z_index: row.get(10)?,
        updated_at: ts_at(row, 11)?,
    })
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_NOTE_COLOR: &str = "yellow";
pub const DEFAULT_NOTE_TYPE: &str = "text";
pub const DEFAULT_NOTE_WIDTH: f64 = 300.0;
pub const DEFAULT_NOTE_HEIGHT: f64 = 250.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    /// World (server/guild) the channel belongs to, if any.
    pub world_id: Option<Uuid>,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Who may see a note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    All,
    Private,
    /// Restricted to the note's explicit viewer/editor lists.
    Custom,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Private => "private",
            Self::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "private" => Some(Self::Private),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickyNote {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub world_id: Option<Uuid>,
    pub folder_id: Option<Uuid>,
    pub title: String,
    /// Rich content as authored by the client.
    pub content: String,
    /// Plain-text mirror of `content`, used for previews and search.
    pub content_text: String,
    pub color: String,
    pub creator_id: Uuid,
    pub note_type: String,
    /// Opaque, type-specific payload (checklist items, embeds, ...).
    pub type_data: serde_json::Value,
    pub visibility: Visibility,
    pub viewer_ids: Option<Vec<Uuid>>,
    pub editor_ids: Option<Vec<Uuid>>,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Creator profile, attached in memory for responses. Never stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<UserProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickyNoteFolder {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub world_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub color: Option<String>,
    pub creator_id: Uuid,
    pub order_index: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-user window state for a note. Private to the viewing user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickyNoteUserState {
    pub id: Uuid,
    pub note_id: Uuid,
    pub user_id: Uuid,
    pub is_open: bool,
    pub last_opened_at: Option<DateTime<Utc>>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub minimized: bool,
    pub z_index: i64,
    pub updated_at: DateTime<Utc>,
}

impl StickyNoteUserState {
    /// A closed, unplaced state for `(note_id, user_id)` with a fresh id.
    pub fn new(note_id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            note_id,
            user_id,
            is_open: false,
            last_opened_at: None,
            x: None,
            y: None,
            width: None,
            height: None,
            minimized: false,
            z_index: 0,
            updated_at: now,
        }
    }
}

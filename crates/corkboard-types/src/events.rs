use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{
    CreateStickyNoteRequest, UpdateStickyNoteRequest, UpdateStickyNoteStateRequest,
};
use crate::models::{Channel, StickyNote, StickyNoteFolder};

/// What happened to a sticky note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StickyNoteAction {
    Create,
    Update,
    Delete,
    Push,
}

/// Identity of an entity that no longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedEntity {
    pub id: Uuid,
    pub channel_id: Uuid,
}

/// Either the full note or, for deletions, only its id and channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NoteRef {
    Full(Box<StickyNote>),
    Removed(RemovedEntity),
}

impl NoteRef {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Full(note) => note.id,
            Self::Removed(stub) => stub.id,
        }
    }

    pub fn channel_id(&self) -> Uuid {
        match self {
            Self::Full(note) => note.channel_id,
            Self::Removed(stub) => stub.channel_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StickyNotePayload {
    pub action: StickyNoteAction,
    pub note: NoteRef,
    /// Recipients of a push. Only present for `push`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FolderRef {
    Full(Box<StickyNoteFolder>),
    Removed(RemovedEntity),
}

impl FolderRef {
    pub fn channel_id(&self) -> Uuid {
        match self {
            Self::Full(folder) => folder.channel_id,
            Self::Removed(stub) => stub.channel_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StickyNoteFolderPayload {
    pub action: StickyNoteAction,
    pub folder: FolderRef,
}

/// Events sent over the WebSocket gateway. Each kind carries exactly one payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is registered
    Ready {
        user_id: Uuid,
        username: String,
        connection_id: Uuid,
    },

    /// A new message was posted
    MessageCreate {
        id: Uuid,
        channel_id: Uuid,
        author_id: Uuid,
        author_username: String,
        content: String,
    },

    /// A user started typing
    TypingStart {
        channel_id: Uuid,
        user_id: Uuid,
        username: String,
    },

    /// A user came online or went offline
    PresenceUpdate {
        user_id: Uuid,
        username: String,
        online: bool,
    },

    /// Channel metadata changed
    ChannelUpdate { channel: Channel },

    /// Channels of a world were reordered
    ChannelReorder {
        world_id: Uuid,
        channel_ids: Vec<Uuid>,
    },

    StickyNoteCreate(StickyNotePayload),
    StickyNoteUpdate(StickyNotePayload),
    StickyNoteDelete(StickyNotePayload),
    StickyNotePush(StickyNotePayload),

    StickyNoteFolderCreate(StickyNoteFolderPayload),
    StickyNoteFolderUpdate(StickyNoteFolderPayload),
    StickyNoteFolderDelete(StickyNoteFolderPayload),
}

impl GatewayEvent {
    pub fn sticky_note_created(note: StickyNote) -> Self {
        Self::StickyNoteCreate(StickyNotePayload {
            action: StickyNoteAction::Create,
            note: NoteRef::Full(Box::new(note)),
            target_user_ids: None,
        })
    }

    pub fn sticky_note_updated(note: StickyNote) -> Self {
        Self::StickyNoteUpdate(StickyNotePayload {
            action: StickyNoteAction::Update,
            note: NoteRef::Full(Box::new(note)),
            target_user_ids: None,
        })
    }

    pub fn sticky_note_deleted(id: Uuid, channel_id: Uuid) -> Self {
        Self::StickyNoteDelete(StickyNotePayload {
            action: StickyNoteAction::Delete,
            note: NoteRef::Removed(RemovedEntity { id, channel_id }),
            target_user_ids: None,
        })
    }

    pub fn sticky_note_pushed(note: StickyNote, target_user_ids: Vec<Uuid>) -> Self {
        Self::StickyNotePush(StickyNotePayload {
            action: StickyNoteAction::Push,
            note: NoteRef::Full(Box::new(note)),
            target_user_ids: Some(target_user_ids),
        })
    }

    pub fn folder_created(folder: StickyNoteFolder) -> Self {
        Self::StickyNoteFolderCreate(StickyNoteFolderPayload {
            action: StickyNoteAction::Create,
            folder: FolderRef::Full(Box::new(folder)),
        })
    }

    pub fn folder_updated(folder: StickyNoteFolder) -> Self {
        Self::StickyNoteFolderUpdate(StickyNoteFolderPayload {
            action: StickyNoteAction::Update,
            folder: FolderRef::Full(Box::new(folder)),
        })
    }

    pub fn folder_deleted(id: Uuid, channel_id: Uuid) -> Self {
        Self::StickyNoteFolderDelete(StickyNoteFolderPayload {
            action: StickyNoteAction::Delete,
            folder: FolderRef::Removed(RemovedEntity { id, channel_id }),
        })
    }

    /// Returns the channel_id if this event is scoped to a specific channel.
    /// Events that return `None` are global.
    pub fn channel_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { channel_id, .. } => Some(*channel_id),
            Self::TypingStart { channel_id, .. } => Some(*channel_id),
            Self::ChannelUpdate { channel } => Some(channel.id),
            Self::StickyNoteCreate(p)
            | Self::StickyNoteUpdate(p)
            | Self::StickyNoteDelete(p)
            | Self::StickyNotePush(p) => Some(p.note.channel_id()),
            Self::StickyNoteFolderCreate(p)
            | Self::StickyNoteFolderUpdate(p)
            | Self::StickyNoteFolderDelete(p) => Some(p.folder.channel_id()),
            // Ready, PresenceUpdate, ChannelReorder are global
            _ => None,
        }
    }

    /// Wire name of the event kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "Ready",
            Self::MessageCreate { .. } => "MessageCreate",
            Self::TypingStart { .. } => "TypingStart",
            Self::PresenceUpdate { .. } => "PresenceUpdate",
            Self::ChannelUpdate { .. } => "ChannelUpdate",
            Self::ChannelReorder { .. } => "ChannelReorder",
            Self::StickyNoteCreate(_) => "StickyNoteCreate",
            Self::StickyNoteUpdate(_) => "StickyNoteUpdate",
            Self::StickyNoteDelete(_) => "StickyNoteDelete",
            Self::StickyNotePush(_) => "StickyNotePush",
            Self::StickyNoteFolderCreate(_) => "StickyNoteFolderCreate",
            Self::StickyNoteFolderUpdate(_) => "StickyNoteFolderUpdate",
            Self::StickyNoteFolderDelete(_) => "StickyNoteFolderDelete",
        }
    }
}

/// A dispatched event: kind + payload, stamped with time and channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub event: GatewayEvent,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<Uuid>,
}

impl Envelope {
    /// Channel reference derived from the event itself.
    pub fn new(event: GatewayEvent) -> Self {
        let channel_id = event.channel_id();
        Self {
            event,
            timestamp: Utc::now(),
            channel_id,
        }
    }

    pub fn for_channel(channel_id: Uuid, event: GatewayEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
            channel_id: Some(channel_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyError {
    pub code: String,
    pub message: String,
}

/// Response to a client command that carried a `request_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReplyError>,
}

impl Reply {
    pub fn ok(request_id: Option<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            request_id,
            ok: true,
            data,
            error: None,
        }
    }

    pub fn error(request_id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            request_id,
            ok: false,
            data: None,
            error: Some(ReplyError {
                code: code.to_string(),
                message: message.into(),
            }),
        }
    }
}

/// Outer frame written to the socket. The `op` tag is the opcode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "d")]
pub enum Frame {
    Dispatch(Envelope),
    Reply(Reply),
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Set (or clear) the channel this connection is viewing.
    /// Channel-scoped events are only delivered for the viewed channel.
    ViewChannel { channel_id: Option<Uuid> },

    /// Indicate typing in a channel
    StartTyping { channel_id: Uuid },

    StickyNoteCreate {
        channel_id: Uuid,
        #[serde(default)]
        note: CreateStickyNoteRequest,
    },

    StickyNoteUpdate {
        note_id: Uuid,
        #[serde(default)]
        patch: UpdateStickyNoteRequest,
    },

    StickyNoteDelete { note_id: Uuid },

    StickyNotePush {
        note_id: Uuid,
        #[serde(default)]
        target_user_ids: Vec<Uuid>,
    },

    StickyNoteStateUpdate {
        note_id: Uuid,
        #[serde(default)]
        state: UpdateStickyNoteStateRequest,
    },
}

/// A command plus the optional correlation id echoed back in its `Reply`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub command: GatewayCommand,
}

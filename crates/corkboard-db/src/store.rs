//! Persistence seams consumed by the gateway. `Database` is the production
//! implementation; anything else (a test double, another backend) plugs in
//! behind the same traits.

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use corkboard_types::api::{UpdateFolderRequest, UpdateStickyNoteRequest, UpdateStickyNoteStateRequest};
use corkboard_types::models::{Channel, StickyNote, StickyNoteFolder, StickyNoteUserState};

use crate::Database;

/// Result of a write that is checked against the folders it references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The row being updated does not exist.
    Missing,
    /// A referenced folder cannot be used; the reason is user-facing.
    Rejected(&'static str),
}

pub trait RoleLookup: Send + Sync {
    /// Role ids held by `user_id` within `(scope_id, scope_kind)`.
    fn list_role_ids(&self, user_id: Uuid, scope_id: Uuid, scope_kind: &str) -> Result<Vec<String>>;
}

pub trait StickyNoteStore: RoleLookup {
    fn get_channel(&self, id: Uuid) -> Result<Option<Channel>>;

    /// Rejected when `folder_id` names a folder outside the note's channel.
    fn create_note(&self, note: &StickyNote) -> Result<WriteOutcome>;
    fn get_note(&self, id: Uuid) -> Result<Option<StickyNote>>;
    fn list_notes(&self, channel_id: Uuid) -> Result<Vec<StickyNote>>;
    /// Partial update. A new `folder_id` is checked in the same critical
    /// section as the write.
    fn update_note(
        &self,
        id: Uuid,
        patch: &UpdateStickyNoteRequest,
        updated_at: DateTime<Utc>,
    ) -> Result<WriteOutcome>;
    fn delete_note(&self, id: Uuid, actor_id: Uuid) -> Result<bool>;

    /// Rejected when `parent_id` names a folder outside the channel.
    fn create_folder(&self, folder: &StickyNoteFolder) -> Result<WriteOutcome>;
    fn get_folder(&self, id: Uuid) -> Result<Option<StickyNoteFolder>>;
    fn list_folders(&self, channel_id: Uuid) -> Result<Vec<StickyNoteFolder>>;
    /// Rejected when the new parent is outside the channel or a descendant.
    fn update_folder(
        &self,
        id: Uuid,
        patch: &UpdateFolderRequest,
        updated_at: DateTime<Utc>,
    ) -> Result<WriteOutcome>;
    /// Clear the folder reference on its notes, re-parent its children and
    /// delete it, all in one transaction. `None` when the folder is missing,
    /// otherwise the number of notes detached.
    fn delete_folder(&self, id: Uuid, actor_id: Uuid) -> Result<Option<usize>>;

    fn get_user_state(&self, note_id: Uuid, user_id: Uuid) -> Result<Option<StickyNoteUserState>>;
    /// Insert-if-absent keyed by `(note_id, user_id)`.
    fn create_user_state(&self, state: &StickyNoteUserState) -> Result<bool>;
    fn update_user_state(
        &self,
        note_id: Uuid,
        user_id: Uuid,
        patch: &UpdateStickyNoteStateRequest,
        opened_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<bool>;
}

impl RoleLookup for Database {
    fn list_role_ids(&self, user_id: Uuid, scope_id: Uuid, scope_kind: &str) -> Result<Vec<String>> {
        Database::list_role_ids(self, user_id, scope_id, scope_kind)
    }
}

impl StickyNoteStore for Database {
    fn get_channel(&self, id: Uuid) -> Result<Option<Channel>> {
        Database::get_channel(self, id)
    }

    fn create_note(&self, note: &StickyNote) -> Result<WriteOutcome> {
        self.insert_note(note)
    }

    fn get_note(&self, id: Uuid) -> Result<Option<StickyNote>> {
        Database::get_note(self, id)
    }

    fn list_notes(&self, channel_id: Uuid) -> Result<Vec<StickyNote>> {
        Database::list_notes(self, channel_id)
    }

    fn update_note(
        &self,
        id: Uuid,
        patch: &UpdateStickyNoteRequest,
        updated_at: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        Database::update_note(self, id, patch, updated_at)
    }

    fn delete_note(&self, id: Uuid, actor_id: Uuid) -> Result<bool> {
        Database::delete_note(self, id, actor_id)
    }

    fn create_folder(&self, folder: &StickyNoteFolder) -> Result<WriteOutcome> {
        self.insert_folder(folder)
    }

    fn get_folder(&self, id: Uuid) -> Result<Option<StickyNoteFolder>> {
        Database::get_folder(self, id)
    }

    fn list_folders(&self, channel_id: Uuid) -> Result<Vec<StickyNoteFolder>> {
        Database::list_folders(self, channel_id)
    }

    fn update_folder(
        &self,
        id: Uuid,
        patch: &UpdateFolderRequest,
        updated_at: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        Database::update_folder(self, id, patch, updated_at)
    }

    fn delete_folder(&self, id: Uuid, actor_id: Uuid) -> Result<Option<usize>> {
        Database::delete_folder(self, id, actor_id)
    }

    fn get_user_state(&self, note_id: Uuid, user_id: Uuid) -> Result<Option<StickyNoteUserState>> {
        Database::get_user_state(self, note_id, user_id)
    }

    fn create_user_state(&self, state: &StickyNoteUserState) -> Result<bool> {
        self.insert_user_state(state)
    }

    fn update_user_state(
        &self,
        note_id: Uuid,
        user_id: Uuid,
        patch: &UpdateStickyNoteStateRequest,
        opened_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        Database::update_user_state(self, note_id, user_id, patch, opened_at, updated_at)
    }
}

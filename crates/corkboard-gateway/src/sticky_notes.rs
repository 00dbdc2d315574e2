//! Sticky-note and folder operations shared by the REST handlers and the
//! gateway command loop. Every mutation persists first, then enqueues its
//! broadcast; the caller never waits on delivery.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use corkboard_db::{StickyNoteStore, WriteOutcome};
use corkboard_types::api::{
    CreateFolderRequest, CreateStickyNoteRequest, PushStickyNoteResponse, UpdateFolderRequest,
    UpdateStickyNoteRequest, UpdateStickyNoteStateRequest,
};
use corkboard_types::events::GatewayEvent;
use corkboard_types::models::{
    DEFAULT_NOTE_COLOR, DEFAULT_NOTE_HEIGHT, DEFAULT_NOTE_TYPE, DEFAULT_NOTE_WIDTH, StickyNote,
    StickyNoteFolder, StickyNoteUserState, UserProfile,
};

use crate::broadcast::Broadcaster;
use crate::error::NoteError;
use crate::permissions::{can_delete_note, can_manage};

/// The authenticated user performing an operation.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: Uuid,
    pub username: String,
}

impl Actor {
    pub fn new(user_id: Uuid, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }

    fn ensure(&self) -> Result<Uuid, NoteError> {
        if self.user_id.is_nil() {
            return Err(NoteError::Unauthorized);
        }
        Ok(self.user_id)
    }

    fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.user_id,
            username: self.username.clone(),
        }
    }
}

#[derive(Clone)]
pub struct StickyNoteService {
    store: Arc<dyn StickyNoteStore>,
    broadcaster: Broadcaster,
}

impl StickyNoteService {
    pub fn new(store: Arc<dyn StickyNoteStore>, broadcaster: Broadcaster) -> Self {
        Self { store, broadcaster }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Run store work off the async runtime.
    async fn blocking<T, F>(&self, work: F) -> Result<T, NoteError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn StickyNoteStore) -> Result<T, NoteError> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || work(store.as_ref()))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                NoteError::Storage(anyhow::anyhow!("store task failed: {e}"))
            })?
    }

    // -- Notes --

    pub async fn list_notes(&self, actor: &Actor, channel_id: Uuid) -> Result<Vec<StickyNote>, NoteError> {
        actor.ensure()?;
        self.blocking(move |store| Ok(store.list_notes(channel_id)?)).await
    }

    pub async fn get_note(&self, actor: &Actor, note_id: Uuid) -> Result<StickyNote, NoteError> {
        actor.ensure()?;
        self.blocking(move |store| store.get_note(note_id)?.ok_or(NoteError::NotFound("sticky note")))
            .await
    }

    /// Create a note in `channel_id`. Any authenticated user may create.
    pub async fn create_note(
        &self,
        actor: &Actor,
        channel_id: Uuid,
        req: CreateStickyNoteRequest,
    ) -> Result<StickyNote, NoteError> {
        let creator_id = actor.ensure()?;

        let mut note = self
            .blocking(move |store| {
                let channel = store.get_channel(channel_id)?.ok_or(NoteError::NotFound("channel"))?;
                let now = Utc::now();
                let note = StickyNote {
                    id: Uuid::new_v4(),
                    channel_id,
                    world_id: channel.world_id,
                    folder_id: req.folder_id,
                    title: req.title.unwrap_or_default(),
                    content: req.content.unwrap_or_default(),
                    content_text: req.content_text.unwrap_or_default(),
                    color: req.color.unwrap_or_else(|| DEFAULT_NOTE_COLOR.to_string()),
                    creator_id,
                    note_type: req.note_type.unwrap_or_else(|| DEFAULT_NOTE_TYPE.to_string()),
                    type_data: req.type_data.unwrap_or(serde_json::Value::Null),
                    visibility: req.visibility.unwrap_or_default(),
                    viewer_ids: req.viewer_ids,
                    editor_ids: req.editor_ids,
                    x: req.x.unwrap_or(0.0),
                    y: req.y.unwrap_or(0.0),
                    width: req.width.filter(|w| *w > 0.0).unwrap_or(DEFAULT_NOTE_WIDTH),
                    height: req.height.filter(|h| *h > 0.0).unwrap_or(DEFAULT_NOTE_HEIGHT),
                    pinned: req.pinned.unwrap_or(false),
                    created_at: now,
                    updated_at: now,
                    creator: None,
                };
                applied(store.create_note(&note)?, "sticky note")?;
                Ok(note)
            })
            .await?;
        note.creator = Some(actor.profile());

        info!("{} created sticky note {} in {}", actor.username, note.id, channel_id);
        self.broadcaster
            .broadcast_to_channel(channel_id, GatewayEvent::sticky_note_created(note.clone()));
        Ok(note)
    }

    /// Apply a partial update. Only supplied fields change.
    pub async fn update_note(
        &self,
        actor: &Actor,
        note_id: Uuid,
        patch: UpdateStickyNoteRequest,
    ) -> Result<StickyNote, NoteError> {
        actor.ensure()?;
        if !patch.width.is_none_or(positive) || !patch.height.is_none_or(positive) {
            return Err(NoteError::InvalidInput("width and height must be positive".into()));
        }

        let note = self
            .blocking(move |store| {
                applied(store.update_note(note_id, &patch, Utc::now())?, "sticky note")?;
                store.get_note(note_id)?.ok_or(NoteError::NotFound("sticky note"))
            })
            .await?;

        self.broadcaster
            .broadcast_to_channel(note.channel_id, GatewayEvent::sticky_note_updated(note.clone()));
        Ok(note)
    }

    /// Delete a note. Allowed for its creator and channel owners/admins.
    pub async fn delete_note(&self, actor: &Actor, note_id: Uuid) -> Result<(), NoteError> {
        let user_id = actor.ensure()?;

        let channel_id = self
            .blocking(move |store| {
                let note = store.get_note(note_id)?.ok_or(NoteError::NotFound("sticky note"))?;
                if !can_delete_note(store, user_id, note.channel_id, Some(note.creator_id))? {
                    return Err(NoteError::Forbidden(
                        "only the creator or a channel owner or admin may delete this note",
                    ));
                }
                if !store.delete_note(note_id, user_id)? {
                    return Err(NoteError::NotFound("sticky note"));
                }
                Ok(note.channel_id)
            })
            .await?;

        info!("{} deleted sticky note {}", actor.username, note_id);
        self.broadcaster
            .broadcast_to_channel(channel_id, GatewayEvent::sticky_note_deleted(note_id, channel_id));
        Ok(())
    }

    /// Surface a note on the screens of `target_user_ids`. Nothing is stored.
    pub async fn push_note(
        &self,
        actor: &Actor,
        note_id: Uuid,
        target_user_ids: Vec<Uuid>,
    ) -> Result<PushStickyNoteResponse, NoteError> {
        actor.ensure()?;
        if target_user_ids.is_empty() {
            return Err(NoteError::InvalidInput("target_user_ids must not be empty".into()));
        }

        let note = self
            .blocking(move |store| store.get_note(note_id)?.ok_or(NoteError::NotFound("sticky note")))
            .await?;

        info!(
            "{} pushed sticky note {} to {} user(s)",
            actor.username,
            note_id,
            target_user_ids.len()
        );
        self.broadcaster.broadcast_to_users(
            &target_user_ids,
            GatewayEvent::sticky_note_pushed(note, target_user_ids.clone()),
        );
        Ok(PushStickyNoteResponse {
            note_id,
            target_user_ids,
        })
    }

    // -- Per-user window state --

    /// The caller's state for a note, if they have one yet.
    pub async fn get_user_state(
        &self,
        actor: &Actor,
        note_id: Uuid,
    ) -> Result<Option<StickyNoteUserState>, NoteError> {
        let user_id = actor.ensure()?;
        self.blocking(move |store| {
            store.get_note(note_id)?.ok_or(NoteError::NotFound("sticky note"))?;
            Ok(store.get_user_state(note_id, user_id)?)
        })
        .await
    }

    /// Get-or-create the caller's state and apply `patch` to it. Private to
    /// the caller, so never broadcast.
    pub async fn upsert_user_state(
        &self,
        actor: &Actor,
        note_id: Uuid,
        patch: UpdateStickyNoteStateRequest,
    ) -> Result<StickyNoteUserState, NoteError> {
        let user_id = actor.ensure()?;
        self.blocking(move |store| {
            store.get_note(note_id)?.ok_or(NoteError::NotFound("sticky note"))?;

            let now = Utc::now();
            let was_open = match store.get_user_state(note_id, user_id)? {
                Some(state) => state.is_open,
                None => {
                    store.create_user_state(&StickyNoteUserState::new(note_id, user_id, now))?;
                    false
                }
            };

            let opened_at = (patch.is_open == Some(true) && !was_open).then_some(now);
            store.update_user_state(note_id, user_id, &patch, opened_at, now)?;
            store
                .get_user_state(note_id, user_id)?
                .ok_or(NoteError::NotFound("sticky note"))
        })
        .await
    }

    // -- Folders --

    pub async fn list_folders(&self, actor: &Actor, channel_id: Uuid) -> Result<Vec<StickyNoteFolder>, NoteError> {
        actor.ensure()?;
        self.blocking(move |store| Ok(store.list_folders(channel_id)?)).await
    }

    pub async fn create_folder(
        &self,
        actor: &Actor,
        channel_id: Uuid,
        req: CreateFolderRequest,
    ) -> Result<StickyNoteFolder, NoteError> {
        let creator_id = actor.ensure()?;
        let name = required_name(&req.name)?;

        let folder = self
            .blocking(move |store| {
                let channel = store.get_channel(channel_id)?.ok_or(NoteError::NotFound("channel"))?;
                let now = Utc::now();
                let folder = StickyNoteFolder {
                    id: Uuid::new_v4(),
                    channel_id,
                    world_id: channel.world_id,
                    parent_id: req.parent_id,
                    name,
                    color: req.color,
                    creator_id,
                    order_index: req.order_index.unwrap_or(0),
                    created_at: now,
                    updated_at: now,
                };
                applied(store.create_folder(&folder)?, "folder")?;
                Ok(folder)
            })
            .await?;

        info!("{} created folder {} in {}", actor.username, folder.id, channel_id);
        self.broadcaster
            .broadcast_to_channel(channel_id, GatewayEvent::folder_created(folder.clone()));
        Ok(folder)
    }

    /// Allowed for the folder's creator and channel owners, admins and members.
    pub async fn update_folder(
        &self,
        actor: &Actor,
        folder_id: Uuid,
        mut patch: UpdateFolderRequest,
    ) -> Result<StickyNoteFolder, NoteError> {
        let user_id = actor.ensure()?;
        if let Some(name) = patch.name.take() {
            patch.name = Some(required_name(&name)?);
        }

        let folder = self
            .blocking(move |store| {
                let folder = store.get_folder(folder_id)?.ok_or(NoteError::NotFound("folder"))?;
                if !can_manage(store, user_id, folder.channel_id, Some(folder.creator_id))? {
                    return Err(NoteError::Forbidden("not allowed to manage folders in this channel"));
                }
                applied(store.update_folder(folder_id, &patch, Utc::now())?, "folder")?;
                store.get_folder(folder_id)?.ok_or(NoteError::NotFound("folder"))
            })
            .await?;

        self.broadcaster
            .broadcast_to_channel(folder.channel_id, GatewayEvent::folder_updated(folder.clone()));
        Ok(folder)
    }

    /// Detach every note filed under the folder and delete it, atomically.
    pub async fn delete_folder(&self, actor: &Actor, folder_id: Uuid) -> Result<(), NoteError> {
        let user_id = actor.ensure()?;

        let channel_id = self
            .blocking(move |store| {
                let folder = store.get_folder(folder_id)?.ok_or(NoteError::NotFound("folder"))?;
                if !can_manage(store, user_id, folder.channel_id, Some(folder.creator_id))? {
                    return Err(NoteError::Forbidden("not allowed to manage folders in this channel"));
                }
                let detached = store
                    .delete_folder(folder_id, user_id)?
                    .ok_or(NoteError::NotFound("folder"))?;
                info!("Deleted folder {} ({} note(s) detached)", folder_id, detached);
                Ok(folder.channel_id)
            })
            .await?;

        self.broadcaster
            .broadcast_to_channel(channel_id, GatewayEvent::folder_deleted(folder_id, channel_id));
        Ok(())
    }
}

fn applied(outcome: WriteOutcome, what: &'static str) -> Result<(), NoteError> {
    match outcome {
        WriteOutcome::Applied => Ok(()),
        WriteOutcome::Missing => Err(NoteError::NotFound(what)),
        WriteOutcome::Rejected(reason) => Err(NoteError::InvalidInput(reason.into())),
    }
}

fn positive(v: f64) -> bool {
    v > 0.0
}

fn required_name(name: &str) -> Result<String, NoteError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(NoteError::InvalidInput("folder name is required".into()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    use corkboard_db::Database;

    use crate::registry::{ConnectionHandle, ConnectionInfo, ConnectionRegistry, OutboundFrame};

    struct Harness {
        db: Arc<Database>,
        registry: Arc<ConnectionRegistry>,
        service: StickyNoteService,
        channel_id: Uuid,
        world_id: Uuid,
    }

    impl Harness {
        fn new() -> Self {
            let db = Arc::new(Database::open_in_memory().unwrap());
            let (channel_id, world_id) = (Uuid::new_v4(), Uuid::new_v4());
            db.create_channel(channel_id, Some(world_id), "board").unwrap();
            let registry = Arc::new(ConnectionRegistry::new());
            let broadcaster = Broadcaster::spawn(registry.clone());
            let service = StickyNoteService::new(db.clone(), broadcaster);
            Self {
                db,
                registry,
                service,
                channel_id,
                world_id,
            }
        }

        fn connect(&self, user_id: Uuid, channel: Option<Uuid>) -> mpsc::Receiver<OutboundFrame> {
            let (handle, rx) = ConnectionHandle::new();
            self.registry
                .register(user_id, handle, ConnectionInfo::new("someone").viewing(channel));
            rx
        }

        async fn frames(&self, rx: &mut mpsc::Receiver<OutboundFrame>) -> Vec<Value> {
            self.service.broadcaster().flush().await;
            let mut out = Vec::new();
            while let Ok(frame) = rx.try_recv() {
                out.push(serde_json::from_str(&frame).unwrap());
            }
            out
        }

        async fn note(&self, actor: &Actor) -> StickyNote {
            self.service
                .create_note(actor, self.channel_id, CreateStickyNoteRequest::default())
                .await
                .unwrap()
        }
    }

    fn actor(name: &str) -> Actor {
        Actor::new(Uuid::new_v4(), name)
    }

    #[tokio::test]
    async fn create_applies_defaults_and_reaches_every_viewing_device() {
        let h = Harness::new();
        let (u1, u2) = (actor("u1"), actor("u2"));
        let mut phone = h.connect(u1.user_id, Some(h.channel_id));
        let mut laptop = h.connect(u1.user_id, Some(h.channel_id));
        let mut elsewhere = h.connect(u2.user_id, Some(Uuid::new_v4()));

        let req = CreateStickyNoteRequest {
            title: Some("Plan".into()),
            width: Some(-5.0),
            ..Default::default()
        };
        let note = h.service.create_note(&u2, h.channel_id, req).await.unwrap();

        assert_eq!(note.color, DEFAULT_NOTE_COLOR);
        assert_eq!(note.note_type, DEFAULT_NOTE_TYPE);
        assert_eq!(note.width, DEFAULT_NOTE_WIDTH);
        assert_eq!(note.height, DEFAULT_NOTE_HEIGHT);
        assert_eq!(note.world_id, Some(h.world_id));
        assert_eq!(note.creator.as_ref().map(|c| c.username.as_str()), Some("u2"));

        for rx in [&mut phone, &mut laptop] {
            let frames = h.frames(rx).await;
            assert_eq!(frames.len(), 1);
            let d = &frames[0]["d"];
            assert_eq!(d["type"], "StickyNoteCreate");
            assert_eq!(d["data"]["action"], "create");
            assert_eq!(d["data"]["note"]["title"], "Plan");
            assert_eq!(d["channel_id"], json!(h.channel_id));
        }
        assert!(h.frames(&mut elsewhere).await.is_empty());
    }

    #[tokio::test]
    async fn create_in_unknown_channel_is_not_found() {
        let h = Harness::new();
        let u = actor("u");
        let mut rx = h.connect(u.user_id, Some(h.channel_id));

        let err = h
            .service
            .create_note(&u, Uuid::new_v4(), CreateStickyNoteRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NoteError::NotFound("channel")));
        assert!(h.frames(&mut rx).await.is_empty());
    }

    #[tokio::test]
    async fn anonymous_actor_is_unauthorized() {
        let h = Harness::new();
        let nobody = Actor::new(Uuid::nil(), "");
        let err = h
            .service
            .create_note(&nobody, h.channel_id, CreateStickyNoteRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NoteError::Unauthorized));
    }

    #[tokio::test]
    async fn sequential_patches_keep_earlier_fields() {
        let h = Harness::new();
        let u = actor("u");
        let note = h.note(&u).await;
        let folder = h
            .service
            .create_folder(&u, h.channel_id, CreateFolderRequest { name: "F".into(), ..Default::default() })
            .await
            .unwrap();

        let patches = [
            UpdateStickyNoteRequest { title: Some("T".into()), ..Default::default() },
            UpdateStickyNoteRequest { x: Some(42.0), ..Default::default() },
            UpdateStickyNoteRequest { folder_id: Some(Some(folder.id)), ..Default::default() },
        ];
        for patch in patches {
            h.service.update_note(&u, note.id, patch).await.unwrap();
        }

        let loaded = h.service.get_note(&u, note.id).await.unwrap();
        assert_eq!(loaded.title, "T");
        assert_eq!(loaded.x, 42.0);
        assert_eq!(loaded.folder_id, Some(folder.id));
        assert_eq!(loaded.color, DEFAULT_NOTE_COLOR);

        let cleared = h
            .service
            .update_note(&u, note.id, UpdateStickyNoteRequest { folder_id: Some(None), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(cleared.folder_id, None);
        assert_eq!(cleared.title, "T");
    }

    #[tokio::test]
    async fn update_by_any_user_broadcasts_to_the_channel() {
        let h = Harness::new();
        let (owner, other) = (actor("owner"), actor("other"));
        let note = h.note(&owner).await;
        let mut rx = h.connect(owner.user_id, Some(h.channel_id));

        let patch = UpdateStickyNoteRequest { color: Some("pink".into()), ..Default::default() };
        let updated = h.service.update_note(&other, note.id, patch).await.unwrap();
        assert_eq!(updated.color, "pink");

        let frames = h.frames(&mut rx).await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["d"]["type"], "StickyNoteUpdate");
        assert_eq!(frames[0]["d"]["data"]["note"]["color"], "pink");
    }

    #[tokio::test]
    async fn update_reaches_each_device_of_a_viewer_exactly_once() {
        let h = Harness::new();
        let (u1, u2) = (actor("u1"), actor("u2"));
        let note = h.note(&u1).await;
        let mut x = h.connect(u1.user_id, Some(h.channel_id));
        let mut y = h.connect(u1.user_id, Some(h.channel_id));

        let patch = UpdateStickyNoteRequest { title: Some("v2".into()), ..Default::default() };
        h.service.update_note(&u2, note.id, patch).await.unwrap();

        for rx in [&mut x, &mut y] {
            let frames = h.frames(rx).await;
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0]["d"]["type"], "StickyNoteUpdate");
            assert_eq!(frames[0]["d"]["data"]["note"]["id"], json!(note.id));
            assert_eq!(frames[0]["d"]["data"]["note"]["title"], "v2");
        }
    }

    #[tokio::test]
    async fn patch_rejects_non_positive_dimensions() {
        let h = Harness::new();
        let u = actor("u");
        let note = h.note(&u).await;
        let mut rx = h.connect(u.user_id, Some(h.channel_id));

        for patch in [
            UpdateStickyNoteRequest { width: Some(0.0), ..Default::default() },
            UpdateStickyNoteRequest { height: Some(-10.0), ..Default::default() },
        ] {
            let err = h.service.update_note(&u, note.id, patch).await.unwrap_err();
            assert!(matches!(err, NoteError::InvalidInput(_)));
        }
        assert!(h.frames(&mut rx).await.is_empty());

        let resized = h
            .service
            .update_note(&u, note.id, UpdateStickyNoteRequest { width: Some(120.0), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(resized.width, 120.0);
        assert_eq!(resized.height, DEFAULT_NOTE_HEIGHT);
    }

    #[tokio::test]
    async fn notes_cannot_be_filed_in_a_deleted_or_foreign_folder() {
        let h = Harness::new();
        let u = actor("u");
        let other_channel = Uuid::new_v4();
        h.db.create_channel(other_channel, None, "elsewhere").unwrap();
        let foreign = h
            .service
            .create_folder(&u, other_channel, CreateFolderRequest { name: "Away".into(), ..Default::default() })
            .await
            .unwrap();
        let doomed = h
            .service
            .create_folder(&u, h.channel_id, CreateFolderRequest { name: "Old".into(), ..Default::default() })
            .await
            .unwrap();
        let note = h.note(&u).await;
        h.service.delete_folder(&u, doomed.id).await.unwrap();
        let mut rx = h.connect(u.user_id, Some(h.channel_id));

        let err = h
            .service
            .create_note(
                &u,
                h.channel_id,
                CreateStickyNoteRequest { folder_id: Some(foreign.id), ..Default::default() },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NoteError::InvalidInput(_)));

        for folder_id in [doomed.id, foreign.id] {
            let patch = UpdateStickyNoteRequest { folder_id: Some(Some(folder_id)), ..Default::default() };
            let err = h.service.update_note(&u, note.id, patch).await.unwrap_err();
            assert!(matches!(err, NoteError::InvalidInput(_)));
        }

        assert_eq!(h.service.get_note(&u, note.id).await.unwrap().folder_id, None);
        assert_eq!(h.service.list_notes(&u, h.channel_id).await.unwrap().len(), 1);
        assert!(h.frames(&mut rx).await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_folder_delete_and_refile_never_dangle() {
        let h = Harness::new();
        let u = actor("u");
        let note = h.note(&u).await;

        for _ in 0..50 {
            let folder = h
                .service
                .create_folder(&u, h.channel_id, CreateFolderRequest { name: "F".into(), ..Default::default() })
                .await
                .unwrap();
            let refile = UpdateStickyNoteRequest { folder_id: Some(Some(folder.id)), ..Default::default() };
            let (deleted, refiled) = tokio::join!(
                h.service.delete_folder(&u, folder.id),
                h.service.update_note(&u, note.id, refile)
            );
            deleted.unwrap();
            if let Err(err) = refiled {
                assert!(matches!(err, NoteError::InvalidInput(_)));
            }

            let loaded = h.service.get_note(&u, note.id).await.unwrap();
            assert_eq!(loaded.folder_id, None);
        }
    }

    #[tokio::test]
    async fn update_missing_note_is_not_found() {
        let h = Harness::new();
        let err = h
            .service
            .update_note(&actor("u"), Uuid::new_v4(), UpdateStickyNoteRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NoteError::NotFound(_)));
    }

    #[tokio::test]
    async fn member_cannot_delete_someone_elses_note() {
        let h = Harness::new();
        let (creator, member) = (actor("creator"), actor("member"));
        h.db.assign_role(member.user_id, "board-member", h.channel_id, "channel").unwrap();
        let note = h.note(&creator).await;
        let mut rx = h.connect(creator.user_id, Some(h.channel_id));

        let err = h.service.delete_note(&member, note.id).await.unwrap_err();
        assert!(matches!(err, NoteError::Forbidden(_)));
        assert!(h.service.get_note(&creator, note.id).await.is_ok());
        assert!(h.frames(&mut rx).await.is_empty());
    }

    #[tokio::test]
    async fn admin_delete_broadcasts_a_stub_and_removes_the_note() {
        let h = Harness::new();
        let (creator, admin) = (actor("creator"), actor("admin"));
        h.db.assign_role(admin.user_id, "board-admin", h.channel_id, "channel").unwrap();
        let note = h.note(&creator).await;
        let mut rx = h.connect(creator.user_id, Some(h.channel_id));

        h.service.delete_note(&admin, note.id).await.unwrap();

        let frames = h.frames(&mut rx).await;
        assert_eq!(frames.len(), 1);
        let data = &frames[0]["d"]["data"];
        assert_eq!(data["action"], "delete");
        assert_eq!(data["note"], json!({ "id": note.id, "channel_id": h.channel_id }));

        let err = h.service.get_note(&creator, note.id).await.unwrap_err();
        assert!(matches!(err, NoteError::NotFound(_)));
        let err = h.service.delete_note(&creator, note.id).await.unwrap_err();
        assert!(matches!(err, NoteError::NotFound(_)));
    }

    #[tokio::test]
    async fn push_reaches_targets_on_every_device() {
        let h = Harness::new();
        let (sender, target, bystander) = (actor("s"), actor("t"), actor("b"));
        let note = h.note(&sender).await;
        let mut away = h.connect(target.user_id, Some(Uuid::new_v4()));
        let mut idle = h.connect(target.user_id, None);
        let mut other = h.connect(bystander.user_id, Some(h.channel_id));

        let res = h
            .service
            .push_note(&sender, note.id, vec![target.user_id])
            .await
            .unwrap();
        assert_eq!(res.target_user_ids, vec![target.user_id]);

        for rx in [&mut away, &mut idle] {
            let frames = h.frames(rx).await;
            assert_eq!(frames.len(), 1);
            let d = &frames[0]["d"];
            assert_eq!(d["type"], "StickyNotePush");
            assert_eq!(d["data"]["target_user_ids"], json!([target.user_id]));
            assert_eq!(d["channel_id"], json!(h.channel_id));
        }
        assert!(h.frames(&mut other).await.is_empty());
    }

    #[tokio::test]
    async fn push_with_no_targets_is_rejected_before_lookup() {
        let h = Harness::new();
        let err = h
            .service
            .push_note(&actor("s"), Uuid::new_v4(), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, NoteError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn opening_stamps_last_opened_only_on_transition() {
        let h = Harness::new();
        let u = actor("u");
        let note = h.note(&u).await;
        let mut rx = h.connect(u.user_id, Some(h.channel_id));

        assert!(h.service.get_user_state(&u, note.id).await.unwrap().is_none());

        let open = UpdateStickyNoteStateRequest { is_open: Some(true), ..Default::default() };
        let first = h.service.upsert_user_state(&u, note.id, open.clone()).await.unwrap();
        assert!(first.is_open);
        assert!(first.last_opened_at.is_some());

        let moved = UpdateStickyNoteStateRequest { is_open: Some(true), x: Some(5.0), ..Default::default() };
        let again = h.service.upsert_user_state(&u, note.id, moved).await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.last_opened_at, first.last_opened_at);
        assert_eq!(again.x, Some(5.0));

        let close = UpdateStickyNoteStateRequest { is_open: Some(false), ..Default::default() };
        h.service.upsert_user_state(&u, note.id, close).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let reopened = h.service.upsert_user_state(&u, note.id, open).await.unwrap();
        assert!(reopened.last_opened_at > first.last_opened_at);
        assert_eq!(reopened.x, Some(5.0));

        // Only the create broadcast; state changes stay private.
        assert_eq!(h.frames(&mut rx).await.len(), 1);
    }

    #[tokio::test]
    async fn user_state_for_missing_note_is_not_found() {
        let h = Harness::new();
        let err = h
            .service
            .upsert_user_state(&actor("u"), Uuid::new_v4(), UpdateStickyNoteStateRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NoteError::NotFound(_)));
    }

    #[tokio::test]
    async fn folder_name_is_required() {
        let h = Harness::new();
        let u = actor("u");
        let err = h
            .service
            .create_folder(&u, h.channel_id, CreateFolderRequest { name: "   ".into(), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, NoteError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn folder_delete_leaves_no_dangling_note_references() {
        let h = Harness::new();
        let (creator, member, stranger) = (actor("c"), actor("m"), actor("s"));
        h.db.assign_role(member.user_id, "board-member", h.channel_id, "channel").unwrap();

        let folder = h
            .service
            .create_folder(&creator, h.channel_id, CreateFolderRequest { name: " Ideas ".into(), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(folder.name, "Ideas");

        let note = h
            .service
            .create_note(
                &creator,
                h.channel_id,
                CreateStickyNoteRequest { folder_id: Some(folder.id), ..Default::default() },
            )
            .await
            .unwrap();

        let err = h.service.delete_folder(&stranger, folder.id).await.unwrap_err();
        assert!(matches!(err, NoteError::Forbidden(_)));

        let mut rx = h.connect(creator.user_id, Some(h.channel_id));
        h.service.delete_folder(&member, folder.id).await.unwrap();

        let loaded = h.service.get_note(&creator, note.id).await.unwrap();
        assert_eq!(loaded.folder_id, None);
        assert!(h.service.list_folders(&creator, h.channel_id).await.unwrap().is_empty());

        let frames = h.frames(&mut rx).await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["d"]["type"], "StickyNoteFolderDelete");
    }

    #[tokio::test]
    async fn folder_update_is_gated_and_validated() {
        let h = Harness::new();
        let (creator, stranger) = (actor("c"), actor("s"));
        let folder = h
            .service
            .create_folder(&creator, h.channel_id, CreateFolderRequest { name: "A".into(), ..Default::default() })
            .await
            .unwrap();

        let rename = UpdateFolderRequest { name: Some("B".into()), ..Default::default() };
        let err = h.service.update_folder(&stranger, folder.id, rename.clone()).await.unwrap_err();
        assert!(matches!(err, NoteError::Forbidden(_)));

        let blank = UpdateFolderRequest { name: Some("".into()), ..Default::default() };
        let err = h.service.update_folder(&creator, folder.id, blank).await.unwrap_err();
        assert!(matches!(err, NoteError::InvalidInput(_)));

        let own_parent = UpdateFolderRequest { parent_id: Some(Some(folder.id)), ..Default::default() };
        let err = h.service.update_folder(&creator, folder.id, own_parent).await.unwrap_err();
        assert!(matches!(err, NoteError::InvalidInput(_)));

        let other_channel = Uuid::new_v4();
        h.db.create_channel(other_channel, None, "elsewhere").unwrap();
        let foreign = h
            .service
            .create_folder(&creator, other_channel, CreateFolderRequest { name: "X".into(), ..Default::default() })
            .await
            .unwrap();
        for parent_id in [foreign.id, Uuid::new_v4()] {
            let patch = UpdateFolderRequest { parent_id: Some(Some(parent_id)), ..Default::default() };
            let err = h.service.update_folder(&creator, folder.id, patch).await.unwrap_err();
            assert!(matches!(err, NoteError::InvalidInput(_)));
        }
        let folders = h.service.list_folders(&creator, h.channel_id).await.unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].parent_id, None);

        let renamed = h.service.update_folder(&creator, folder.id, rename).await.unwrap();
        assert_eq!(renamed.name, "B");
    }
}

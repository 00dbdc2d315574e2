use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use corkboard_types::events::{ClientFrame, Envelope, Frame, GatewayCommand, GatewayEvent, Reply};

use crate::broadcast::Broadcaster;
use crate::error::NoteError;
use crate::registry::{ConnectionHandle, ConnectionId, ConnectionInfo, ConnectionRegistry};
use crate::sticky_notes::{Actor, StickyNoteService};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_PONGS: u8 = 2;

/// Everything a connection needs to serve commands.
#[derive(Clone)]
pub struct Gateway {
    notes: StickyNoteService,
}

impl Gateway {
    pub fn new(notes: StickyNoteService) -> Self {
        Self { notes }
    }

    pub fn notes(&self) -> &StickyNoteService {
        &self.notes
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        self.notes.broadcaster()
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.broadcaster().registry()
    }
}

/// Identity and initial view of a connection, validated at upgrade time.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    pub username: String,
    pub device_id: Option<String>,
    pub channel_id: Option<Uuid>,
}

/// Serve a pre-authenticated WebSocket until either side goes away.
pub async fn handle_connection(socket: WebSocket, gateway: Gateway, session: Session) {
    let Session {
        user_id,
        username,
        device_id,
        channel_id,
    } = session;
    let (mut sender, mut receiver) = socket.split();
    let (handle, mut outbound) = ConnectionHandle::new();
    let connection_id = handle.id();

    let registry = gateway.registry().clone();
    let broadcaster = gateway.broadcaster().clone();
    let info = ConnectionInfo::new(username.clone())
        .with_device(device_id.clone())
        .viewing(channel_id);
    let first = registry.register(user_id, handle, info);

    // Ready goes straight to the socket so it precedes anything queued
    // since registration.
    let ready = Frame::Dispatch(Envelope::new(GatewayEvent::Ready {
        user_id,
        username: username.clone(),
        connection_id,
    }));
    let sent = match serde_json::to_string(&ready) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize Ready frame: {}", e);
            false
        }
    };
    if !sent {
        registry.unregister(user_id, connection_id);
        return;
    }

    info!(
        "{} ({}) connected to gateway [conn={}, device={:?}]",
        username, user_id, connection_id, device_id
    );

    // Existing online users, queued behind anything already bound for us.
    for (uid, uname) in registry.online_users() {
        if uid == user_id {
            continue;
        }
        broadcaster.send_to_connection(
            connection_id,
            GatewayEvent::PresenceUpdate {
                user_id: uid,
                username: uname,
                online: true,
            },
        );
    }

    if first {
        broadcaster.broadcast_all(GatewayEvent::PresenceUpdate {
            user_id,
            username: username.clone(),
            online: true,
        });
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Single writer for this socket: drains the outbound queue and pings.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= MAX_MISSED_PONGS {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let actor = Actor::new(user_id, username.clone());
    let gateway_recv = gateway.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(frame) => handle_command(&gateway_recv, connection_id, &actor, frame).await,
                    Err(e) => {
                        warn!("{} ({}) bad command: {}", actor.username, actor.user_id, e);
                        gateway_recv.broadcaster().reply(
                            connection_id,
                            Reply::error(None, "invalid_input", format!("malformed command: {e}")),
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if registry.unregister(user_id, connection_id) {
        broadcaster.broadcast_all(GatewayEvent::PresenceUpdate {
            user_id,
            username: username.clone(),
            online: false,
        });
    }
    info!("{} ({}) disconnected from gateway [conn={}]", username, user_id, connection_id);
}

/// Run one client command and answer it. Successes are only acknowledged
/// when the client asked for a reply; failures are always reported.
async fn handle_command(gateway: &Gateway, connection_id: ConnectionId, actor: &Actor, frame: ClientFrame) {
    let ClientFrame { request_id, command } = frame;
    let notes = gateway.notes();

    let result = match command {
        GatewayCommand::ViewChannel { channel_id } => {
            debug!("{} viewing channel {:?}", actor.username, channel_id);
            gateway.registry().update_current_channel(connection_id, channel_id);
            Ok(None)
        }

        GatewayCommand::StartTyping { channel_id } => {
            gateway.broadcaster().broadcast_to_channel(
                channel_id,
                GatewayEvent::TypingStart {
                    channel_id,
                    user_id: actor.user_id,
                    username: actor.username.clone(),
                },
            );
            Ok(None)
        }

        GatewayCommand::StickyNoteCreate { channel_id, note } => {
            reply_data(notes.create_note(actor, channel_id, note).await)
        }

        GatewayCommand::StickyNoteUpdate { note_id, patch } => {
            reply_data(notes.update_note(actor, note_id, patch).await)
        }

        GatewayCommand::StickyNoteDelete { note_id } => {
            notes.delete_note(actor, note_id).await.map(|()| None)
        }

        GatewayCommand::StickyNotePush {
            note_id,
            target_user_ids,
        } => reply_data(notes.push_note(actor, note_id, target_user_ids).await),

        GatewayCommand::StickyNoteStateUpdate { note_id, state } => {
            reply_data(notes.upsert_user_state(actor, note_id, state).await)
        }
    };

    let reply = match result {
        Ok(data) => {
            if request_id.is_none() {
                return;
            }
            Reply::ok(request_id, data)
        }
        Err(NoteError::Storage(e)) => {
            error!("Gateway command from {} failed: {:#}", actor.user_id, e);
            Reply::error(request_id, "internal", "internal error")
        }
        Err(e) => {
            debug!("Gateway command from {} rejected: {}", actor.user_id, e);
            Reply::error(request_id, e.code(), e.to_string())
        }
    };
    gateway.broadcaster().reply(connection_id, reply);
}

fn reply_data<T: Serialize>(result: Result<T, NoteError>) -> Result<Option<serde_json::Value>, NoteError> {
    let value = serde_json::to_value(result?).map_err(anyhow::Error::from)?;
    Ok(Some(value))
}

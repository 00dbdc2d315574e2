//! Directory of live gateway connections.
//!
//! Two independently sharded indexes:
//! - `users`: user id -> that user's connections (the per-user bucket is
//!   guarded by its dashmap shard, so registering one user never contends
//!   with unrelated users on other shards)
//! - `connections`: connection id -> user id, for connection-keyed lookups
//!
//! Delivery only ever `try_send`s into a connection's bounded outbound
//! queue, so a traversal never waits on a socket.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// A serialized frame, shared between every connection it is delivered to.
pub type OutboundFrame = Arc<str>;

/// Frames queued per connection before new ones are dropped for it.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub username: String,
    pub device_id: Option<String>,
    /// Channel the client is viewing. Channel-scoped fan-out matches on this.
    pub current_channel: Option<Uuid>,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionInfo {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            device_id: None,
            current_channel: None,
            connected_at: Utc::now(),
        }
    }

    pub fn with_device(mut self, device_id: Option<String>) -> Self {
        self.device_id = device_id;
        self
    }

    pub fn viewing(mut self, channel_id: Option<Uuid>) -> Self {
        self.current_channel = channel_id;
        self
    }
}

/// The registry's side of one connection: its id and the sending half of
/// its outbound queue. The connection's writer task owns the receiver.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<OutboundFrame>,
}

impl ConnectionHandle {
    pub fn new() -> (Self, mpsc::Receiver<OutboundFrame>) {
        Self::with_capacity(OUTBOUND_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (outbound, rx) = mpsc::channel(capacity);
        let handle = Self {
            id: Uuid::new_v4(),
            outbound,
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

struct ConnectionEntry {
    info: ConnectionInfo,
    outbound: mpsc::Sender<OutboundFrame>,
}

#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    pub user_id: Uuid,
    pub connection_id: ConnectionId,
    pub info: ConnectionInfo,
}

/// Outcome of one fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

impl Delivery {
    fn offer(&mut self, connection_id: ConnectionId, outbound: &mpsc::Sender<OutboundFrame>, frame: &OutboundFrame) {
        match outbound.try_send(frame.clone()) {
            Ok(()) => self.delivered += 1,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full for connection {}, dropping frame", connection_id);
                self.dropped += 1;
            }
            Err(TrySendError::Closed(_)) => {
                trace!("Connection {} already closed, skipping", connection_id);
                self.dropped += 1;
            }
        }
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    users: DashMap<Uuid, HashMap<ConnectionId, ConnectionEntry>>,
    connections: DashMap<ConnectionId, Uuid>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Returns true if it is the user's first live one.
    pub fn register(&self, user_id: Uuid, handle: ConnectionHandle, info: ConnectionInfo) -> bool {
        let connection_id = handle.id;
        let first = {
            // The shard lock is held across the insert so a concurrent
            // `unregister` cannot drop the bucket out from under us.
            let mut bucket = self.users.entry(user_id).or_default();
            let first = bucket.is_empty();
            bucket.insert(
                connection_id,
                ConnectionEntry {
                    info,
                    outbound: handle.outbound,
                },
            );
            first
        };
        self.connections.insert(connection_id, user_id);

        debug!(
            "Registered connection {} for user {} ({} live)",
            connection_id,
            user_id,
            self.connections.len()
        );
        first
    }

    /// Change the channel a connection is viewing. False if it is not registered.
    pub fn update_current_channel(&self, connection_id: ConnectionId, channel_id: Option<Uuid>) -> bool {
        let Some(user_id) = self.connections.get(&connection_id).map(|e| *e.value()) else {
            return false;
        };
        let Some(mut bucket) = self.users.get_mut(&user_id) else {
            return false;
        };
        match bucket.get_mut(&connection_id) {
            Some(entry) => {
                entry.info.current_channel = channel_id;
                true
            }
            None => false,
        }
    }

    /// Remove a connection, dropping its outbound queue. Returns true if the
    /// user has no live connections left.
    pub fn unregister(&self, user_id: Uuid, connection_id: ConnectionId) -> bool {
        self.connections.remove(&connection_id);
        let removed = self
            .users
            .get_mut(&user_id)
            .is_some_and(|mut bucket| bucket.remove(&connection_id).is_some());
        let emptied = self
            .users
            .remove_if(&user_id, |_, bucket| bucket.is_empty())
            .is_some();

        debug!(
            "Unregistered connection {} for user {} ({} live)",
            connection_id,
            user_id,
            self.connections.len()
        );
        removed && emptied
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.users.contains_key(&user_id)
    }

    /// Online users with the username of one of their connections.
    pub fn online_users(&self) -> Vec<(Uuid, String)> {
        self.users
            .iter()
            .filter_map(|bucket| {
                bucket
                    .values()
                    .next()
                    .map(|entry| (*bucket.key(), entry.info.username.clone()))
            })
            .collect()
    }

    /// Copy of every `(user, connection, info)` currently registered.
    pub fn snapshot(&self) -> Vec<ConnectionSnapshot> {
        let mut out = Vec::with_capacity(self.connections.len());
        for bucket in self.users.iter() {
            for (connection_id, entry) in bucket.value() {
                out.push(ConnectionSnapshot {
                    user_id: *bucket.key(),
                    connection_id: *connection_id,
                    info: entry.info.clone(),
                });
            }
        }
        out
    }

    /// Every connection currently viewing `channel_id`.
    pub fn deliver_to_channel(&self, channel_id: Uuid, frame: &OutboundFrame) -> Delivery {
        let mut delivery = Delivery::default();
        for bucket in self.users.iter() {
            for (connection_id, entry) in bucket.value() {
                if entry.info.current_channel == Some(channel_id) {
                    delivery.offer(*connection_id, &entry.outbound, frame);
                }
            }
        }
        delivery
    }

    /// Every connection of every listed user.
    pub fn deliver_to_users(&self, user_ids: &HashSet<Uuid>, frame: &OutboundFrame) -> Delivery {
        let mut delivery = Delivery::default();
        for user_id in user_ids {
            if let Some(bucket) = self.users.get(user_id) {
                for (connection_id, entry) in bucket.value() {
                    delivery.offer(*connection_id, &entry.outbound, frame);
                }
            }
        }
        delivery
    }

    pub fn deliver_to_all(&self, frame: &OutboundFrame) -> Delivery {
        let mut delivery = Delivery::default();
        for bucket in self.users.iter() {
            for (connection_id, entry) in bucket.value() {
                delivery.offer(*connection_id, &entry.outbound, frame);
            }
        }
        delivery
    }

    pub fn deliver_to_connection(&self, connection_id: ConnectionId, frame: &OutboundFrame) -> Delivery {
        let mut delivery = Delivery::default();
        let Some(user_id) = self.connections.get(&connection_id).map(|e| *e.value()) else {
            return delivery;
        };
        if let Some(bucket) = self.users.get(&user_id) {
            if let Some(entry) = bucket.get(&connection_id) {
                delivery.offer(connection_id, &entry.outbound, frame);
            }
        }
        delivery
    }
}

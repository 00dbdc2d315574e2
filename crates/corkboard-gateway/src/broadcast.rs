use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
#[cfg(any(test, feature = "test-util"))]
use tokio::sync::oneshot;
use tracing::{debug, error, warn};
use uuid::Uuid;

use corkboard_types::events::{Envelope, Frame, GatewayEvent, Reply};

use crate::registry::{ConnectionId, ConnectionRegistry, Delivery, OutboundFrame};

enum Target {
    Channel(Uuid),
    Users(HashSet<Uuid>),
    All,
    Connection(ConnectionId),
}

enum Job {
    Deliver {
        target: Target,
        frame: OutboundFrame,
        kind: &'static str,
    },
    #[cfg(any(test, feature = "test-util"))]
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget fan-out. Callers enqueue and return; the
/// [`BroadcastWorker`] performs delivery in issue order, so frames bound for
/// the same connection are queued in the order they were issued.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    jobs: mpsc::UnboundedSender<Job>,
}

/// The fan-out task. Runs until every [`Broadcaster`] clone is dropped.
pub struct BroadcastWorker {
    registry: Arc<ConnectionRegistry>,
    jobs: mpsc::UnboundedReceiver<Job>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> (Self, BroadcastWorker) {
        let (jobs, rx) = mpsc::unbounded_channel();
        let worker = BroadcastWorker {
            registry: registry.clone(),
            jobs: rx,
        };
        (Self { registry, jobs }, worker)
    }

    /// Construct and start the worker on the current runtime.
    pub fn spawn(registry: Arc<ConnectionRegistry>) -> Self {
        let (broadcaster, worker) = Self::new(registry);
        tokio::spawn(worker.run());
        broadcaster
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Deliver to every connection currently viewing `channel_id`.
    pub fn broadcast_to_channel(&self, channel_id: Uuid, event: GatewayEvent) {
        let kind = event.kind();
        let frame = Frame::Dispatch(Envelope::for_channel(channel_id, event));
        self.enqueue(Target::Channel(channel_id), &frame, kind);
    }

    /// Deliver to every connection of each listed user, wherever they are.
    pub fn broadcast_to_users(&self, user_ids: &[Uuid], event: GatewayEvent) {
        let kind = event.kind();
        let targets: HashSet<Uuid> = user_ids.iter().copied().collect();
        let frame = Frame::Dispatch(Envelope::new(event));
        self.enqueue(Target::Users(targets), &frame, kind);
    }

    /// Deliver to every live connection.
    pub fn broadcast_all(&self, event: GatewayEvent) {
        let kind = event.kind();
        let frame = Frame::Dispatch(Envelope::new(event));
        self.enqueue(Target::All, &frame, kind);
    }

    /// Deliver an event to one connection.
    pub fn send_to_connection(&self, connection_id: ConnectionId, event: GatewayEvent) {
        let kind = event.kind();
        let frame = Frame::Dispatch(Envelope::new(event));
        self.enqueue(Target::Connection(connection_id), &frame, kind);
    }

    /// Answer a client command on the connection that sent it.
    pub fn reply(&self, connection_id: ConnectionId, reply: Reply) {
        self.enqueue(Target::Connection(connection_id), &Frame::Reply(reply), "Reply");
    }

    /// Resolves once every job enqueued before this call has been delivered
    /// to the outbound queues.
    #[cfg(any(test, feature = "test-util"))]
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.jobs.send(Job::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    fn enqueue(&self, target: Target, frame: &Frame, kind: &'static str) {
        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize {} frame: {}", kind, e);
                return;
            }
        };

        let job = Job::Deliver {
            target,
            frame: Arc::from(text),
            kind,
        };
        if self.jobs.send(job).is_err() {
            warn!("Broadcast worker stopped, dropping {} frame", kind);
        }
    }
}

impl BroadcastWorker {
    pub async fn run(mut self) {
        while let Some(job) = self.jobs.recv().await {
            match job {
                Job::Deliver { target, frame, kind } => {
                    let delivery = self.deliver(&target, &frame);
                    debug!(
                        "{} fan-out: {} delivered, {} dropped",
                        kind, delivery.delivered, delivery.dropped
                    );
                }
                #[cfg(any(test, feature = "test-util"))]
                Job::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("Broadcast worker stopped");
    }

    fn deliver(&self, target: &Target, frame: &OutboundFrame) -> Delivery {
        match target {
            Target::Channel(channel_id) => self.registry.deliver_to_channel(*channel_id, frame),
            Target::Users(user_ids) => self.registry.deliver_to_users(user_ids, frame),
            Target::All => self.registry.deliver_to_all(frame),
            Target::Connection(connection_id) => self.registry.deliver_to_connection(*connection_id, frame),
        }
    }
}

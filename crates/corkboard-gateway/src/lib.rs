pub mod broadcast;
pub mod connection;
pub mod error;
pub mod permissions;
pub mod registry;
pub mod sticky_notes;

pub use broadcast::{BroadcastWorker, Broadcaster};
pub use connection::{Gateway, Session, handle_connection};
pub use error::NoteError;
pub use registry::{ConnectionHandle, ConnectionId, ConnectionInfo, ConnectionRegistry};
pub use sticky_notes::{Actor, StickyNoteService};

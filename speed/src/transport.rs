//! The boundary between the processing stage and the sockets.
//!
//! The [`Application`](crate::Application) only ever names connections by id; whatever owns the
//! sockets implements [`Transport`] to carry out what it decides.

use crate::error::SendError;
use crate::message::Message;
use crate::{ConnectionId, HeartbeatInterval};

pub trait Transport {
    /// Queue a message for a connection without waiting for it to be written.
    ///
    /// [`SendError::Busy`] leaves the connection open; the transport reports back through
    /// [`Application::resume`](crate::Application::resume) once it has room again.
    fn send(&mut self, to: ConnectionId, message: Message) -> Result<(), SendError>;

    /// Start emitting `Heartbeat` frames every `interval` deciseconds. Zero means never.
    fn subscribe_heartbeat(&mut self, to: ConnectionId, interval: HeartbeatInterval);

    /// Close a connection once anything already queued for it has been written.
    fn close(&mut self, to: ConnectionId);
}

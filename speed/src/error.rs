use crate::ConnectionId;
use thiserror::Error;

/// Failures turning bytes into messages, or messages into bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("stream ended part way through a message")]
    TruncatedStream,
    #[error("malformed message")]
    MalformedMessage,
    #[error("unknown message type 0x{0:02x}")]
    UnknownMessageType(u8),
    #[error("string of {0} bytes does not fit a length prefix")]
    Encoding(usize),
}

/// A message that is not allowed from a client in its current state.
///
/// The display text is what gets sent back in the `Error` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("already identified")]
    AlreadyIdentified,
    #[error("not a known camera")]
    NotACamera,
    #[error("not a known client")]
    NotAClient,
    #[error("already requested heartbeats")]
    AlreadyBeating,
    #[error("not expecting clients to send this message")]
    ServerOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("could not deliver to connection {to}")]
pub struct DeliveryFailure {
    pub to: ConnectionId,
}

/// Why a message could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The connection is alive but its outbound queue is full; try again once it drains.
    #[error("connection {to} is not keeping up")]
    Busy { to: ConnectionId },
    #[error(transparent)]
    Failed(#[from] DeliveryFailure),
}

/// Anything that ends a client connection with an `Error` frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("could not deserialize message: {0}")]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
}

//! Speed limit enforcement over a compact binary TCP protocol.
//!
//! Cameras report plate sightings, the [`enforcement`] engine infers average speeds between
//! neighbouring sightings on the same road, and the [`router`] hands any resulting tickets to a
//! dispatcher responsible for that road (or holds them until one connects).
//!
//! All shared state lives in a single [`Application`], driven sequentially by the [`server`]'s
//! processing task. Connection tasks only decode bytes and write bytes.

use uuid::Uuid;

pub mod app;
pub mod codec;
pub mod enforcement;
pub mod error;
pub mod message;
pub mod models;
pub mod router;
pub mod server;
pub mod session;
pub mod transport;
pub(crate) mod utils;

pub use app::Application;
pub use message::Message;
pub use server::{Config, Server};

pub(crate) const MESSAGE_TYPE_ERROR: u8 = 0x10;
pub(crate) const MESSAGE_TYPE_PLATE: u8 = 0x20;
pub(crate) const MESSAGE_TYPE_TICKET: u8 = 0x21;
pub(crate) const MESSAGE_TYPE_WANT_HEARTBEAT: u8 = 0x40;
pub(crate) const MESSAGE_TYPE_HEARTBEAT: u8 = 0x41;
pub(crate) const MESSAGE_TYPE_AM_CAMERA: u8 = 0x80;
pub(crate) const MESSAGE_TYPE_AM_DISPATCHER: u8 = 0x81;

const SPEED_ERROR_MARGIN: f64 = 0.5;
const DAY_IN_SECONDS: u32 = 86_400;
const MAX_STRING_LENGTH: usize = u8::MAX as usize;

pub type ConnectionId = Uuid;
pub type RoadId = u16;
pub type MileMarker = u16;
pub type SpeedLimit = u16;
pub type Timestamp = u32;
pub type Day = u32;
/// Hundredths of a mile per hour, as carried by `Ticket` frames.
pub type RecordedSpeed = u16;
pub type SpeedMph = f64;
pub type HeartbeatInterval = u32;
pub type ByteString = Vec<u8>;
pub type PlateNumber = ByteString;

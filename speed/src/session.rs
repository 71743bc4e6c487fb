//! Per-connection identification and heartbeat state.
//!
//! A [`Session`] checks every decoded message against what the client has declared so far and
//! says what the rest of the system should do about it. It never touches shared state itself.

use crate::error::ProtocolViolation;
use crate::message::Message;
use crate::models::{Camera, Dispatcher, HeartbeatSubscription, Identity, Observation};
use crate::{HeartbeatInterval, RoadId, SpeedLimit};

/// What a valid inbound message asks of the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Identified,
    Observe { observation: Observation, limit: SpeedLimit },
    RegisterDispatcher { roads: Vec<RoadId> },
    SubscribeHeartbeat { interval: HeartbeatInterval },
}

#[derive(Debug, Default)]
pub struct Session {
    identity: Identity,
    heartbeat: Option<HeartbeatSubscription>,
}
impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn heartbeat(&self) -> Option<HeartbeatSubscription> {
        self.heartbeat
    }

    /// Apply one inbound message. Any error is fatal for the connection.
    pub fn handle(&mut self, message: Message) -> Result<Action, ProtocolViolation> {
        match message {
            Message::IAmCamera { road, mile, limit } => {
                if self.identity.is_identified() {
                    return Err(ProtocolViolation::AlreadyIdentified);
                }
                self.identity = Identity::Camera(Camera { road, mile, limit });
                Ok(Action::Identified)
            },
            Message::IAmDispatcher { roads } => {
                if self.identity.is_identified() {
                    return Err(ProtocolViolation::AlreadyIdentified);
                }
                let dispatcher = Dispatcher {
                    roads: roads.into_iter().collect(),
                };
                let roads = dispatcher.roads.iter().copied().collect();
                self.identity = Identity::Dispatcher(dispatcher);
                Ok(Action::RegisterDispatcher { roads })
            },
            Message::Plate { plate, timestamp } => match &self.identity {
                Identity::Camera(camera) => Ok(Action::Observe {
                    observation: Observation {
                        plate,
                        road: camera.road,
                        mile: camera.mile,
                        timestamp,
                    },
                    limit: camera.limit,
                }),
                _ => Err(ProtocolViolation::NotACamera),
            },
            Message::WantHeartbeat { interval } => {
                if !self.identity.is_identified() {
                    return Err(ProtocolViolation::NotAClient);
                }
                if self.heartbeat.is_some() {
                    return Err(ProtocolViolation::AlreadyBeating);
                }
                self.heartbeat = Some(HeartbeatSubscription { interval });
                Ok(Action::SubscribeHeartbeat { interval })
            },
            Message::Error { .. } | Message::Ticket(_) | Message::Heartbeat => Err(ProtocolViolation::ServerOnly),
        }
    }
}

use crate::{Day, HeartbeatInterval, MileMarker, PlateNumber, RecordedSpeed, RoadId, SpeedLimit, Timestamp, DAY_IN_SECONDS};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Camera {
    pub road: RoadId,
    pub mile: MileMarker,
    pub limit: SpeedLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatcher {
    pub roads: BTreeSet<RoadId>,
}

/// Who is on the other end of a connection. Set once, never changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Identity {
    #[default]
    Unidentified,
    Camera(Camera),
    Dispatcher(Dispatcher),
}
impl Identity {
    pub fn is_identified(&self) -> bool {
        !matches!(self, Self::Unidentified)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSubscription {
    /// Deciseconds between heartbeats; zero disables them.
    pub interval: HeartbeatInterval,
}

/// A single plate sighting reported by a camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub plate: PlateNumber,
    pub road: RoadId,
    pub mile: MileMarker,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub plate: PlateNumber,
    pub road: RoadId,
    pub mile1: MileMarker,
    pub timestamp1: Timestamp,
    pub mile2: MileMarker,
    pub timestamp2: Timestamp,
    pub speed: RecordedSpeed,
}
impl Ticket {
    pub fn first_day(&self) -> Day {
        day_of(self.timestamp1)
    }

    pub fn last_day(&self) -> Day {
        day_of(self.timestamp2)
    }
}

pub fn day_of(timestamp: Timestamp) -> Day {
    timestamp / DAY_IN_SECONDS
}

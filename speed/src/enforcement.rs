//! Observation storage, average speed checks and the once-per-day ticket rule.

use crate::models::{day_of, Observation, Ticket};
use crate::{Day, MileMarker, PlateNumber, RecordedSpeed, RoadId, SpeedLimit, SpeedMph, Timestamp, SPEED_ERROR_MARGIN};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

const SECONDS_PER_HOUR: f64 = 3600.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub timestamp: Timestamp,
    pub mile: MileMarker,
}
impl Record {
    /// Average speed between two records, `None` when no time passed between them.
    pub fn speed_to(&self, later: &Record) -> Option<SpeedMph> {
        let seconds = self.timestamp.abs_diff(later.timestamp);
        if seconds == 0 {
            return None;
        }
        let miles = f64::from(self.mile.abs_diff(later.mile));
        Some(miles * SECONDS_PER_HOUR / f64::from(seconds))
    }
}

/// Days on which each plate has already been ticketed, across every road.
#[derive(Debug, Default)]
pub struct TicketLedger {
    days_issued: HashMap<PlateNumber, BTreeSet<Day>>,
}
impl TicketLedger {
    pub fn is_ticketed(&self, plate: &[u8], day: Day) -> bool {
        self.days_issued.get(plate).is_some_and(|days| days.contains(&day))
    }

    /// Claim every day in `first..=last` for `plate`, or nothing if any of them is taken.
    pub fn claim(&mut self, plate: &[u8], first: Day, last: Day) -> bool {
        let days = self.days_issued.entry(plate.to_vec()).or_default();
        if days.range(first..=last).next().is_some() {
            return false;
        }
        days.extend(first..=last);
        true
    }
}

#[derive(Debug, Default)]
pub struct Enforcement {
    observations: HashMap<PlateNumber, HashMap<RoadId, Vec<Record>>>,
    ledger: TicketLedger,
}
impl Enforcement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an observation and return any tickets it newly justifies.
    ///
    /// Observations may arrive out of order, so the new record is checked against both of its
    /// neighbours in timestamp order rather than only the latest one.
    pub fn record_observation(&mut self, observation: Observation, limit: SpeedLimit) -> Vec<Ticket> {
        let Observation {
            plate,
            road,
            mile,
            timestamp,
        } = observation;
        let record = Record { timestamp, mile };
        let records = self.observations.entry(plate.clone()).or_default().entry(road).or_default();
        // Equal timestamps keep arrival order.
        let index = records.partition_point(|existing| existing.timestamp <= timestamp);
        records.insert(index, record);

        let mut pairs = Vec::with_capacity(2);
        if let Some(previous) = index.checked_sub(1).map(|i| records[i]) {
            pairs.push((previous, record));
        }
        if let Some(next) = records.get(index + 1) {
            pairs.push((record, *next));
        }

        let mut tickets = Vec::new();
        for (earlier, later) in pairs {
            let Some(speed) = earlier.speed_to(&later) else {
                continue;
            };
            if speed <= f64::from(limit) + SPEED_ERROR_MARGIN {
                continue;
            }
            if !self.ledger.claim(&plate, day_of(earlier.timestamp), day_of(later.timestamp)) {
                debug!(
                    "{} already ticketed for a day between {} and {}.",
                    String::from_utf8_lossy(&plate),
                    earlier.timestamp,
                    later.timestamp
                );
                continue;
            }
            debug!("{} averaged {speed:.2} mph on road {road} (limit {limit}).", String::from_utf8_lossy(&plate));
            tickets.push(Ticket {
                plate: plate.clone(),
                road,
                mile1: earlier.mile,
                timestamp1: earlier.timestamp,
                mile2: later.mile,
                timestamp2: later.timestamp,
                speed: to_recorded_speed(speed),
            });
        }
        tickets
    }

    pub fn observations(&self, plate: &[u8], road: RoadId) -> &[Record] {
        self.observations
            .get(plate)
            .and_then(|roads| roads.get(&road))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn ledger(&self) -> &TicketLedger {
        &self.ledger
    }
}

fn to_recorded_speed(speed: SpeedMph) -> RecordedSpeed {
    (speed * 100.0).round().min(f64::from(RecordedSpeed::MAX)) as RecordedSpeed
}

//! Which dispatchers cover which roads, and the tickets still waiting for one.
//!
//! Every ticket passes through its road's backlog. A ticket only leaves the front of the backlog
//! once a dispatcher has accepted it, so tickets for a road always go out in the order they were
//! issued, however many dispatchers come and go.

use crate::error::SendError;
use crate::message::Message;
use crate::models::Ticket;
use crate::transport::Transport;
use crate::{ConnectionId, RoadId};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct Router {
    dispatchers: HashMap<RoadId, Vec<ConnectionId>>,
    pending_tickets: HashMap<RoadId, VecDeque<Ticket>>,
}
impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dispatcher for `roads` and hand over every ticket waiting on them, oldest first.
    ///
    /// Returns the dispatchers that failed along the way; they are no longer registered.
    pub fn register_dispatcher<T: Transport>(
        &mut self,
        id: ConnectionId,
        roads: &[RoadId],
        transport: &mut T,
    ) -> Vec<ConnectionId> {
        for road in roads {
            let covering = self.dispatchers.entry(*road).or_default();
            if !covering.contains(&id) {
                covering.push(id);
            }
        }
        let mut failed = Vec::new();
        for road in roads {
            failed.extend(self.drain(*road, transport));
        }
        failed
    }

    pub fn unregister_dispatcher(&mut self, id: ConnectionId) {
        self.dispatchers.retain(|_, covering| {
            covering.retain(|dispatcher| *dispatcher != id);
            !covering.is_empty()
        });
    }

    /// Queue a ticket behind any others for its road and deliver as many as possible.
    ///
    /// Returns the dispatchers that failed to take it; they are no longer registered.
    pub fn route_ticket<T: Transport>(&mut self, ticket: Ticket, transport: &mut T) -> Vec<ConnectionId> {
        let road = ticket.road;
        self.pending_tickets.entry(road).or_default().push_back(ticket);
        self.drain(road, transport)
    }

    /// A dispatcher that was too busy has room again; carry on with the roads it covers.
    pub fn resume<T: Transport>(&mut self, id: ConnectionId, transport: &mut T) -> Vec<ConnectionId> {
        let roads: Vec<RoadId> = self
            .dispatchers
            .iter()
            .filter(|(_, covering)| covering.contains(&id))
            .map(|(road, _)| *road)
            .collect();
        let mut failed = Vec::new();
        for road in roads {
            failed.extend(self.drain(road, transport));
        }
        failed
    }

    pub fn dispatcher_for(&self, road: RoadId) -> Option<ConnectionId> {
        self.dispatchers.get(&road).and_then(|covering| covering.first()).copied()
    }

    pub fn pending(&self, road: RoadId) -> impl Iterator<Item = &Ticket> {
        self.pending_tickets.get(&road).into_iter().flatten()
    }

    /// Offer the front of a road's backlog to each of its dispatchers in turn until none can take it.
    fn drain<T: Transport>(&mut self, road: RoadId, transport: &mut T) -> Vec<ConnectionId> {
        let mut failed = Vec::new();
        let Some(mut pending) = self.pending_tickets.remove(&road) else {
            return failed;
        };
        'tickets: while let Some(ticket) = pending.front() {
            let covering = self.dispatchers.get(&road).cloned().unwrap_or_default();
            for to in covering {
                match transport.send(to, Message::Ticket(ticket.clone())) {
                    Ok(()) => {
                        debug!(
                            "Ticket for {} on road {road} sent to {to}.",
                            String::from_utf8_lossy(&ticket.plate)
                        );
                        pending.pop_front();
                        continue 'tickets;
                    },
                    Err(SendError::Busy { .. }) => debug!("Dispatcher {to} is busy; trying the next one."),
                    Err(SendError::Failed(failure)) => {
                        warn!("{failure}; unregistering dispatcher.");
                        self.unregister_dispatcher(to);
                        failed.push(to);
                    },
                }
            }
            break 'tickets;
        }
        if !pending.is_empty() {
            debug!("Holding {} tickets for road {road}.", pending.len());
            self.pending_tickets.insert(road, pending);
        }
        failed
    }
}

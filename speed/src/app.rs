//! The sequential processing stage.
//!
//! [`Application`] owns every registry in the system (sessions, observations, the ticket ledger
//! and the dispatch router) and is the only thing that mutates them. It is driven one event at a
//! time, and acts on connections only through a [`Transport`].

use crate::enforcement::Enforcement;
use crate::error::{ClientError, CodecError};
use crate::message::Message;
use crate::models::Ticket;
use crate::router::Router;
use crate::session::{Action, Session};
use crate::transport::Transport;
use crate::ConnectionId;
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct Application {
    sessions: HashMap<ConnectionId, Session>,
    enforcement: Enforcement,
    router: Router,
}
impl Application {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, id: ConnectionId) {
        self.sessions.insert(id, Session::new());
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn session(&self, id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn enforcement(&self) -> &Enforcement {
        &self.enforcement
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn handle_message<T: Transport>(&mut self, from: ConnectionId, message: Message, transport: &mut T) {
        let Some(session) = self.sessions.get_mut(&from) else {
            debug!("Ignoring {message:?} from closed connection {from}.");
            return;
        };
        debug!("{from}: {message:?}");
        match session.handle(message) {
            Err(violation) => self.fail(from, violation.into(), transport),
            Ok(Action::Identified) => info!("{from} identified as {:?}.", session.identity()),
            Ok(Action::Observe { observation, limit }) => {
                for ticket in self.enforcement.record_observation(observation, limit) {
                    self.route(ticket, transport);
                }
            },
            Ok(Action::RegisterDispatcher { roads }) => {
                info!("{from} identified as a dispatcher for roads {roads:?}.");
                for failed in self.router.register_dispatcher(from, &roads, transport) {
                    self.disconnect(failed, transport);
                }
            },
            Ok(Action::SubscribeHeartbeat { interval }) => transport.subscribe_heartbeat(from, interval),
        }
    }

    /// The connection sent bytes that could not be decoded.
    pub fn handle_codec_error<T: Transport>(&mut self, from: ConnectionId, error: CodecError, transport: &mut T) {
        self.fail(from, error.into(), transport);
    }

    /// Forget a connection without telling it anything: it hung up, or can no longer be written to.
    pub fn disconnect<T: Transport>(&mut self, id: ConnectionId, transport: &mut T) {
        if self.sessions.remove(&id).is_some() {
            info!("Dropping connection {id}...");
        }
        self.router.unregister_dispatcher(id);
        transport.close(id);
    }

    /// A connection that was too busy to take more messages has caught up.
    pub fn resume<T: Transport>(&mut self, id: ConnectionId, transport: &mut T) {
        if !self.sessions.contains_key(&id) {
            return;
        }
        for failed in self.router.resume(id, transport) {
            self.disconnect(failed, transport);
        }
    }

    /// Tickets that were queued for a connection but never written get another chance.
    pub fn reroute<T: Transport>(&mut self, tickets: Vec<Ticket>, transport: &mut T) {
        for ticket in tickets {
            self.route(ticket, transport);
        }
    }

    fn route<T: Transport>(&mut self, ticket: Ticket, transport: &mut T) {
        for failed in self.router.route_ticket(ticket, transport) {
            self.disconnect(failed, transport);
        }
    }

    fn fail<T: Transport>(&mut self, id: ConnectionId, error: ClientError, transport: &mut T) {
        if !self.sessions.contains_key(&id) {
            return;
        }
        warn!("ERROR ({id}): {error}");
        // Best effort; the connection is going either way.
        _ = transport.send(id, Message::error(&error));
        self.disconnect(id, transport);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Identity;
    use crate::transport::testing::RecordingTransport;
    use uuid::Uuid;

    struct Harness {
        app: Application,
        transport: RecordingTransport,
    }
    impl Harness {
        fn new() -> Self {
            Self {
                app: Application::new(),
                transport: RecordingTransport::default(),
            }
        }

        fn client(&mut self, messages: Vec<Message>) -> ConnectionId {
            let id = Uuid::new_v4();
            self.app.connect(id);
            for message in messages {
                self.send(id, message);
            }
            id
        }

        fn send(&mut self, from: ConnectionId, message: Message) {
            self.app.handle_message(from, message, &mut self.transport);
        }

        fn camera(&mut self, road: u16, mile: u16, limit: u16) -> ConnectionId {
            self.client(vec![Message::IAmCamera { road, mile, limit }])
        }

        fn plate(&mut self, camera: ConnectionId, plate: &str, timestamp: u32) {
            self.send(
                camera,
                Message::Plate {
                    plate: plate.as_bytes().to_vec(),
                    timestamp,
                },
            );
        }
    }

    fn un1x() -> Ticket {
        Ticket {
            plate: b"UN1X".to_vec(),
            road: 66,
            mile1: 8,
            timestamp1: 0,
            mile2: 9,
            timestamp2: 45,
            speed: 8000,
        }
    }

    #[test]
    fn test_camera_pair_tickets_dispatcher() {
        let mut harness = Harness::new();
        let first = harness.camera(66, 8, 60);
        let second = harness.camera(66, 9, 60);
        let dispatcher = harness.client(vec![Message::IAmDispatcher { roads: vec![66] }]);

        harness.plate(first, "UN1X", 0);
        harness.plate(second, "UN1X", 45);

        assert_eq!(vec![Message::Ticket(un1x())], harness.transport.sent_to(dispatcher));
        assert!(harness.transport.closed.is_empty());
    }

    #[test]
    fn test_ticket_emitted_once() {
        let mut harness = Harness::new();
        let first = harness.camera(66, 8, 60);
        let second = harness.camera(66, 9, 60);
        let third = harness.camera(66, 10, 60);
        let dispatcher = harness.client(vec![Message::IAmDispatcher { roads: vec![66] }]);

        harness.plate(first, "UN1X", 0);
        harness.plate(second, "UN1X", 45);
        harness.plate(third, "UN1X", 90);

        assert_eq!(1, harness.transport.sent_to(dispatcher).len());
    }

    #[test]
    fn test_backlog_delivered_on_registration() {
        let mut harness = Harness::new();
        let first = harness.camera(66, 8, 60);
        let second = harness.camera(66, 9, 60);
        for (day, plate) in ["AAA", "BBB", "CCC"].into_iter().enumerate() {
            let base = day as u32 * 86_400;
            harness.plate(first, plate, base);
            harness.plate(second, plate, base + 45);
        }
        assert_eq!(3, harness.app.router().pending(66).count());

        let dispatcher = harness.client(vec![Message::IAmDispatcher { roads: vec![66] }]);
        let plates: Vec<Vec<u8>> = harness
            .transport
            .sent_to(dispatcher)
            .into_iter()
            .map(|message| match message {
                Message::Ticket(ticket) => ticket.plate,
                other => panic!("Unexpected {other:?}"),
            })
            .collect();
        assert_eq!(vec![b"AAA".to_vec(), b"BBB".to_vec(), b"CCC".to_vec()], plates);
        assert_eq!(0, harness.app.router().pending(66).count());
    }

    #[test]
    fn test_plate_from_unidentified() {
        let mut harness = Harness::new();
        let stranger = harness.client(vec![]);
        harness.plate(stranger, "UN1X", 0);

        assert_eq!(vec![Message::error("not a known camera")], harness.transport.sent_to(stranger));
        assert_eq!(vec![stranger], harness.transport.closed);
        assert!(!harness.app.is_connected(stranger));
        assert!(harness.app.enforcement().observations(b"UN1X", 66).is_empty());
    }

    #[test]
    fn test_heartbeat_twice() {
        let mut harness = Harness::new();
        let camera = harness.camera(66, 8, 60);
        harness.send(camera, Message::WantHeartbeat { interval: 10 });
        assert_eq!(vec![(camera, 10)], harness.transport.heartbeats);
        assert!(harness.transport.closed.is_empty());

        harness.send(camera, Message::WantHeartbeat { interval: 10 });
        assert_eq!(vec![Message::error("already requested heartbeats")], harness.transport.sent_to(camera));
        assert_eq!(vec![camera], harness.transport.closed);
        assert_eq!(1, harness.transport.heartbeats.len());
    }

    #[test]
    fn test_dispatcher_cannot_become_camera() {
        let mut harness = Harness::new();
        let dispatcher = harness.client(vec![Message::IAmDispatcher { roads: vec![66] }]);
        harness.send(dispatcher, Message::IAmCamera { road: 66, mile: 1, limit: 60 });

        assert_eq!(vec![Message::error("already identified")], harness.transport.sent_to(dispatcher));
        assert_eq!(None, harness.app.router().dispatcher_for(66));
    }

    #[test]
    fn test_codec_error_fails_connection() {
        let mut harness = Harness::new();
        let client = harness.client(vec![]);
        harness.app.handle_codec_error(client, CodecError::UnknownMessageType(0x99), &mut harness.transport);

        assert_eq!(
            vec![Message::error("could not deserialize message: unknown message type 0x99")],
            harness.transport.sent_to(client)
        );
        assert_eq!(vec![client], harness.transport.closed);
    }

    #[test]
    fn test_messages_after_close_ignored() {
        let mut harness = Harness::new();
        let camera = harness.camera(66, 8, 60);
        harness.app.disconnect(camera, &mut harness.transport);
        harness.plate(camera, "UN1X", 0);

        assert!(harness.transport.sent.is_empty());
        assert!(harness.app.session(camera).is_none());
    }

    #[test]
    fn test_dispatcher_disconnect_queues_tickets() {
        let mut harness = Harness::new();
        let dispatcher = harness.client(vec![Message::IAmDispatcher { roads: vec![66] }]);
        assert!(matches!(
            harness.app.session(dispatcher).map(Session::identity),
            Some(Identity::Dispatcher(_))
        ));
        harness.app.disconnect(dispatcher, &mut harness.transport);

        let first = harness.camera(66, 8, 60);
        let second = harness.camera(66, 9, 60);
        harness.plate(first, "UN1X", 0);
        harness.plate(second, "UN1X", 45);

        assert!(harness.transport.sent.is_empty());
        assert_eq!(vec![&un1x()], harness.app.router().pending(66).collect::<Vec<_>>());
    }

    #[test]
    fn test_broken_dispatcher_is_dropped() {
        let mut harness = Harness::new();
        let broken = harness.client(vec![Message::IAmDispatcher { roads: vec![66] }]);
        harness.transport.break_after(broken, 0);

        let first = harness.camera(66, 8, 60);
        let second = harness.camera(66, 9, 60);
        harness.plate(first, "UN1X", 0);
        harness.plate(second, "UN1X", 45);

        assert_eq!(vec![broken], harness.transport.closed);
        assert!(!harness.app.is_connected(broken));
        assert_eq!(1, harness.app.router().pending(66).count());

        let replacement = harness.client(vec![Message::IAmDispatcher { roads: vec![66] }]);
        assert_eq!(vec![Message::Ticket(un1x())], harness.transport.sent_to(replacement));
    }

    #[test]
    fn test_backlog_larger_than_dispatcher_queue() {
        let mut harness = Harness::new();
        let first = harness.camera(66, 8, 60);
        let second = harness.camera(66, 9, 60);
        for (day, plate) in ["AAA", "BBB", "CCC"].into_iter().enumerate() {
            let base = day as u32 * 86_400;
            harness.plate(first, plate, base);
            harness.plate(second, plate, base + 45);
        }

        let dispatcher = Uuid::new_v4();
        harness.transport.fill_after(dispatcher, 2);
        harness.app.connect(dispatcher);
        harness.send(dispatcher, Message::IAmDispatcher { roads: vec![66] });
        assert_eq!(2, harness.transport.sent_to(dispatcher).len());
        assert!(harness.app.is_connected(dispatcher));
        assert!(harness.transport.closed.is_empty());

        harness.transport.drain(dispatcher);
        harness.app.resume(dispatcher, &mut harness.transport);
        let plates: Vec<Vec<u8>> = harness
            .transport
            .sent_to(dispatcher)
            .into_iter()
            .map(|message| match message {
                Message::Ticket(ticket) => ticket.plate,
                other => panic!("Unexpected {other:?}"),
            })
            .collect();
        assert_eq!(vec![b"AAA".to_vec(), b"BBB".to_vec(), b"CCC".to_vec()], plates);
        assert_eq!(0, harness.app.router().pending(66).count());
    }

    #[test]
    fn test_reroute_returned_tickets() {
        let mut harness = Harness::new();
        let dispatcher = harness.client(vec![Message::IAmDispatcher { roads: vec![66] }]);
        harness.app.reroute(vec![un1x()], &mut harness.transport);
        assert_eq!(vec![Message::Ticket(un1x())], harness.transport.sent_to(dispatcher));
    }
}

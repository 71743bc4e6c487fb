//! Sockets and tasks around the [`Application`].
//!
//! Every accepted connection gets a reader task that decodes frames and a writer task fed by a
//! bounded queue. All decoded frames funnel into one channel consumed by a single task that owns
//! the `Application`, so nothing else ever touches shared state. That task never waits on a
//! socket: a closed writer queue counts as a failed delivery, and a full one is retried once the
//! writer has made room.

use crate::app::Application;
use crate::error::{CodecError, DeliveryFailure, SendError};
use crate::message::Message;
use crate::models::Ticket;
use crate::transport::Transport;
use crate::utils::u8s_to_hex_str;
use crate::{ConnectionId, HeartbeatInterval};
use common::BUFFER_SIZE;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{
    tcp::{OwnedReadHalf, OwnedWriteHalf},
    TcpListener, TcpStream,
};
use tokio::sync::mpsc::{channel, error::TrySendError, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_EVENT_QUEUE: usize = 1024;
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Decoded frames waiting for the processing task, across all connections.
    pub event_queue: usize,
    /// Frames waiting to be written, per connection.
    pub outbound_queue: usize,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            event_queue: DEFAULT_EVENT_QUEUE,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
        }
    }
}

#[derive(Debug)]
enum Event {
    Accepted(TcpStream, SocketAddr),
    Received(ConnectionId, Message),
    Failed(ConnectionId, CodecError),
    Ended(ConnectionId),
    WriteFailed(ConnectionId, Vec<Ticket>),
    Writable(ConnectionId),
}

struct Connection {
    outbox: Sender<Message>,
    reader: JoinHandle<()>,
    heartbeat: Option<JoinHandle<()>>,
    /// Waiting for room in a full outbox.
    waiter: Option<JoinHandle<()>>,
}

struct Connections {
    open: HashMap<ConnectionId, Connection>,
    events: Sender<Event>,
    outbound_queue: usize,
}
impl Connections {
    fn new(events: Sender<Event>, outbound_queue: usize) -> Self {
        Self {
            open: HashMap::new(),
            events,
            outbound_queue,
        }
    }

    fn open(&mut self, stream: TcpStream) -> ConnectionId {
        let id = Uuid::new_v4();
        let (read_stream, write_stream) = stream.into_split();
        let (outbox, inbox) = channel(self.outbound_queue);
        tokio::spawn(write_messages(id, write_stream, inbox, self.events.clone()));
        let reader = tokio::spawn(read_messages(id, read_stream, self.events.clone()));
        self.open.insert(
            id,
            Connection {
                outbox,
                reader,
                heartbeat: None,
                waiter: None,
            },
        );
        id
    }

    fn writable(&mut self, id: ConnectionId) {
        if let Some(connection) = self.open.get_mut(&id) {
            connection.waiter = None;
        }
    }
}
impl Transport for Connections {
    fn send(&mut self, to: ConnectionId, message: Message) -> Result<(), SendError> {
        let connection = self.open.get_mut(&to).ok_or(DeliveryFailure { to })?;
        match connection.outbox.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(DeliveryFailure { to }.into()),
            Err(TrySendError::Full(_)) => {
                if connection.waiter.is_none() {
                    debug!("Outbox for {to} is full; waiting for the writer to catch up.");
                    let outbox = connection.outbox.clone();
                    let events = self.events.clone();
                    connection.waiter = Some(tokio::spawn(async move {
                        // Only a signal: the permit goes straight back so the stage can use the slot.
                        if outbox.reserve_owned().await.is_ok() {
                            _ = events.send(Event::Writable(to)).await;
                        }
                    }));
                }
                Err(SendError::Busy { to })
            },
        }
    }

    fn subscribe_heartbeat(&mut self, to: ConnectionId, interval: HeartbeatInterval) {
        if interval == 0 {
            return;
        }
        if let Some(connection) = self.open.get_mut(&to) {
            let period = Duration::from_millis(u64::from(interval) * 100);
            info!("Pinging {to} every {period:?}.");
            connection.heartbeat = Some(tokio::spawn(heartbeat(connection.outbox.clone(), period)));
        }
    }

    fn close(&mut self, to: ConnectionId) {
        // Dropping the outbox lets the writer flush what is queued, then shut the socket.
        if let Some(connection) = self.open.remove(&to) {
            connection.reader.abort();
            for task in [connection.heartbeat, connection.waiter].into_iter().flatten() {
                task.abort();
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Server {
    config: Config,
}
impl Server {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Serve forever on an already bound, non-blocking listener.
    pub async fn run(self, listener: std::net::TcpListener) -> std::io::Result<()> {
        let listener = TcpListener::from_std(listener)?;
        let (send_events, mut receive_events) = channel(self.config.event_queue);
        tokio::spawn(accept_connections(listener, send_events.clone()));

        let mut application = Application::new();
        let mut connections = Connections::new(send_events, self.config.outbound_queue);
        while let Some(event) = receive_events.recv().await {
            match event {
                Event::Accepted(stream, address) => {
                    let id = connections.open(stream);
                    info!("Accepting new connection {id} from {address}...");
                    application.connect(id);
                },
                Event::Received(id, message) => application.handle_message(id, message, &mut connections),
                Event::Failed(id, error) => application.handle_codec_error(id, error, &mut connections),
                Event::Ended(id) => application.disconnect(id, &mut connections),
                Event::WriteFailed(id, tickets) => {
                    application.disconnect(id, &mut connections);
                    application.reroute(tickets, &mut connections);
                },
                Event::Writable(id) => {
                    connections.writable(id);
                    application.resume(id, &mut connections);
                },
            }
        }
        Ok(())
    }
}

async fn accept_connections(listener: TcpListener, events: Sender<Event>) {
    'accept: loop {
        match listener.accept().await {
            Ok((stream, address)) => {
                if events.send(Event::Accepted(stream, address)).await.is_err() {
                    break 'accept;
                }
            },
            Err(err) => warn!("Incoming TCP connection errored... {err:?}"),
        }
    }
}

async fn read_messages(id: ConnectionId, mut stream: OwnedReadHalf, events: Sender<Event>) {
    let mut buffer = [0u8; BUFFER_SIZE];
    let mut queue: Vec<u8> = Vec::new();
    let end = 'read: loop {
        match stream.read(&mut buffer).await {
            // See https://doc.rust-lang.org/std/io/trait.Read.html#tymethod.read
            Ok(0) if queue.is_empty() => break 'read Event::Ended(id),
            Ok(0) => break 'read Event::Failed(id, CodecError::TruncatedStream),
            Ok(n) => {
                queue.extend_from_slice(&buffer[..n]);
                debug!("{id} <<< {}", u8s_to_hex_str(&buffer[..n]));
                'parse: loop {
                    match Message::decode(&queue) {
                        // Not enough data has been received yet, go back and fetch more.
                        Ok(None) => break 'parse,
                        Ok(Some((message, drain))) => {
                            queue.drain(..drain);
                            if events.send(Event::Received(id, message)).await.is_err() {
                                return;
                            }
                        },
                        Err(err) => break 'read Event::Failed(id, err),
                    }
                }
            },
            Err(err) => {
                warn!("Reading from {id} failed: {err}");
                break 'read Event::Ended(id);
            },
        }
    };
    _ = events.send(end).await;
}

async fn write_messages(id: ConnectionId, mut stream: OwnedWriteHalf, mut inbox: Receiver<Message>, events: Sender<Event>) {
    let mut output: Vec<u8> = Vec::new();
    while let Some(message) = inbox.recv().await {
        output.clear();
        if let Err(err) = message.encode(&mut output) {
            warn!("Could not encode {message:?} for {id}: {err}");
            continue;
        }
        debug!("{id} >>> {}", u8s_to_hex_str(&output));
        if let Err(err) = stream.write_all(&output).await {
            warn!("Shutdown connection {id} due to write error: {err}");
            inbox.close();
            let mut undelivered: Vec<Ticket> = Vec::new();
            for message in std::iter::once(message).chain(std::iter::from_fn(|| inbox.try_recv().ok())) {
                if let Message::Ticket(ticket) = message {
                    undelivered.push(ticket);
                }
            }
            _ = events.send(Event::WriteFailed(id, undelivered)).await;
            return;
        }
    }
    _ = stream.shutdown().await;
}

async fn heartbeat(outbox: Sender<Message>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    'heartbeat: loop {
        ticker.tick().await;
        if outbox.send(Message::Heartbeat).await.is_err() {
            break 'heartbeat;
        }
    }
}

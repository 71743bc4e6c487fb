extern crate speed;

use clap::Parser;
use common::{bind_listener, DEFAULT_HOST, DEFAULT_PORT};
use speed::server::{DEFAULT_EVENT_QUEUE, DEFAULT_OUTBOUND_QUEUE};
use speed::{Config, Server};
use std::net::IpAddr;
use tracing_subscriber::EnvFilter;

/// Speed limit enforcement daemon.
///
/// Log verbosity follows `RUST_LOG` (defaults to `info`).
#[derive(Debug, Parser)]
#[command(name = "speed", version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value_t = DEFAULT_HOST)]
    host: IpAddr,
    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Decoded messages that may wait for processing before readers are slowed down.
    #[arg(long, default_value_t = DEFAULT_EVENT_QUEUE)]
    event_queue: usize,
    /// Messages that may wait to be written to a single client before it is dropped.
    #[arg(long, default_value_t = DEFAULT_OUTBOUND_QUEUE)]
    outbound_queue: usize,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let listener = bind_listener(args.host, Some(args.port))?;
    Server::new(Config {
        event_queue: args.event_queue.max(1),
        outbound_queue: args.outbound_queue.max(1),
    })
    .run(listener)
    .await
}

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use tracing::info;

pub const BUFFER_SIZE: usize = 4096;
pub const DEFAULT_PORT: u16 = 8096;
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Bind a non-blocking listener, ready to be handed to an async runtime.
///
/// Port `0` asks the operating system for any free port; read it back with
/// [`TcpListener::local_addr`].
pub fn bind_listener(host: IpAddr, port: Option<u16>) -> std::io::Result<TcpListener> {
    let address = SocketAddr::new(host, port.unwrap_or(DEFAULT_PORT));
    let listener = TcpListener::bind(address)?;
    listener.set_nonblocking(true)?;
    info!("Listening to connections on {}...", listener.local_addr()?);
    Ok(listener)
}

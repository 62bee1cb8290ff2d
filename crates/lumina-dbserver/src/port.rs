//! TCP port selection for platforms without Unix domain sockets.

use std::net::TcpListener;

use tracing::warn;

const HOST: &str = "127.0.0.1";

/// Port the server listens on when no conflict exists.
pub const DEFAULT_SERVER_PORT: u16 = 3307;

/// Pick a listening port for the server, preferring `preferred`.
///
/// Availability is tested by binding the port; the listener is
/// released immediately. On conflict an OS-assigned ephemeral port is
/// chosen instead, and the caller must remember it for the client
/// probe and the later shutdown command.
pub fn pick_server_port(preferred: u16) -> std::io::Result<u16> {
    if TcpListener::bind((HOST, preferred)).is_ok() {
        return Ok(preferred);
    }

    warn!("Port {preferred} not free for the database server");

    let listener = TcpListener::bind((HOST, 0))?;
    let port = listener.local_addr()?.port();

    warn!("Using free port {port} instead");

    Ok(port)
}

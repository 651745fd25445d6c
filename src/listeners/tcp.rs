// src/listeners/tcp.rs
// Low-level TCP bind, kept apart so TLS stays a property of the listener.

use std::io;
use std::net::TcpListener;

/// Bind a non-blocking TCP listener. `addr` is `host:port`; hostnames are
/// resolved and the first address that binds wins.
pub fn new_tcp_socket(addr: &str) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

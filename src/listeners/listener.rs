// src/listeners/listener.rs
use std::io;
use std::net::TcpListener;
use std::os::unix::io::IntoRawFd;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};

use crate::address::Protocol;
use crate::tls::TlsCapability;

#[derive(Debug)]
pub enum ListenerKind {
    Tcp(TcpListener),
    Unix(UnixListener),
}

/// A bound, listening socket plus the TLS capability its connections must be
/// wrapped with, if any.
#[derive(Debug)]
pub struct Listener {
    kind: ListenerKind,
    tls: Option<TlsCapability>,
    socket_file: Option<PathBuf>,
}

/// Listeners produced by one factory call. The caller owns all of them.
pub type ListenerSet = Vec<Listener>;

impl Listener {
    pub fn tcp(listener: TcpListener) -> Self {
        Self {
            kind: ListenerKind::Tcp(listener),
            tls: None,
            socket_file: None,
        }
    }

    pub fn unix(listener: UnixListener) -> Self {
        Self {
            kind: ListenerKind::Unix(listener),
            tls: None,
            socket_file: None,
        }
    }

    pub fn with_tls(mut self, tls: Option<TlsCapability>) -> Self {
        self.tls = tls;
        self
    }

    /// Mark `path` as a socket file created for this listener. Whoever ends
    /// up owning the listener is expected to unlink it.
    pub fn with_socket_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_file = Some(path.into());
        self
    }

    /// The socket file created for this listener. Inherited sockets have
    /// none.
    pub fn socket_file(&self) -> Option<&Path> {
        self.socket_file.as_deref()
    }

    pub fn set_tls(&mut self, tls: TlsCapability) {
        self.tls = Some(tls);
    }

    pub fn tls(&self) -> Option<&TlsCapability> {
        self.tls.as_ref()
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    pub fn protocol(&self) -> Protocol {
        match self.kind {
            ListenerKind::Tcp(_) => Protocol::Tcp,
            ListenerKind::Unix(_) => Protocol::Unix,
        }
    }

    pub fn kind(&self) -> &ListenerKind {
        &self.kind
    }

    pub fn into_parts(self) -> (ListenerKind, Option<TlsCapability>) {
        (self.kind, self.tls)
    }

    /// Printable local address: `ip:port` or the socket path.
    pub fn local_addr(&self) -> io::Result<String> {
        match &self.kind {
            ListenerKind::Tcp(l) => Ok(l.local_addr()?.to_string()),
            ListenerKind::Unix(l) => Ok(l
                .local_addr()?
                .as_pathname()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(unnamed)".to_string())),
        }
    }

    /// Close the socket, reporting the error `drop` would swallow.
    pub fn close(self) -> io::Result<()> {
        let fd = match self.kind {
            ListenerKind::Tcp(l) => l.into_raw_fd(),
            ListenerKind::Unix(l) => l.into_raw_fd(),
        };
        // SAFETY: `fd` was just released by its only owner and is closed once.
        if unsafe { libc::close(fd) } == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

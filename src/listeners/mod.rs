// src/listeners/mod.rs
//! Turns canonical host strings into bound listeners.
//!
//! Everything here runs synchronously at startup. The factory never keeps a
//! handle once it has returned it; collaborators (group database, runtime
//! directory, socket activation, diagnostics) are injected so the
//! side-effecting parts can be swapped out.

mod activation;
mod diagnostics;
mod error;
mod listener;
mod tcp;
mod unix;

pub use activation::{
    activated_fd_count, adopt_fd, select_activated, ActivatedHandle, ActivationSource,
    SystemdActivation, LISTEN_FDS_START,
};
pub use diagnostics::{CollectedDiagnostics, Diagnostic, DiagnosticSink, TracingDiagnostics};
pub use error::ListenerError;
pub use listener::{Listener, ListenerKind, ListenerSet};
pub use tcp::new_tcp_socket;
pub use unix::{
    current_gid, new_unix_socket, remove_socket_files, GroupResolver, SystemGroups, SOCKET_MODE,
};

use std::path::Path;

use tracing::{debug, info};

use crate::address::{parse_host, split_proto_addr, Protocol};
use crate::config::Defaults;
use crate::runtime_dir::{RuntimeDir, XdgRuntimeDir};
use crate::tls::TlsCapability;

/// How [`ListenerFactory::init_hosts`] fills in and secures host strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostOptions<'a> {
    pub socket_group: &'a str,
    pub tls: Option<&'a TlsCapability>,
    /// Default to a socket in the user's runtime directory.
    pub rootless: bool,
}

pub struct ListenerFactory {
    defaults: Defaults,
    groups: Box<dyn GroupResolver>,
    runtime_dir: Box<dyn RuntimeDir>,
    activation: Box<dyn ActivationSource>,
    diagnostics: Box<dyn DiagnosticSink>,
}

impl ListenerFactory {
    /// A factory backed by the real system: group database,
    /// `$XDG_RUNTIME_DIR` and `tracing` warnings. No activated sockets are
    /// available until [`SystemdActivation::from_env`] is handed to
    /// [`with_activation`](Self::with_activation).
    pub fn new(defaults: Defaults) -> Self {
        Self {
            defaults,
            groups: Box::new(SystemGroups),
            runtime_dir: Box::new(XdgRuntimeDir),
            activation: Box::new(SystemdActivation::default()),
            diagnostics: Box::new(TracingDiagnostics),
        }
    }

    pub fn with_groups(mut self, groups: impl GroupResolver + 'static) -> Self {
        self.groups = Box::new(groups);
        self
    }

    pub fn with_runtime_dir(mut self, runtime_dir: impl RuntimeDir + 'static) -> Self {
        self.runtime_dir = Box::new(runtime_dir);
        self
    }

    pub fn with_activation(mut self, activation: impl ActivationSource + 'static) -> Self {
        self.activation = Box::new(activation);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: impl DiagnosticSink + 'static) -> Self {
        self.diagnostics = Box::new(diagnostics);
        self
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// Create the listeners for one address.
    ///
    /// `addr` is the part after `proto://` of a canonical host. `socket_group`
    /// only matters for Unix sockets; `tls` marks TCP and activated listeners
    /// as TLS terminating.
    pub fn init(
        &self,
        proto: Protocol,
        addr: &str,
        socket_group: &str,
        tls: Option<&TlsCapability>,
    ) -> Result<ListenerSet, ListenerError> {
        match proto {
            Protocol::Fd => self.listen_fd(addr, tls),
            Protocol::Tcp => {
                let listener = new_tcp_socket(addr).map_err(ListenerError::bind(proto, addr))?;
                Ok(vec![Listener::tcp(listener).with_tls(tls.cloned())])
            }
            Protocol::Unix => self.listen_unix(addr, socket_group),
            Protocol::Npipe => Err(ListenerError::InvalidProtocol(proto.to_string())),
        }
    }

    /// [`init`](Self::init) for a canonical `proto://addr` string.
    pub fn init_host(
        &self,
        host: &str,
        socket_group: &str,
        tls: Option<&TlsCapability>,
    ) -> Result<ListenerSet, ListenerError> {
        let (proto, addr) = split_proto_addr(host)?;
        self.init(proto.parse()?, addr, socket_group, tls)
    }

    /// Resolve every requested host and bind it. No hosts means one default
    /// host.
    ///
    /// When a host fails, the socket files created for the hosts before it
    /// are removed again.
    pub fn init_hosts(
        &self,
        hosts: &[String],
        options: HostOptions<'_>,
    ) -> Result<ListenerSet, ListenerError> {
        let default_hosts = [String::new()];
        let hosts = if hosts.is_empty() { &default_hosts[..] } else { hosts };

        let mut all = Vec::new();
        for raw in hosts {
            match self.init_raw_host(raw, options) {
                Ok(listeners) => all.extend(listeners),
                Err(err) => {
                    remove_socket_files(all.iter().filter_map(Listener::socket_file));
                    return Err(err);
                }
            }
        }

        Ok(all)
    }

    fn init_raw_host(
        &self,
        raw: &str,
        options: HostOptions<'_>,
    ) -> Result<ListenerSet, ListenerError> {
        let host = parse_host(
            &self.defaults,
            self.runtime_dir.as_ref(),
            options.tls.is_some(),
            options.rootless,
            raw,
        )?;
        let (proto, addr) = split_proto_addr(&host)?;
        let proto: Protocol = proto.parse()?;

        if proto == Protocol::Tcp && options.tls.is_none() {
            self.diagnostics.emit(Diagnostic::InsecureTcp {
                addr: addr.to_string(),
            });
        }

        let listeners = self.init(proto, addr, options.socket_group, options.tls)?;
        for listener in &listeners {
            info!(
                %proto,
                addr = %listener.local_addr().unwrap_or_else(|_| addr.to_string()),
                tls = listener.is_tls(),
                "API listen on {}",
                host
            );
        }
        Ok(listeners)
    }

    fn listen_unix(&self, addr: &str, socket_group: &str) -> Result<ListenerSet, ListenerError> {
        let gid = match self.groups.lookup_gid(socket_group) {
            Ok(gid) => gid,
            Err(err) => {
                if !socket_group.is_empty() {
                    if socket_group != self.defaults.socket_group {
                        return Err(ListenerError::GroupResolution {
                            group: socket_group.to_string(),
                            source: err,
                        });
                    }
                    self.diagnostics.emit(Diagnostic::GroupFallback {
                        addr: addr.to_string(),
                        group: socket_group.to_string(),
                        error: err.to_string(),
                    });
                }
                current_gid()
            }
        };

        let listener =
            new_unix_socket(addr, gid).map_err(ListenerError::bind(Protocol::Unix, addr))?;
        debug!(addr, gid, "Created unix socket");

        if let Err(err) = self.runtime_dir.stick_contents(&[Path::new(addr)]) {
            self.diagnostics.emit(Diagnostic::StickyBitFailed {
                addr: addr.to_string(),
                error: err.to_string(),
            });
        }

        Ok(vec![Listener::unix(listener).with_socket_file(addr)])
    }

    fn listen_fd(
        &self,
        selector: &str,
        tls: Option<&TlsCapability>,
    ) -> Result<ListenerSet, ListenerError> {
        let mut inventory = self
            .activation
            .listeners()
            .map_err(ListenerError::Activation)?;
        if let Some(tls) = tls {
            for listener in inventory.iter_mut().flatten() {
                listener.set_tls(tls.clone());
            }
        }
        select_activated(selector, inventory)
    }
}

// src/config/models.rs
use anyhow::{bail, Result};
use serde::Deserialize;

use crate::address::validate_host;

/// IANA registered plaintext port.
pub const DEFAULT_HTTP_PORT: u16 = 2375;
/// IANA registered TLS port.
pub const DEFAULT_TLS_HTTP_PORT: u16 = 2376;

/// Fallback addresses used to fill in whatever a host string leaves out.
///
/// Built once at startup and handed to the parser and the listener factory
/// by reference; nothing in the crate mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub http_host: String,
    pub http_port: u16,
    pub tls_http_port: u16,
    pub unix_socket: String,
    pub named_pipe: String,
    pub socket_group: String,
    /// File name of the socket created under the user's runtime directory.
    pub runtime_socket_name: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            http_host: if cfg!(windows) { "127.0.0.1" } else { "localhost" }.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            tls_http_port: DEFAULT_TLS_HTTP_PORT,
            unix_socket: "/var/run/listenerd.sock".to_string(),
            named_pipe: "//./pipe/listenerd_engine".to_string(),
            socket_group: "listenerd".to_string(),
            runtime_socket_name: "listenerd.sock".to_string(),
        }
    }
}

impl Defaults {
    /// `tcp://host:port` for plaintext listeners.
    pub fn tcp_host(&self) -> String {
        format!("tcp://{}:{}", self.http_host, self.http_port)
    }

    /// `tcp://host:port` for TLS listeners.
    pub fn tls_host(&self) -> String {
        format!("tcp://{}:{}", self.http_host, self.tls_http_port)
    }

    pub fn unix_host(&self) -> String {
        format!("unix://{}", self.unix_socket)
    }

    pub fn npipe_host(&self) -> String {
        format!("npipe://{}", self.named_pipe)
    }

    /// The host used when nothing was requested: the Unix socket on POSIX
    /// targets, the named pipe on Windows.
    pub fn default_host(&self) -> String {
        if cfg!(windows) {
            self.npipe_host()
        } else {
            self.unix_host()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TlsSettings {
    /// PEM encoded certificate chain.
    pub cert_path: String,
    /// PEM encoded PKCS#8 private key.
    pub key_path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Requested bind addresses. Empty means "one default host".
    pub hosts: Vec<String>,
    /// Group owning created Unix sockets. `None` means the default group.
    pub socket_group: Option<String>,
    pub tls: Option<TlsSettings>,
    /// Default to a socket under `$XDG_RUNTIME_DIR` instead of the system path.
    pub rootless: bool,
    pub defaults: Defaults,
}

impl DaemonConfig {
    pub fn validate(&self) -> Result<()> {
        for host in &self.hosts {
            validate_host(&self.defaults, host)?;
        }

        if let Some(tls) = &self.tls {
            if tls.cert_path.trim().is_empty() {
                bail!("tls.cert_path must not be empty");
            }
            if tls.key_path.trim().is_empty() {
                bail!("tls.key_path must not be empty");
            }
        }

        if self.defaults.runtime_socket_name.contains('/') {
            bail!(
                "defaults.runtime_socket_name must be a bare file name: {}",
                self.defaults.runtime_socket_name
            );
        }

        Ok(())
    }

    /// The group name handed to the listener factory.
    pub fn socket_group(&self) -> &str {
        self.socket_group
            .as_deref()
            .unwrap_or(&self.defaults.socket_group)
    }
}

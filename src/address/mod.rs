// src/address/mod.rs
//! Host string parsing.
//!
//! Accepted forms are `tcp://[host][:port][/path]`, `unix://path`,
//! `npipe://path`, `fd://[selector]` and a bare `host[:port]`, which means
//! TCP. Everything that leaves this module is fully qualified.

mod error;
mod parser;
mod protocol;
mod tcp;

pub use error::{AddressError, HostError};
pub use parser::{
    parse_daemon_host, parse_host, parse_simple_proto_addr, split_proto_addr, validate_host,
};
pub use protocol::{ParseProtocolError, Protocol};
pub use tcp::{join_host_port, parse_tcp_addr, split_host_port};

use std::fmt;

use crate::config::Defaults;
use tcp::TcpUrl;

/// A parsed, fully qualified host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Tcp {
        host: String,
        port: String,
        /// Path suffix, kept verbatim. Usually empty.
        path: String,
    },
    Unix(String),
    Npipe(String),
    /// Socket activation selector: empty, `*` or a descriptor number.
    Fd(String),
}

impl Address {
    /// Parse any accepted host string, filling gaps from `defaults`.
    pub fn parse(defaults: &Defaults, raw: &str) -> Result<Self, AddressError> {
        let canonical = parse_daemon_host(defaults, raw.trim())?;
        Self::from_canonical(&canonical)
    }

    /// Build the tagged form of an already canonical `proto://addr` string.
    pub fn from_canonical(canonical: &str) -> Result<Self, AddressError> {
        let (proto, rest) = split_proto_addr(canonical)?;
        let proto = proto
            .parse::<Protocol>()
            .map_err(|_| AddressError::InvalidAddressFormat(canonical.to_string()))?;

        match proto {
            Protocol::Tcp => {
                let invalid = || AddressError::InvalidBindAddress(canonical.to_string());
                let url = TcpUrl::parse(rest).map_err(|_| invalid())?;
                let (host, port) = split_host_port(&url.host).map_err(|_| invalid())?;
                Ok(Address::Tcp {
                    host: host.to_string(),
                    port: port.to_string(),
                    path: url.path.to_string(),
                })
            }
            Protocol::Unix => Ok(Address::Unix(rest.to_string())),
            Protocol::Npipe => Ok(Address::Npipe(rest.to_string())),
            Protocol::Fd => Ok(Address::Fd(rest.to_string())),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Address::Tcp { .. } => Protocol::Tcp,
            Address::Unix(_) => Protocol::Unix,
            Address::Npipe(_) => Protocol::Npipe,
            Address::Fd(_) => Protocol::Fd,
        }
    }

    /// Everything after `proto://`.
    pub fn payload(&self) -> String {
        match self {
            Address::Tcp { host, port, path } => format!("{}{}", join_host_port(host, port), path),
            Address::Unix(path) | Address::Npipe(path) => path.clone(),
            Address::Fd(selector) => selector.clone(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol(), self.payload())
    }
}

// src/address/protocol.rs
use std::fmt;
use std::str::FromStr;

/// Transport a host string can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Unix,
    Npipe,
    /// Sockets inherited through socket activation.
    Fd,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Unix => "unix",
            Protocol::Npipe => "npipe",
            Protocol::Fd => "fd",
        }
    }

    /// `"<proto>://"`
    pub fn prefix(self) -> String {
        format!("{}://", self.as_str())
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid protocol format: {0:?}")]
pub struct ParseProtocolError(pub String);

impl FromStr for Protocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Protocol::Tcp),
            "unix" => Ok(Protocol::Unix),
            "npipe" => Ok(Protocol::Npipe),
            "fd" => Ok(Protocol::Fd),
            other => Err(ParseProtocolError(other.to_string())),
        }
    }
}

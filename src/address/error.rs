// src/address/error.rs
use super::Protocol;
use crate::runtime_dir::RuntimeDirError;

#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("invalid bind address format: {0}")]
    InvalidAddressFormat(String),

    /// A scheme separator showed up where only a path or host:port belongs.
    #[error("invalid proto, expected {expected}: {addr}")]
    InvalidProto { expected: Protocol, addr: String },

    #[error("invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("invalid default address {addr}: {reason}")]
    InvalidDefault { addr: String, reason: &'static str },

    #[error("bad format {0}, expected PROTO://ADDR")]
    MissingProtocol(String),

    #[error(transparent)]
    RuntimeDir(#[from] RuntimeDirError),
}

/// A host string that could not be resolved.
///
/// Always carries the input exactly as the user typed it.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct HostError {
    pub input: String,
    #[source]
    pub source: AddressError,
}

impl HostError {
    pub fn new(input: impl Into<String>, source: AddressError) -> Self {
        Self {
            input: input.into(),
            source,
        }
    }
}

// src/listeners/error.rs
use std::io;

use crate::address::{AddressError, HostError, ParseProtocolError, Protocol};

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("invalid protocol format: {0:?}")]
    InvalidProtocol(String),

    #[error("no sockets found via socket activation: make sure the service was started by systemd")]
    NoActivatedSockets,

    #[error("failed to parse activated fd address: should be a number: {0}")]
    InvalidSelector(String),

    #[error("failed to listen on activated file: fd {fd}")]
    ActivatedSocketNotFound { fd: usize },

    #[error("failed to close activated file: fd {fd}: {source}")]
    ActivationCleanupFailed {
        fd: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to collect activated sockets: {0}")]
    Activation(#[source] io::Error),

    #[error("can't create {proto} socket {addr}: {source}")]
    Bind {
        proto: Protocol,
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("can't resolve socket group {group}: {source}")]
    GroupResolution {
        group: String,
        #[source]
        source: io::Error,
    },
}

impl From<ParseProtocolError> for ListenerError {
    fn from(err: ParseProtocolError) -> Self {
        ListenerError::InvalidProtocol(err.0)
    }
}

impl ListenerError {
    pub(crate) fn bind(proto: Protocol, addr: &str) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| ListenerError::Bind {
            proto,
            addr: addr.to_string(),
            source,
        }
    }
}

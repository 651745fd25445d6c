// src/server/daemon.rs
use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;

use crate::config::DaemonConfig;
use crate::listeners::{
    remove_socket_files, HostOptions, Listener, ListenerError, ListenerFactory, ListenerSet,
};
use crate::server::{PingHandler, ServerBuilder};
use crate::tls::TlsCapability;

/// The bound listeners of one daemon run, plus the socket files they own.
///
/// Socket files are unlinked when [`run`](Self::run) returns, so the next
/// start can bind the same paths.
pub struct Daemon {
    listeners: ListenerSet,
    socket_files: Vec<PathBuf>,
}

impl Daemon {
    /// Bind every host of `config`.
    pub fn bind(
        factory: &ListenerFactory,
        config: &DaemonConfig,
        tls: Option<&TlsCapability>,
    ) -> Result<Self, ListenerError> {
        let listeners = factory.init_hosts(
            &config.hosts,
            HostOptions {
                socket_group: config.socket_group(),
                tls,
                rootless: config.rootless,
            },
        )?;
        let socket_files = listeners
            .iter()
            .filter_map(Listener::socket_file)
            .map(Path::to_path_buf)
            .collect();

        Ok(Self {
            listeners,
            socket_files,
        })
    }

    pub fn socket_files(&self) -> &[PathBuf] {
        &self.socket_files
    }

    /// Serve `/_ping` until `shutdown` resolves or a listener fails.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Daemon {
            listeners,
            socket_files,
        } = self;

        let server = ServerBuilder::new(listeners)
            .with_handler(PingHandler::new())
            .serve();

        let result = tokio::select! {
            result = server => result,
            _ = shutdown => {
                info!("Shutting down");
                Ok(())
            }
        };

        remove_socket_files(socket_files.iter().map(PathBuf::as_path));
        result
    }
}

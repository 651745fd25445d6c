// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use anyhow::{bail, Context, Result};
use hyper::{server::conn::Http, Body, Request, Response};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio::task::JoinSet;
use tower::Service;

use crate::listeners::{Listener, ListenerKind, ListenerSet};
use crate::tls::TlsCapability;

/// Serves one handler on every listener of a [`ListenerSet`].
pub struct ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    listeners: ListenerSet,
    handler: Option<H>,
}

impl<H> ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    pub fn new(listeners: ListenerSet) -> Self {
        Self {
            listeners,
            handler: None,
        }
    }

    pub fn with_handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Hand every listener to tokio and accept until one of them fails.
    /// Dropping the returned future stops every accept loop.
    pub async fn serve(self) -> Result<()> {
        let handler = self
            .handler
            .context("handler must be set via with_handler()")?;
        if self.listeners.is_empty() {
            bail!("no listeners to serve");
        }

        let mut tasks = JoinSet::new();
        for listener in self.listeners {
            let addr = listener
                .local_addr()
                .unwrap_or_else(|_| "unknown".to_string());
            let tls = listener.is_tls();
            let incoming = Incoming::from_listener(listener)
                .with_context(|| format!("failed to register listener {addr}"))?;
            tracing::info!(%addr, tls, "HTTP server listening");

            tasks.spawn(incoming.accept_loop(handler.clone()));
        }

        match tasks.join_next().await {
            Some(finished) => finished.context("accept loop panicked")?,
            None => Ok(()),
        }
    }
}

enum Incoming {
    Tcp(TcpListener, Option<TlsCapability>),
    Unix(UnixListener, Option<TlsCapability>),
}

impl Incoming {
    fn from_listener(listener: Listener) -> std::io::Result<Self> {
        let (kind, tls) = listener.into_parts();
        Ok(match kind {
            ListenerKind::Tcp(l) => {
                l.set_nonblocking(true)?;
                Incoming::Tcp(TcpListener::from_std(l)?, tls)
            }
            ListenerKind::Unix(l) => {
                l.set_nonblocking(true)?;
                Incoming::Unix(UnixListener::from_std(l)?, tls)
            }
        })
    }

    async fn accept_loop<H>(self, handler: H) -> Result<()>
    where
        H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
        H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
        H::Future: Send + 'static,
    {
        loop {
            match &self {
                Incoming::Tcp(listener, tls) => {
                    let (stream, peer) = listener.accept().await?;
                    tokio::spawn(serve_connection(
                        stream,
                        tls.clone(),
                        handler.clone(),
                        peer.to_string(),
                    ));
                }
                Incoming::Unix(listener, tls) => {
                    let (stream, _) = listener.accept().await?;
                    tokio::spawn(serve_connection(
                        stream,
                        tls.clone(),
                        handler.clone(),
                        "unix".to_string(),
                    ));
                }
            }
        }
    }
}

async fn serve_connection<S, H>(stream: S, tls: Option<TlsCapability>, svc: H, peer: String)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    H: Service<Request<Body>, Response = Response<Body>> + Send + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    let http = Http::new();
    let result = match tls {
        Some(tls) => match tls.acceptor().accept(stream).await {
            Ok(stream) => http.serve_connection(stream, svc).await,
            Err(err) => {
                tracing::warn!(%peer, %err, "TLS handshake failed");
                return;
            }
        },
        None => http.serve_connection(stream, svc).await,
    };

    if let Err(err) = result {
        tracing::warn!(%peer, %err, "connection error");
    }
}

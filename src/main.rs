// src/main.rs
#[cfg(not(unix))]
compile_error!("listenerd only supports Unix platforms");

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};

use daemon_listeners::{
    config::{self, DaemonConfig},
    listeners::{ListenerFactory, SystemdActivation},
    server::Daemon,
    tls::TlsCapability,
};

fn main() -> Result<()> {
    // Consume the activation environment while still single threaded
    let activation = SystemdActivation::from_env();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?
        .block_on(run(activation))
}

async fn run(activation: SystemdActivation) -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("daemon_listeners=debug".parse()?)
                .add_directive("listenerd=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration; without a path every setting keeps its default
    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            config::load_config(&path).await?
        }
        None => DaemonConfig::default(),
    };

    let tls = config
        .tls
        .as_ref()
        .map(TlsCapability::from_settings)
        .transpose()
        .context("failed to load TLS identity")?;

    let factory = ListenerFactory::new(config.defaults.clone()).with_activation(activation);
    let daemon = Daemon::bind(&factory, &config, tls.as_ref())?;

    daemon.run(shutdown_signal()).await
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

// src/tls.rs
// Opaque TLS capability handed to the listener factory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_native_tls::native_tls::{self, Identity};
use tokio_native_tls::TlsAcceptor;

use crate::config::TlsSettings;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TLS identity: {0}")]
    Identity(#[from] native_tls::Error),
}

/// Wraps accepted connections in TLS. Cheap to clone; every listener that
/// terminates TLS shares the same acceptor.
#[derive(Clone)]
pub struct TlsCapability {
    acceptor: Arc<TlsAcceptor>,
}

impl TlsCapability {
    pub fn new(acceptor: native_tls::TlsAcceptor) -> Self {
        Self {
            acceptor: Arc::new(TlsAcceptor::from(acceptor)),
        }
    }

    /// Build from a PEM certificate chain and a PEM PKCS#8 key.
    pub fn from_pem_files(cert: &Path, key: &Path) -> Result<Self, TlsError> {
        let read = |path: &Path| {
            std::fs::read(path).map_err(|source| TlsError::Read {
                path: path.to_path_buf(),
                source,
            })
        };
        let identity = Identity::from_pkcs8(&read(cert)?, &read(key)?)?;
        let acceptor = native_tls::TlsAcceptor::new(identity)?;
        Ok(Self::new(acceptor))
    }

    pub fn from_settings(settings: &TlsSettings) -> Result<Self, TlsError> {
        Self::from_pem_files(Path::new(&settings.cert_path), Path::new(&settings.key_path))
    }

    pub fn acceptor(&self) -> &TlsAcceptor {
        &self.acceptor
    }
}

impl fmt::Debug for TlsCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsCapability").finish_non_exhaustive()
    }
}

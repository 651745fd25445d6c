// src/listeners/diagnostics.rs
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::warn;

/// Non-fatal conditions hit while creating listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// The default socket group does not exist; the process gid was used.
    GroupFallback {
        addr: String,
        group: String,
        error: String,
    },
    /// The socket lives in the runtime directory but could not be marked sticky.
    StickyBitFailed { addr: String, error: String },
    /// A plaintext TCP listener was requested.
    InsecureTcp { addr: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::GroupFallback { addr, group, error } => {
                write!(f, "could not change group {addr} to {group}: {error}")
            }
            Diagnostic::StickyBitFailed { addr, error } => {
                write!(f, "cannot set sticky bit on socket {addr} under XDG_RUNTIME_DIR: {error}")
            }
            Diagnostic::InsecureTcp { addr } => {
                write!(f, "binding to {addr} without TLS is insecure")
            }
        }
    }
}

pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, diagnostic: Diagnostic);
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for Arc<T> {
    fn emit(&self, diagnostic: Diagnostic) {
        (**self).emit(diagnostic)
    }
}

/// Logs every diagnostic as a warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn emit(&self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::GroupFallback { addr, group, .. } => {
                warn!(%addr, %group, "{}", diagnostic)
            }
            Diagnostic::StickyBitFailed { addr, .. } => warn!(%addr, "{}", diagnostic),
            Diagnostic::InsecureTcp { addr } => warn!(%addr, "{}", diagnostic),
        }
    }
}

/// Keeps diagnostics in memory, mostly for tests and startup reports.
#[derive(Debug, Default)]
pub struct CollectedDiagnostics {
    events: Mutex<Vec<Diagnostic>>,
}

impl CollectedDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl DiagnosticSink for CollectedDiagnostics {
    fn emit(&self, diagnostic: Diagnostic) {
        match self.events.lock() {
            Ok(mut events) => events.push(diagnostic),
            Err(poisoned) => poisoned.into_inner().push(diagnostic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_through_arc() {
        let sink = Arc::new(CollectedDiagnostics::new());
        let shared: Box<dyn DiagnosticSink> = Box::new(sink.clone());

        shared.emit(Diagnostic::InsecureTcp {
            addr: "0.0.0.0:2375".to_string(),
        });

        assert_eq!(
            sink.take(),
            vec![Diagnostic::InsecureTcp {
                addr: "0.0.0.0:2375".to_string()
            }]
        );
        assert!(sink.take().is_empty());
    }

    #[test]
    fn messages_name_the_socket() {
        let diagnostic = Diagnostic::GroupFallback {
            addr: "/run/a.sock".to_string(),
            group: "listenerd".to_string(),
            error: "group listenerd not found".to_string(),
        };
        assert_eq!(
            diagnostic.to_string(),
            "could not change group /run/a.sock to listenerd: group listenerd not found"
        );
    }
}

// src/runtime_dir.rs
// Per-user runtime directory lookup and sticky-bit bookkeeping.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeDirError {
    #[error("could not get XDG_RUNTIME_DIR")]
    Unavailable,

    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RuntimeDirError {
    fn io<'a>(op: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> Self + 'a {
        move |source| Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

pub trait RuntimeDir: Send + Sync {
    /// The per-user runtime directory.
    fn runtime_dir(&self) -> Result<PathBuf, RuntimeDirError>;

    /// Set the sticky bit on those `files` that resolve to a location inside
    /// the runtime directory, so periodic cleaners of that directory leave
    /// them alone. Returns the resolved paths that were touched.
    fn stick_contents(&self, files: &[&Path]) -> Result<Vec<PathBuf>, RuntimeDirError>;
}

/// `$XDG_RUNTIME_DIR` backed runtime directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct XdgRuntimeDir;

impl RuntimeDir for XdgRuntimeDir {
    fn runtime_dir(&self) -> Result<PathBuf, RuntimeDirError> {
        dirs::runtime_dir().ok_or(RuntimeDirError::Unavailable)
    }

    fn stick_contents(&self, files: &[&Path]) -> Result<Vec<PathBuf>, RuntimeDirError> {
        match self.runtime_dir() {
            Ok(dir) => stick_under(&dir, files),
            // Nothing to preserve when there is no runtime directory.
            Err(RuntimeDirError::Unavailable) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// Sticky-bit every entry of `files` that resolves to a path below `dir`.
pub fn stick_under(dir: &Path, files: &[&Path]) -> Result<Vec<PathBuf>, RuntimeDirError> {
    let dir = fs::canonicalize(dir).map_err(RuntimeDirError::io("resolve", dir))?;
    let mut stuck = Vec::new();

    for file in files {
        let resolved = fs::canonicalize(file).map_err(RuntimeDirError::io("resolve", file))?;
        if resolved != dir && resolved.starts_with(&dir) {
            set_sticky(&resolved)?;
            stuck.push(resolved);
        }
    }

    Ok(stuck)
}

#[cfg(unix)]
fn set_sticky(path: &Path) -> Result<(), RuntimeDirError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(path)
        .map_err(RuntimeDirError::io("stat", path))?
        .permissions()
        .mode();
    fs::set_permissions(path, fs::Permissions::from_mode((mode & 0o7777) | 0o1000))
        .map_err(RuntimeDirError::io("chmod", path))
}

#[cfg(not(unix))]
fn set_sticky(_path: &Path) -> Result<(), RuntimeDirError> {
    Ok(())
}

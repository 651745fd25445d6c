// src/listeners/unix.rs
use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixListener;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

/// Mode applied to every socket file we create.
pub const SOCKET_MODE: u32 = 0o660;

/// Resolves a group name to its numeric id.
pub trait GroupResolver: Send + Sync {
    fn lookup_gid(&self, name: &str) -> io::Result<u32>;
}

/// The system group database, with a numeric fallback for names that are
/// already gids.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemGroups;

impl GroupResolver for SystemGroups {
    fn lookup_gid(&self, name: &str) -> io::Result<u32> {
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "empty group name"));
        }
        if let Some(gid) = getgrnam(name)? {
            return Ok(gid);
        }
        name.parse::<u32>().map_err(|_| {
            io::Error::new(io::ErrorKind::NotFound, format!("group {name} not found"))
        })
    }
}

fn getgrnam(name: &str) -> io::Result<Option<u32>> {
    let c_name = CString::new(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "group name contains NUL"))?;
    let mut buf: Vec<libc::c_char> = vec![0; 1024];

    loop {
        // SAFETY: all-zero is a valid `group`; it is only read after getgrnam_r fills it.
        let mut group: libc::group = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::group = std::ptr::null_mut();
        // SAFETY: every pointer is valid for the duration of the call and
        // `buf.len()` is the real size of `buf`.
        let rc = unsafe {
            libc::getgrnam_r(
                c_name.as_ptr(),
                &mut group,
                buf.as_mut_ptr(),
                buf.len(),
                &mut result,
            )
        };

        if rc == libc::ERANGE && buf.len() < (1 << 20) {
            let len = buf.len() * 2;
            buf.resize(len, 0);
            continue;
        }
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
        return Ok((!result.is_null()).then_some(group.gr_gid));
    }
}

/// The process' own group id.
pub fn current_gid() -> u32 {
    // SAFETY: getgid has no preconditions and cannot fail.
    unsafe { libc::getgid() }
}

/// Serializes umask changes; the mask is process wide.
static UMASK_LOCK: Mutex<()> = Mutex::new(());

/// Owner-only umask held for as long as the guard lives.
struct RestrictedUmask<'a> {
    previous: libc::mode_t,
    _lock: MutexGuard<'a, ()>,
}

impl RestrictedUmask<'_> {
    fn acquire() -> Self {
        let lock = UMASK_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // SAFETY: umask cannot fail; the previous mask is restored on drop.
        let previous = unsafe { libc::umask(0o077) };
        Self {
            previous,
            _lock: lock,
        }
    }
}

impl Drop for RestrictedUmask<'_> {
    fn drop(&mut self) {
        // SAFETY: see `acquire`.
        unsafe { libc::umask(self.previous) };
    }
}

/// Bind `path` under an owner-only umask, so nobody else can connect before
/// the final group and mode are in place.
fn bind_owner_only(path: &str) -> io::Result<UnixListener> {
    let _umask = RestrictedUmask::acquire();
    UnixListener::bind(path)
}

/// Bind a Unix socket at `path`, owned by group `gid` with [`SOCKET_MODE`].
///
/// An existing file at `path` makes the bind fail; stale sockets must be
/// removed by the caller beforehand.
pub fn new_unix_socket(path: &str, gid: u32) -> io::Result<UnixListener> {
    let listener = bind_owner_only(path)?;

    let prepared = std::os::unix::fs::chown(path, None, Some(gid))
        .and_then(|_| fs::set_permissions(path, fs::Permissions::from_mode(SOCKET_MODE)))
        .and_then(|_| listener.set_nonblocking(true));
    if let Err(e) = prepared {
        drop(listener);
        let _ = fs::remove_file(path);
        return Err(e);
    }

    Ok(listener)
}

/// Unlink socket files created by [`new_unix_socket`]. Files that are
/// already gone are skipped; other failures are logged.
pub fn remove_socket_files<'a>(paths: impl IntoIterator<Item = &'a Path>) {
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed unix socket"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), %err, "Failed to remove unix socket"),
        }
    }
}

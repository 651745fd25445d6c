// src/listeners/activation.rs
//! Socket activation.
//!
//! The supervisor passes listening sockets as descriptors `3..3+LISTEN_FDS`
//! and names the receiving process in `LISTEN_PID`.

use std::env;
use std::io;
use std::mem;
use std::net::TcpListener;
use std::os::unix::io::{FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixListener;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info};

use super::{Listener, ListenerError, ListenerKind};

/// First descriptor handed over by the supervisor; 0-2 are stdio.
pub const LISTEN_FDS_START: RawFd = 3;

/// Supplies the listeners a supervisor handed to this process.
pub trait ActivationSource: Send + Sync {
    /// One slot per inherited descriptor, in descriptor order starting at
    /// [`LISTEN_FDS_START`]. `None` marks a descriptor that is not a
    /// listening stream socket.
    fn listeners(&self) -> io::Result<Vec<Option<Listener>>>;
}

/// systemd style activation through `LISTEN_PID` / `LISTEN_FDS`.
///
/// The descriptors are adopted on the first call to
/// [`listeners`](ActivationSource::listeners); later calls see an empty
/// inventory. The default value has nothing to hand out.
#[derive(Debug, Default)]
pub struct SystemdActivation {
    pending: AtomicUsize,
}

impl SystemdActivation {
    /// Read and unset the activation variables so children do not inherit
    /// them. Mutating the environment is only sound while the process is
    /// single threaded, so this must run before the async runtime starts.
    pub fn from_env() -> Self {
        let count = activated_fd_count(
            env::var("LISTEN_PID").ok().as_deref(),
            env::var("LISTEN_FDS").ok().as_deref(),
            std::process::id(),
        );
        for var in ["LISTEN_PID", "LISTEN_FDS", "LISTEN_FDNAMES"] {
            env::remove_var(var);
        }
        Self::with_count(count)
    }

    /// Descriptors `3..3+count`, clamped to what the process can have open.
    pub fn with_count(count: usize) -> Self {
        Self {
            pending: AtomicUsize::new(count.min(max_inherited_fds())),
        }
    }

    /// Descriptors not yet adopted.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

impl ActivationSource for SystemdActivation {
    fn listeners(&self) -> io::Result<Vec<Option<Listener>>> {
        let count = self.pending.swap(0, Ordering::SeqCst);
        let inventory: Vec<Option<Listener>> = (0..count)
            .map(|i| adopt_fd(LISTEN_FDS_START + i as RawFd))
            .collect();
        info!(
            count,
            usable = inventory.iter().flatten().count(),
            "Inherited activated sockets"
        );
        Ok(inventory)
    }
}

/// Upper bound on inherited descriptors: the open file limit minus stdio,
/// and never past the largest descriptor number.
fn max_inherited_fds() -> usize {
    let ceiling = (RawFd::MAX - LISTEN_FDS_START) as u64;
    // SAFETY: all-zero is a valid `rlimit` and getrlimit only writes into it.
    let mut limit: libc::rlimit = unsafe { mem::zeroed() };
    // SAFETY: `limit` is a valid out pointer.
    let open_max = if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) } == 0 {
        limit.rlim_cur as u64
    } else {
        ceiling
    };
    open_max
        .saturating_sub(LISTEN_FDS_START as u64)
        .min(ceiling) as usize
}

/// Number of descriptors passed to process `pid`, or zero when the
/// variables are absent, malformed, or meant for another process.
pub fn activated_fd_count(listen_pid: Option<&str>, listen_fds: Option<&str>, pid: u32) -> usize {
    let for_us = listen_pid
        .and_then(|v| v.trim().parse::<u32>().ok())
        .is_some_and(|p| p == pid);
    if !for_us {
        return 0;
    }
    listen_fds
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0)
}

/// Take ownership of an inherited descriptor.
///
/// Listening stream sockets become TCP or Unix listeners depending on their
/// address family. Any other socket is closed and yields `None`; a
/// descriptor that is not a socket at all is left alone.
pub fn adopt_fd(fd: RawFd) -> Option<Listener> {
    if !is_socket(fd) {
        debug!(fd, "Inherited descriptor is not a socket");
        return None;
    }

    // SAFETY: the supervisor handed `fd` to this process and nothing else
    // in it has claimed the descriptor.
    let owned = unsafe { OwnedFd::from_raw_fd(fd) };
    set_cloexec(fd);

    if !is_listening_stream(fd) {
        debug!(fd, "Inherited socket is not a listening stream socket");
        return None;
    }

    let listener = match socket_family(fd).ok()? {
        libc::AF_UNIX => Listener::unix(UnixListener::from(owned)),
        libc::AF_INET | libc::AF_INET6 => Listener::tcp(TcpListener::from(owned)),
        family => {
            debug!(fd, family, "Inherited socket has an unsupported address family");
            return None;
        }
    };

    let nonblocking = match listener.kind() {
        ListenerKind::Tcp(l) => l.set_nonblocking(true),
        ListenerKind::Unix(l) => l.set_nonblocking(true),
    };
    if let Err(err) = nonblocking {
        debug!(fd, %err, "Failed to make inherited socket non-blocking");
        return None;
    }

    debug!(fd, addr = ?listener.local_addr().ok(), "Adopted inherited listener");
    Some(listener)
}

fn is_socket(fd: RawFd) -> bool {
    // SAFETY: all-zero is a valid `stat` and fstat only writes into it.
    let mut stat: libc::stat = unsafe { mem::zeroed() };
    // SAFETY: fstat tolerates any descriptor value.
    if unsafe { libc::fstat(fd, &mut stat) } != 0 {
        return false;
    }
    (stat.st_mode & libc::S_IFMT) == libc::S_IFSOCK
}

fn set_cloexec(fd: RawFd) {
    // SAFETY: fcntl on an owned descriptor; failure only leaves the flag unset.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFD);
        if flags >= 0 {
            libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
        }
    }
}

fn sockopt_int(fd: RawFd, name: libc::c_int) -> io::Result<libc::c_int> {
    let mut value: libc::c_int = 0;
    let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
    // SAFETY: `value` and `len` describe a valid c_int sized buffer.
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            name,
            &mut value as *mut libc::c_int as *mut libc::c_void,
            &mut len,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(value)
}

fn is_listening_stream(fd: RawFd) -> bool {
    matches!(sockopt_int(fd, libc::SO_TYPE), Ok(libc::SOCK_STREAM))
        && matches!(sockopt_int(fd, libc::SO_ACCEPTCONN), Ok(v) if v != 0)
}

fn socket_family(fd: RawFd) -> io::Result<libc::c_int> {
    // SAFETY: all-zero is a valid sockaddr_storage.
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    // SAFETY: `storage` is large enough for any address and `len` says so.
    let rc = unsafe {
        libc::getsockname(
            fd,
            &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr,
            &mut len,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(storage.ss_family as libc::c_int)
}

/// A handle in the activation inventory that can be closed explicitly.
pub trait ActivatedHandle {
    fn close(self) -> io::Result<()>;
}

impl ActivatedHandle for Listener {
    fn close(self) -> io::Result<()> {
        Listener::close(self)
    }
}

/// Pick the activated sockets named by `selector`.
///
/// An empty selector or `*` keeps every handle. A number selects the handle
/// inherited as that descriptor; every other handle is closed, and a failed
/// close fails the whole selection. Handles not returned are always released.
pub fn select_activated<H: ActivatedHandle>(
    selector: &str,
    inventory: Vec<Option<H>>,
) -> Result<Vec<H>, ListenerError> {
    if inventory.is_empty() {
        return Err(ListenerError::NoActivatedSockets);
    }

    if selector.is_empty() || selector == "*" {
        let all: Vec<H> = inventory.into_iter().flatten().collect();
        if all.is_empty() {
            return Err(ListenerError::NoActivatedSockets);
        }
        return Ok(all);
    }

    let fd: usize = selector
        .parse()
        .map_err(|_| ListenerError::InvalidSelector(selector.to_string()))?;
    let offset = fd
        .checked_sub(LISTEN_FDS_START as usize)
        .filter(|&offset| matches!(inventory.get(offset), Some(Some(_))))
        .ok_or(ListenerError::ActivatedSocketNotFound { fd })?;

    let mut selected = None;
    for (i, slot) in inventory.into_iter().enumerate() {
        match slot {
            Some(handle) if i == offset => selected = Some(handle),
            Some(handle) => {
                handle
                    .close()
                    .map_err(|source| ListenerError::ActivationCleanupFailed {
                        fd: i + LISTEN_FDS_START as usize,
                        source,
                    })?
            }
            None => {}
        }
    }

    selected
        .map(|handle| vec![handle])
        .ok_or(ListenerError::ActivatedSocketNotFound { fd })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;
    use std::sync::{Arc, Mutex};

    /// Records which handles were closed; `fail` makes close report an error.
    struct Handle {
        id: usize,
        fail: bool,
        closed: Arc<Mutex<Vec<usize>>>,
    }

    impl ActivatedHandle for Handle {
        fn close(self) -> io::Result<()> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::Other, "close failed"));
            }
            self.closed.lock().unwrap().push(self.id);
            Ok(())
        }
    }

    fn inventory(n: usize) -> (Vec<Option<Handle>>, Arc<Mutex<Vec<usize>>>) {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let handles = (0..n)
            .map(|id| {
                Some(Handle {
                    id,
                    fail: false,
                    closed: closed.clone(),
                })
            })
            .collect();
        (handles, closed)
    }

    fn ids(handles: &[Handle]) -> Vec<usize> {
        handles.iter().map(|h| h.id).collect()
    }

    #[test]
    fn numeric_selector_keeps_one_and_closes_the_rest() {
        let (inv, closed) = inventory(5);
        let selected = select_activated("6", inv).unwrap();

        assert_eq!(ids(&selected), vec![3]);
        assert_eq!(*closed.lock().unwrap(), vec![0, 1, 2, 4]);
    }

    #[test]
    fn wildcard_keeps_everything() {
        for selector in ["", "*"] {
            let (inv, closed) = inventory(5);
            let selected = select_activated(selector, inv).unwrap();

            assert_eq!(ids(&selected), vec![0, 1, 2, 3, 4]);
            assert!(closed.lock().unwrap().is_empty());
        }
    }

    #[test]
    fn wildcard_skips_holes() {
        let (mut inv, _) = inventory(3);
        inv[1] = None;
        assert_eq!(ids(&select_activated("*", inv).unwrap()), vec![0, 2]);

        let holes: Vec<Option<Handle>> = vec![None, None];
        assert!(matches!(
            select_activated("", holes),
            Err(ListenerError::NoActivatedSockets)
        ));
    }

    #[test]
    fn empty_inventory_is_not_activated() {
        for selector in ["", "*", "3", "nope"] {
            let (inv, _) = inventory(0);
            assert!(matches!(
                select_activated(selector, inv),
                Err(ListenerError::NoActivatedSockets)
            ));
        }
    }

    #[test]
    fn non_numeric_selector_is_rejected() {
        for selector in ["abc", "-1", "3.0"] {
            let (inv, _) = inventory(5);
            assert!(matches!(
                select_activated(selector, inv),
                Err(ListenerError::InvalidSelector(_))
            ));
        }
    }

    #[test]
    fn out_of_range_selectors_are_not_found() {
        for selector in ["2", "0", "8", "100"] {
            let (inv, closed) = inventory(5);
            assert!(matches!(
                select_activated(selector, inv),
                Err(ListenerError::ActivatedSocketNotFound { .. })
            ));
            assert!(closed.lock().unwrap().is_empty());
        }
    }

    #[test]
    fn hole_at_selected_offset_is_not_found() {
        let (mut inv, _) = inventory(5);
        inv[2] = None;
        assert!(matches!(
            select_activated("5", inv),
            Err(ListenerError::ActivatedSocketNotFound { fd: 5 })
        ));
    }

    #[test]
    fn close_failure_aborts_selection() {
        let (mut inv, _) = inventory(4);
        if let Some(handle) = inv[2].as_mut() {
            handle.fail = true;
        }

        match select_activated("3", inv) {
            Err(ListenerError::ActivationCleanupFailed { fd, .. }) => assert_eq!(fd, 5),
            other => panic!("unexpected result: {:?}", other.map(|h| ids(&h))),
        }
    }

    #[test]
    fn fd_count_requires_matching_pid() {
        assert_eq!(activated_fd_count(Some("42"), Some("2"), 42), 2);
        assert_eq!(activated_fd_count(Some("41"), Some("2"), 42), 0);
        assert_eq!(activated_fd_count(None, Some("2"), 42), 0);
        assert_eq!(activated_fd_count(Some("42"), None, 42), 0);
        assert_eq!(activated_fd_count(Some("42"), Some("x"), 42), 0);
        assert_eq!(activated_fd_count(Some("x"), Some("1"), 42), 0);
    }

    #[test]
    fn absurd_fd_counts_are_clamped() {
        let activation = SystemdActivation::with_count(usize::MAX);
        assert!(activation.pending() <= (RawFd::MAX - LISTEN_FDS_START) as usize);
        assert!(activation.pending() <= max_inherited_fds());

        assert_eq!(SystemdActivation::with_count(2).pending(), 2.min(max_inherited_fds()));
    }

    #[test]
    fn default_activation_has_no_sockets() {
        let activation = SystemdActivation::default();
        assert_eq!(activation.pending(), 0);
        assert!(activation.listeners().unwrap().is_empty());
    }

    fn dup(fd: RawFd) -> RawFd {
        // SAFETY: duplicating a descriptor owned by the test.
        let new_fd = unsafe { libc::dup(fd) };
        assert!(new_fd >= 0, "dup failed");
        new_fd
    }

    #[test]
    fn adopts_tcp_and_unix_listeners() {
        let tcp = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let adopted = adopt_fd(dup(tcp.as_raw_fd())).unwrap();
        assert_eq!(adopted.protocol(), crate::address::Protocol::Tcp);
        assert_eq!(
            adopted.local_addr().unwrap(),
            tcp.local_addr().unwrap().to_string()
        );

        let dir = tempfile::tempdir().unwrap();
        let unix = UnixListener::bind(dir.path().join("a.sock")).unwrap();
        let adopted = adopt_fd(dup(unix.as_raw_fd())).unwrap();
        assert_eq!(adopted.protocol(), crate::address::Protocol::Unix);
    }

    #[test]
    fn non_listeners_become_holes() {
        let udp = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        assert!(adopt_fd(dup(udp.as_raw_fd())).is_none());

        let file = tempfile::tempfile().unwrap();
        assert!(adopt_fd(file.as_raw_fd()).is_none());

        assert!(adopt_fd(9999).is_none());
    }
}

// src/address/parser.rs
use super::tcp::parse_tcp_addr;
use super::{AddressError, HostError, Protocol};
use crate::config::Defaults;
use crate::runtime_dir::RuntimeDir;

/// Check that a user supplied host string is usable.
///
/// Returns the value exactly as given: the final form depends on whether TLS
/// is enabled, which is only known once [`parse_host`] runs.
pub fn validate_host(defaults: &Defaults, val: &str) -> Result<String, HostError> {
    let host = val.trim();
    if !host.is_empty() {
        parse_daemon_host(defaults, host).map_err(|e| HostError::new(val, e))?;
    }
    Ok(val.to_string())
}

/// Resolve a daemon host string to its canonical `proto://addr` form.
///
/// An empty value picks a default: the TLS address when `default_to_tls` is
/// set, otherwise a socket in the user's runtime directory when
/// `default_to_user_runtime_dir` is set, otherwise the platform default host.
/// `default_to_tls` always wins.
pub fn parse_host(
    defaults: &Defaults,
    runtime_dir: &dyn RuntimeDir,
    default_to_tls: bool,
    default_to_user_runtime_dir: bool,
    val: &str,
) -> Result<String, HostError> {
    let host = val.trim();
    if !host.is_empty() {
        return parse_daemon_host(defaults, host).map_err(|e| HostError::new(val, e));
    }

    if default_to_tls {
        Ok(defaults.tls_host())
    } else if default_to_user_runtime_dir {
        let dir = runtime_dir
            .runtime_dir()
            .map_err(|e| HostError::new(val, e.into()))?;
        let socket = dir.join(&defaults.runtime_socket_name);
        Ok(format!("unix://{}", socket.display()))
    } else {
        Ok(defaults.default_host())
    }
}

/// Canonicalize a non-empty host string.
///
/// A string without `://` is a TCP host. `fd://` addresses are returned
/// untouched; their selector is checked when the listener is created.
pub fn parse_daemon_host(defaults: &Defaults, addr: &str) -> Result<String, AddressError> {
    if addr.is_empty() {
        return Err(AddressError::InvalidAddressFormat(addr.to_string()));
    }

    let (proto, rest) = addr.split_once("://").unwrap_or(("tcp", addr));
    match proto.parse::<Protocol>() {
        Ok(Protocol::Tcp) => parse_tcp_addr(rest, &defaults.tcp_host()),
        Ok(Protocol::Unix) => parse_simple_proto_addr(Protocol::Unix, rest, &defaults.unix_socket),
        Ok(Protocol::Npipe) => {
            parse_simple_proto_addr(Protocol::Npipe, rest, &defaults.named_pipe)
        }
        Ok(Protocol::Fd) => Ok(addr.to_string()),
        Err(_) => Err(AddressError::InvalidAddressFormat(addr.to_string())),
    }
}

/// Canonicalize a path based address such as `unix://` or `npipe://`.
///
/// An empty path is replaced by `default_addr`.
pub fn parse_simple_proto_addr(
    proto: Protocol,
    addr: &str,
    default_addr: &str,
) -> Result<String, AddressError> {
    let prefix = proto.prefix();
    let addr = addr.strip_prefix(prefix.as_str()).unwrap_or(addr);
    if addr.contains("://") {
        return Err(AddressError::InvalidProto {
            expected: proto,
            addr: addr.to_string(),
        });
    }

    let addr = if addr.is_empty() { default_addr } else { addr };
    Ok(format!("{prefix}{addr}"))
}

/// Split a canonical `proto://addr` string.
pub fn split_proto_addr(host: &str) -> Result<(&str, &str), AddressError> {
    host.split_once("://")
        .ok_or_else(|| AddressError::MissingProtocol(host.to_string()))
}

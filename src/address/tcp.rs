// src/address/tcp.rs
// host:port canonicalization for tcp:// addresses.

use std::borrow::Cow;
use std::num::IntErrorKind;

use percent_encoding::percent_decode_str;

use super::{AddressError, Protocol};

/// Authority and path of a `tcp://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TcpUrl<'a> {
    /// `host[:port]`, user info removed. An IPv6 zone id is unescaped.
    pub host: Cow<'a, str>,
    /// Everything from the first `/` after the authority, unescaped.
    pub path: Cow<'a, str>,
}

impl<'a> TcpUrl<'a> {
    /// Parse the part of a URL that follows `tcp://`.
    ///
    /// Fragment and query are dropped. The port, when present, must be all
    /// digits; bracketed hosts must be closed.
    pub fn parse(rest: &'a str) -> Result<Self, &'static str> {
        if rest.bytes().any(|b| b < 0x20 || b == 0x7f) {
            return Err("invalid control character in URL");
        }

        let rest = rest.split_once('#').map_or(rest, |(r, _)| r);
        let rest = rest.split_once('?').map_or(rest, |(r, _)| r);
        let (authority, path) = match rest.find('/') {
            Some(i) => rest.split_at(i),
            None => (rest, ""),
        };
        let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);

        let colon_port = if host.starts_with('[') {
            let end = host.rfind(']').ok_or("missing ']' in host")?;
            &host[end + 1..]
        } else {
            host.rfind(':').map_or("", |i| &host[i..])
        };
        if !valid_optional_port(colon_port) {
            return Err("invalid port after host");
        }

        Ok(Self {
            host: unescape_host(host)?,
            path: unescape(path)?,
        })
    }
}

fn valid_optional_port(colon_port: &str) -> bool {
    match colon_port.strip_prefix(':') {
        Some(digits) => digits.bytes().all(|b| b.is_ascii_digit()),
        None => colon_port.is_empty(),
    }
}

fn valid_host_byte(b: u8) -> bool {
    b >= 0x80 || b.is_ascii_alphanumeric() || b"-_.~!$&'()*+,;=:[]<>\"".contains(&b)
}

/// Validate a host. The only escape allowed is the `%25` that introduces a
/// zone id inside brackets, as in `[fe80::1%25eth0]`; the zone itself may
/// carry further escapes.
fn unescape_host(host: &str) -> Result<Cow<'_, str>, &'static str> {
    let zone = host
        .strip_prefix('[')
        .and_then(|_| host.rfind(']'))
        .and_then(|end| host[..end].find("%25").map(|start| (start, end)));

    let Some((start, end)) = zone else {
        return if host.bytes().all(valid_host_byte) {
            Ok(Cow::Borrowed(host))
        } else {
            Err("invalid character in host name")
        };
    };

    let (addr, zone_id, tail) = (&host[..start], &host[start + 3..end], &host[end..]);
    if !addr.bytes().chain(tail.bytes()).all(valid_host_byte)
        || !zone_id.bytes().all(|b| b == b'%' || valid_host_byte(b))
    {
        return Err("invalid character in host name");
    }
    Ok(Cow::Owned(format!("{addr}%{}{tail}", unescape(zone_id)?)))
}

/// Decode `%XX` escapes, rejecting truncated or non-hex ones.
fn unescape(s: &str) -> Result<Cow<'_, str>, &'static str> {
    let bytes = s.as_bytes();
    for (i, _) in s.match_indices('%') {
        match bytes.get(i + 1..i + 3) {
            Some(hex) if hex.iter().all(u8::is_ascii_hexdigit) => {}
            _ => return Err("invalid URL escape"),
        }
    }
    percent_decode_str(s)
        .decode_utf8()
        .map_err(|_| "invalid UTF-8 in URL escape")
}

/// Split `host:port` or `[host]:port` into its parts.
///
/// The port must be present (it may be empty). A bare IPv6 literal is
/// rejected; it has to be bracketed.
pub fn split_host_port(hostport: &str) -> Result<(&str, &str), &'static str> {
    let i = hostport.rfind(':').ok_or("missing port in address")?;

    let (host, j, k) = if hostport.starts_with('[') {
        let end = hostport.find(']').ok_or("missing ']' in address")?;
        if end + 1 == hostport.len() {
            return Err("missing port in address");
        }
        if end + 1 != i {
            return Err(if hostport.as_bytes()[end + 1] == b':' {
                "too many colons in address"
            } else {
                "missing port in address"
            });
        }
        (&hostport[1..end], 1, end + 1)
    } else {
        let host = &hostport[..i];
        if host.contains(':') {
            return Err("too many colons in address");
        }
        (host, 0, 0)
    };

    if hostport[j..].contains('[') {
        return Err("unexpected '[' in address");
    }
    if hostport[k..].contains(']') {
        return Err("unexpected ']' in address");
    }

    Ok((host, &hostport[i + 1..]))
}

/// Inverse of [`split_host_port`]: brackets hosts that contain a colon.
pub fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Only a syntax error rejects a port. Zero passes, and so does a digit
/// string too large for the integer type.
fn port_parses(port: &str) -> bool {
    match port.parse::<i64>() {
        Ok(_) => true,
        Err(e) => matches!(e.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow),
    }
}

/// Canonicalize a TCP address into `tcp://host:port[/path]`.
///
/// Missing host or port are taken from `default_addr`, which must be in the
/// full `tcp://host:port` form. An empty `try_addr` (or a bare `tcp://`)
/// yields `default_addr` unchanged.
pub fn parse_tcp_addr(try_addr: &str, default_addr: &str) -> Result<String, AddressError> {
    if try_addr.is_empty() || try_addr == "tcp://" {
        return Ok(default_addr.to_string());
    }

    let addr = try_addr.strip_prefix("tcp://").unwrap_or(try_addr);
    if addr.contains("://") || addr.is_empty() {
        return Err(AddressError::InvalidProto {
            expected: Protocol::Tcp,
            addr: try_addr.to_string(),
        });
    }

    let default_hostport = default_addr.strip_prefix("tcp://").unwrap_or(default_addr);
    let (default_host, default_port) =
        split_host_port(default_hostport).map_err(|reason| AddressError::InvalidDefault {
            addr: default_addr.to_string(),
            reason,
        })?;

    let invalid = || AddressError::InvalidBindAddress(try_addr.to_string());

    // An IPv6 literal with a dangling colon does not survive URL parsing.
    let fixed;
    let addr = if addr.ends_with("]:") {
        fixed = format!("{addr}{default_port}");
        fixed.as_str()
    } else {
        addr
    };

    let url = TcpUrl::parse(addr).map_err(|_| invalid())?;
    let (host, port) = match split_host_port(&url.host) {
        Ok((host, port)) => (host.to_string(), port.to_string()),
        Err(_) => {
            let joined = join_host_port(&url.host, default_port);
            let (host, port) = split_host_port(&joined).map_err(|_| invalid())?;
            (host.to_string(), port.to_string())
        }
    };

    let host = if host.is_empty() { default_host } else { host.as_str() };
    let port = if port.is_empty() { default_port } else { port.as_str() };
    if !port_parses(port) {
        return Err(invalid());
    }

    Ok(format!("tcp://{}{}", join_host_port(host, port), url.path))
}

// tests/address_tests.rs
use daemon_listeners::address::{
    parse_daemon_host, parse_host, parse_simple_proto_addr, parse_tcp_addr, Address, AddressError,
    Protocol,
};
use daemon_listeners::config::Defaults;
use daemon_listeners::runtime_dir::{RuntimeDir, RuntimeDirError};
use proptest::prelude::*;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

struct NoRuntimeDir;

impl RuntimeDir for NoRuntimeDir {
    fn runtime_dir(&self) -> Result<PathBuf, RuntimeDirError> {
        Err(RuntimeDirError::Unavailable)
    }

    fn stick_contents(&self, _files: &[&Path]) -> Result<Vec<PathBuf>, RuntimeDirError> {
        Ok(Vec::new())
    }
}

struct UserRuntimeDir;

impl RuntimeDir for UserRuntimeDir {
    fn runtime_dir(&self) -> Result<PathBuf, RuntimeDirError> {
        Ok(PathBuf::from("/run/user/1000"))
    }

    fn stick_contents(&self, _files: &[&Path]) -> Result<Vec<PathBuf>, RuntimeDirError> {
        Ok(Vec::new())
    }
}

#[test]
fn bare_hosts_mean_tcp() {
    let defaults = Defaults::default();
    for host in ["0.0.0.0:1234", "localhost", ":7777", "[::1]:5555", "10.0.0.1"] {
        assert_eq!(
            parse_daemon_host(&defaults, host).unwrap(),
            parse_daemon_host(&defaults, &format!("tcp://{host}")).unwrap(),
            "{host}"
        );
    }
}

#[test]
fn empty_tcp_addresses_use_the_default() {
    for default in ["tcp://0.0.0.0:2375", "tcp://localhost:2376", "tcp://[::1]:80"] {
        assert_eq!(parse_tcp_addr("", default).unwrap(), default);
        assert_eq!(parse_tcp_addr("tcp://", default).unwrap(), default);
    }
}

#[test]
fn canonical_tcp_addresses_are_fixed_points() {
    let defaults = Defaults::default();
    for raw in ["tcp://127.0.0.1:2375", "tcp://[::1]:2376", "tcp://example.com:80/api"] {
        let once = parse_daemon_host(&defaults, raw).unwrap();
        assert_eq!(once, raw);
        assert_eq!(parse_daemon_host(&defaults, &once).unwrap(), once);
    }
}

#[test]
fn empty_unix_paths_use_the_default() {
    let default = "/var/run/listenerd.sock";
    assert_eq!(
        parse_simple_proto_addr(Protocol::Unix, "", default).unwrap(),
        "unix:///var/run/listenerd.sock"
    );
    assert_eq!(
        parse_simple_proto_addr(Protocol::Unix, "unix://", default).unwrap(),
        "unix:///var/run/listenerd.sock"
    );
}

#[test]
fn malformed_inputs_are_rejected() {
    let defaults = Defaults::default();
    assert!(matches!(
        parse_daemon_host(&defaults, "http://x"),
        Err(AddressError::InvalidAddressFormat(addr)) if addr == "http://x"
    ));
    assert!(parse_tcp_addr("udp://x", "tcp://0.0.0.0:2375").is_err());
    assert!(parse_tcp_addr("tcp://", "not-a-default").is_ok());
    assert!(parse_tcp_addr("tcp://:80", "not-a-default").is_err());
    assert!(matches!(
        parse_tcp_addr("tcp://host:port", "tcp://0.0.0.0:2375"),
        Err(AddressError::InvalidBindAddress(_))
    ));
}

#[test]
fn ipv6_literal_with_empty_port_takes_the_default_port() {
    assert_eq!(
        parse_tcp_addr("tcp://[::1]:", "tcp://0.0.0.0:2375").unwrap(),
        "tcp://[::1]:2375"
    );
}

#[test]
fn fd_hosts_are_not_validated_while_parsing() {
    let defaults = Defaults::default();
    assert_eq!(parse_daemon_host(&defaults, "fd://").unwrap(), "fd://");
    assert_eq!(parse_daemon_host(&defaults, "fd://nonsense").unwrap(), "fd://nonsense");
}

#[test]
fn empty_host_defaults_follow_priority() {
    let defaults = Defaults::default();

    assert_eq!(
        parse_host(&defaults, &UserRuntimeDir, true, true, "  ").unwrap(),
        "tcp://localhost:2376"
    );
    assert_eq!(
        parse_host(&defaults, &UserRuntimeDir, false, true, "").unwrap(),
        "unix:///run/user/1000/listenerd.sock"
    );
    assert_eq!(
        parse_host(&defaults, &NoRuntimeDir, false, false, "").unwrap(),
        "unix:///var/run/listenerd.sock"
    );

    let err = parse_host(&defaults, &NoRuntimeDir, false, true, "").unwrap_err();
    assert!(matches!(
        err.source,
        AddressError::RuntimeDir(RuntimeDirError::Unavailable)
    ));
}

#[test]
fn parse_errors_keep_the_original_input() {
    let defaults = Defaults::default();
    let err = parse_host(&defaults, &NoRuntimeDir, false, false, " gopher://x ").unwrap_err();
    assert_eq!(err.input, " gopher://x ");
}

#[test]
fn addresses_display_in_canonical_form() {
    let defaults = Defaults::default();
    let addr = Address::parse(&defaults, ":8080").unwrap();
    assert_eq!(
        addr,
        Address::Tcp {
            host: "localhost".into(),
            port: "8080".into(),
            path: String::new(),
        }
    );
    assert_eq!(addr.to_string(), "tcp://localhost:8080");

    let addr = Address::parse(&defaults, "unix://").unwrap();
    assert_eq!(addr, Address::Unix("/var/run/listenerd.sock".into()));
    assert_eq!(addr.protocol(), Protocol::Unix);
}

/// Hosts as an operator would type them: names, IPv4, bracketed IPv6.
fn host() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z][a-z0-9-]{0,10}(\\.[a-z][a-z0-9]{0,5}){0,2}",
        any::<Ipv4Addr>().prop_map(|ip| ip.to_string()),
        any::<Ipv6Addr>().prop_map(|ip| format!("[{ip}]")),
    ]
}

/// `host`, `host:port`, `:port` or `host:` with an optional path.
fn bare_host() -> impl Strategy<Value = String> {
    (
        prop::option::of(host()),
        prop::option::of(prop::option::of(any::<u16>())),
        prop::option::of("/[a-z]{1,8}"),
    )
        .prop_filter("needs a host or a port", |(h, p, _)| h.is_some() || p.is_some())
        .prop_map(|(h, p, path)| {
            let mut out = h.unwrap_or_default();
            // A bracketed literal needs at least the colon.
            let p = if out.starts_with('[') { Some(p.flatten()) } else { p };
            match p {
                Some(Some(port)) => out.push_str(&format!(":{port}")),
                Some(None) => out.push(':'),
                None => {}
            }
            out.push_str(&path.unwrap_or_default());
            out
        })
}

fn default_addr() -> impl Strategy<Value = String> {
    (host(), any::<u16>()).prop_map(|(h, p)| format!("tcp://{h}:{p}"))
}

proptest! {
    #[test]
    fn prop_bare_host_is_tcp(raw in bare_host()) {
        let defaults = Defaults::default();
        let bare = parse_daemon_host(&defaults, &raw);
        let prefixed = parse_daemon_host(&defaults, &format!("tcp://{raw}"));

        prop_assert!(bare.is_ok(), "{raw}: {:?}", bare);
        prop_assert_eq!(bare.ok(), prefixed.ok());
    }

    #[test]
    fn prop_empty_tcp_address_is_the_default(default in default_addr()) {
        prop_assert_eq!(parse_tcp_addr("", &default).unwrap(), default.clone());
        prop_assert_eq!(parse_tcp_addr("tcp://", &default).unwrap(), default);
    }

    #[test]
    fn prop_canonical_tcp_is_a_fixed_point(raw in bare_host(), default in default_addr()) {
        let canonical = parse_tcp_addr(&raw, &default).unwrap();
        prop_assert_eq!(parse_tcp_addr(&canonical, &default).unwrap(), canonical.clone());

        let defaults = Defaults::default();
        prop_assert_eq!(parse_daemon_host(&defaults, &canonical).unwrap(), canonical);
    }
}

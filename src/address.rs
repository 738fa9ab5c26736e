use crate::models::ConnectionTarget;
use thiserror::Error;
use url::{Host, Url};

pub const TLS_SCHEME: &str = "ssl";
pub const PLAIN_SCHEME: &str = "tcp";
pub const DEFAULT_TLS_PORT: u16 = 8883;
pub const DEFAULT_PLAIN_PORT: u16 = 1883;

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("Unsupported scheme '{0}'. Use ssl:// or tcp://")]
    UnsupportedScheme(String),
    #[error("No hostname in '{0}'")]
    MissingHost(String),
    #[error("Cannot parse '{input}': {reason}")]
    Malformed { input: String, reason: String },
}

/// Turn `--host` and an optional `--port` into a connection target.
///
/// `ssl://host` and `tcp://host` pick encryption from the scheme and default
/// to 8883/1883 unless the URL or `port` says otherwise. A bare hostname
/// defaults to 8883, and encryption is on only when the final port is 8883.
/// Bare hosts on any other port are always plaintext; use the `ssl://` form
/// to get TLS on a non-standard port.
pub fn resolve_target(host_arg: &str, port_arg: Option<u16>) -> Result<ConnectionTarget, AddressError> {
    match host_arg.split_once("://") {
        Some((scheme, _)) => resolve_url(host_arg, scheme, port_arg),
        None => resolve_bare(host_arg, port_arg),
    }
}

fn resolve_url(input: &str, scheme: &str, port_arg: Option<u16>) -> Result<ConnectionTarget, AddressError> {
    let scheme = scheme.to_ascii_lowercase();
    let use_encryption = match scheme.as_str() {
        TLS_SCHEME => true,
        PLAIN_SCHEME => false,
        _ => return Err(AddressError::UnsupportedScheme(scheme)),
    };

    let url = Url::parse(input).map_err(|e| AddressError::Malformed {
        input: input.to_string(),
        reason: e.to_string(),
    })?;

    let host = match url.host() {
        Some(Host::Ipv6(addr)) => addr.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Domain(name)) if !name.is_empty() => name.to_string(),
        _ => return Err(AddressError::MissingHost(input.to_string())),
    };

    let scheme_default = if use_encryption {
        DEFAULT_TLS_PORT
    } else {
        DEFAULT_PLAIN_PORT
    };
    let port = port_arg.or(url.port()).unwrap_or(scheme_default);

    Ok(ConnectionTarget {
        host,
        port,
        use_encryption,
    })
}

fn resolve_bare(input: &str, port_arg: Option<u16>) -> Result<ConnectionTarget, AddressError> {
    let host = input.trim();
    if host.is_empty() {
        return Err(AddressError::MissingHost(input.to_string()));
    }

    let port = port_arg.unwrap_or(DEFAULT_TLS_PORT);
    Ok(ConnectionTarget {
        host: host.to_string(),
        port,
        use_encryption: port == DEFAULT_TLS_PORT,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssl_scheme_defaults_to_tls_port() {
        let target = resolve_target("ssl://broker.example.com", None).unwrap();
        assert_eq!(target.host, "broker.example.com");
        assert_eq!(target.port, 8883);
        assert!(target.use_encryption);
    }

    #[test]
    fn tcp_scheme_defaults_to_plain_port() {
        let target = resolve_target("tcp://broker.example.com", None).unwrap();
        assert_eq!(target.host, "broker.example.com");
        assert_eq!(target.port, 1883);
        assert!(!target.use_encryption);
    }

    #[test]
    fn embedded_port_beats_scheme_default() {
        let target = resolve_target("ssl://h:9000", None).unwrap();
        assert_eq!(target.port, 9000);
        assert!(target.use_encryption);

        let target = resolve_target("tcp://h:9000", None).unwrap();
        assert_eq!(target.port, 9000);
        assert!(!target.use_encryption);
    }

    #[test]
    fn explicit_port_beats_embedded_port() {
        let target = resolve_target("tcp://h:9000", Some(1884)).unwrap();
        assert_eq!(target.port, 1884);
        assert!(!target.use_encryption);
    }

    #[test]
    fn scheme_keeps_encryption_on_non_default_port() {
        let target = resolve_target("ssl://h", Some(1883)).unwrap();
        assert_eq!(target.port, 1883);
        assert!(target.use_encryption);
    }

    #[test]
    fn unsupported_scheme_is_named() {
        let err = resolve_target("ws://h", None).unwrap_err();
        match &err {
            AddressError::UnsupportedScheme(scheme) => assert_eq!(scheme, "ws"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("'ws'"));
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let target = resolve_target("SSL://h", None).unwrap();
        assert!(target.use_encryption);
        assert_eq!(target.port, 8883);
    }

    #[test]
    fn url_without_host_is_rejected() {
        assert!(matches!(
            resolve_target("tcp://", None),
            Err(AddressError::MissingHost(_))
        ));
    }

    #[test]
    fn bad_embedded_port_is_malformed() {
        assert!(matches!(
            resolve_target("tcp://h:99999", None),
            Err(AddressError::Malformed { .. })
        ));
    }

    #[test]
    fn ipv6_literal_loses_brackets() {
        let target = resolve_target("tcp://[::1]:1884", None).unwrap();
        assert_eq!(target.host, "::1");
        assert_eq!(target.port, 1884);
    }

    #[test]
    fn bare_host_defaults_to_tls() {
        let target = resolve_target("broker.local", None).unwrap();
        assert_eq!(target.host, "broker.local");
        assert_eq!(target.port, 8883);
        assert!(target.use_encryption);
    }

    #[test]
    fn bare_host_encryption_follows_port() {
        let target = resolve_target("broker.local", Some(1883)).unwrap();
        assert!(!target.use_encryption);

        let target = resolve_target("broker.local", Some(8883)).unwrap();
        assert!(target.use_encryption);

        // Plaintext even though a broker could serve TLS here.
        let target = resolve_target("broker.local", Some(8884)).unwrap();
        assert!(!target.use_encryption);
    }

    #[test]
    fn empty_host_is_rejected() {
        assert!(matches!(
            resolve_target("  ", None),
            Err(AddressError::MissingHost(_))
        ));
    }
}

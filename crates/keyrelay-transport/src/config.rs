//! Transport configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use axum::http::StatusCode;
use keyrelay_protocol::DispatchError;

use crate::server::TransportError;

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:80";

/// Default WebSocket endpoint.
pub const LISTEN_PATH: &str = "/listen";

/// A `<host>:<port>` listen address.
///
/// The port is whatever follows the last `:`. A bracketed IPv6 host
/// (`[::1]:8080`) has its brackets removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddr {
    pub host: String,
    pub port: u16,
}

impl ListenAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl FromStr for ListenAddr {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TransportError::InvalidAddress {
            addr: s.to_owned(),
            reason: reason.to_owned(),
        };

        let (host, port) = s.rsplit_once(':').ok_or_else(|| invalid("missing ':<port>'"))?;
        let port: u16 = port.parse().map_err(|_| invalid("port is not a number in 0..=65535"))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl Default for ListenAddr {
    fn default() -> Self {
        Self::new("127.0.0.1", 80)
    }
}

/// Which HTTP status accompanies a dispatch error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorStatusPolicy {
    /// Always 200; only the body tells success from failure.
    #[default]
    AlwaysOk,
    /// 404 for an unknown keyboard, 400 for everything else.
    ClientError,
}

impl ErrorStatusPolicy {
    pub fn status_for(&self, error: &DispatchError) -> StatusCode {
        match self {
            Self::AlwaysOk => StatusCode::OK,
            Self::ClientError if error.is_not_found() => StatusCode::NOT_FOUND,
            Self::ClientError => StatusCode::BAD_REQUEST,
        }
    }
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Address to bind (port 0 for OS-assigned)
    pub listen: ListenAddr,
    /// The only path accepted for WebSocket upgrades
    pub listen_path: String,
    /// Status code policy for dispatch errors
    pub error_status: ErrorStatusPolicy,
    /// Outbound queue capacity per connection
    pub outbound_queue: usize,
    /// How long `wait()` lets open connections finish after shutdown
    pub shutdown_grace: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen: ListenAddr::default(),
            listen_path: LISTEN_PATH.into(),
            error_status: ErrorStatusPolicy::default(),
            outbound_queue: 64,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_address() {
        let addr: ListenAddr = DEFAULT_LISTEN.parse().unwrap();
        assert_eq!(addr, ListenAddr::new("127.0.0.1", 80));
    }

    #[test]
    fn splits_at_last_colon() {
        let addr: ListenAddr = "localhost:8080".parse().unwrap();
        assert_eq!(addr.host, "localhost");
        assert_eq!(addr.port, 8080);
    }

    #[test]
    fn strips_ipv6_brackets() {
        let addr: ListenAddr = "[::1]:9000".parse().unwrap();
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.port, 9000);
        assert_eq!(addr.to_string(), "[::1]:9000");
    }

    #[test]
    fn rejects_bad_addresses() {
        assert!("127.0.0.1".parse::<ListenAddr>().is_err());
        assert!("127.0.0.1:http".parse::<ListenAddr>().is_err());
        assert!("127.0.0.1:70000".parse::<ListenAddr>().is_err());
        assert!(":80".parse::<ListenAddr>().is_err());
    }

    #[test]
    fn status_policy() {
        let legacy = ErrorStatusPolicy::AlwaysOk;
        assert_eq!(legacy.status_for(&DispatchError::KeyboardNotFound), StatusCode::OK);

        let strict = ErrorStatusPolicy::ClientError;
        assert_eq!(strict.status_for(&DispatchError::KeyboardNotFound), StatusCode::NOT_FOUND);
        assert_eq!(strict.status_for(&DispatchError::UnknownSignalValue), StatusCode::BAD_REQUEST);
        assert_eq!(strict.status_for(&DispatchError::MalformedPath), StatusCode::BAD_REQUEST);
    }
}

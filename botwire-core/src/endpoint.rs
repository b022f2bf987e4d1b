//! Server endpoint resolution.
//!
//! The transport defaults come from `RLBOT_SERVER_IP` and
//! `RLBOT_SERVER_PORT`, falling back to `127.0.0.1:23234`.

use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use crate::config::{DEFAULT_SERVER_IP, DEFAULT_SERVER_PORT, ENV_SERVER_IP, ENV_SERVER_PORT};

/// A match server address, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
}

impl Default for ServerEndpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_IP.to_owned(),
            port: DEFAULT_SERVER_PORT,
        }
    }
}

impl ServerEndpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Endpoint from the environment, with defaults for anything unset.
    /// A malformed port falls back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        let host =
            std::env::var(ENV_SERVER_IP).unwrap_or_else(|_| DEFAULT_SERVER_IP.to_owned());
        let port = std::env::var(ENV_SERVER_PORT)
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_SERVER_PORT);
        Self { host, port }
    }

    /// Resolve to socket addresses, preferring IPv4 (match servers bind it).
    pub fn resolve(&self) -> io::Result<SocketAddr> {
        let mut addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .collect();
        addrs.sort_by_key(|a| !a.is_ipv4());
        addrs.into_iter().next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no addresses for [{}]:{}", self.host, self.port),
            )
        })
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint() {
        let ep = ServerEndpoint::default();
        assert_eq!(ep.host, "127.0.0.1");
        assert_eq!(ep.port, 23234);
        assert_eq!(ep.to_string(), "127.0.0.1:23234");
    }

    #[test]
    fn resolves_loopback() {
        let ep = ServerEndpoint::new("127.0.0.1", 4321);
        let addr = ep.resolve().unwrap();
        assert!(addr.is_ipv4());
        assert_eq!(addr.port(), 4321);
    }

    #[test]
    fn unresolvable_host_errors() {
        let ep = ServerEndpoint::new("host.invalid.", 1);
        assert!(ep.resolve().is_err());
    }
}

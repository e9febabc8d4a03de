use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};

use log::debug;

use crate::error_handling::types::NetworkError;

/// Result of resolving a host/port pair.
///
/// IPv4 candidates are ordered first; connect and listen calls try the
/// candidates in order and keep the first that works.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    host: String,
    port: u16,
    addrs: Vec<SocketAddr>,
}

impl ResolvedAddress {
    pub fn resolve(host: &str, port: u16) -> Result<Self, NetworkError> {
        let mut addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| NetworkError::ResolveFailed(format!("{}:{}", host, port), e))?
            .collect();
        if addrs.is_empty() {
            return Err(NetworkError::NoAddress(format!("{}:{}", host, port)));
        }
        addrs.sort_by_key(|a| !a.is_ipv4());
        debug!("Resolved {}:{} to {:?}", host, port, addrs);

        Ok(Self {
            host: host.to_string(),
            port,
            addrs,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }
}

impl fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

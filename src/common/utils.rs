//! Utility functions for brickmgr

use serde::{Deserialize, Serialize};

/// Form the internal relay address of a peer from one of its advertised addresses.
///
/// Addresses without a port get `default_port`. Bracketed IPv6 literals are
/// accepted with or without a port.
pub fn form_remote_peer_address(address: &str, default_port: u16) -> crate::Result<String> {
    let address = address.trim();
    if address.is_empty() {
        return Err(crate::Error::InvalidRequest("empty peer address".into()));
    }

    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(|| {
            crate::Error::InvalidRequest(format!("invalid peer address: {}", address))
        })?;
        return match tail.strip_prefix(':') {
            Some(port) => Ok(format!("[{}]:{}", host, parse_port(address, port)?)),
            None if tail.is_empty() => Ok(format!("[{}]:{}", host, default_port)),
            None => Err(crate::Error::InvalidRequest(format!(
                "invalid peer address: {}",
                address
            ))),
        };
    }

    match address.rsplit_once(':') {
        // Bare IPv6 literal without brackets
        Some((host, _)) if host.contains(':') => Ok(format!("[{}]:{}", address, default_port)),
        Some((host, port)) => Ok(format!("{}:{}", host, parse_port(address, port)?)),
        None => Ok(format!("{}:{}", address, default_port)),
    }
}

fn parse_port(address: &str, port: &str) -> crate::Result<u16> {
    port.parse()
        .map_err(|_| crate::Error::InvalidRequest(format!("invalid port in address: {}", address)))
}

/// Peer health state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Alive,
    Suspect,
    Dead,
}

impl NodeState {
    /// Is this peer expected to answer relayed steps?
    pub fn is_healthy(&self) -> bool {
        !matches!(self, NodeState::Dead)
    }
}

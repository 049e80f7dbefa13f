//! Server configuration

use shared::networking::{
    local_host_name, DEFAULT_MAX_MESSAGE_SIZE, DISCOVERY_PORT, MESSAGE_PORT,
};
use shared::SocketOptions;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address both the TCP listener and the discovery socket bind to
    pub bind_ip: IpAddr,
    pub message_port: u16,
    pub discovery_port: u16,
    /// Largest body accepted from a peer before its connection is dropped
    pub max_message_size: usize,
    pub socket: SocketOptions,
    /// Name returned in discovery answers
    pub server_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            message_port: MESSAGE_PORT,
            discovery_port: DISCOVERY_PORT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            socket: SocketOptions::default(),
            server_name: local_host_name(),
        }
    }
}

impl ServerConfig {
    /// Loopback config on OS-assigned ports, for tests and local tools
    pub fn ephemeral() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            message_port: 0,
            discovery_port: 0,
            ..Self::default()
        }
    }

    pub fn message_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.message_port)
    }

    pub fn discovery_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.discovery_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_uses_well_known_ports() {
        let config = ServerConfig::default();
        assert_eq!(config.message_addr().port(), MESSAGE_PORT);
        assert_eq!(config.discovery_addr().port(), DISCOVERY_PORT);
        assert!(config.bind_ip.is_unspecified());
        assert!(!config.server_name.is_empty());
    }

    #[test]
    fn test_ephemeral_binds_loopback() {
        let config = ServerConfig::ephemeral();
        assert!(config.bind_ip.is_loopback());
        assert_eq!(config.message_port, 0);
        assert_eq!(config.discovery_port, 0);
    }
}

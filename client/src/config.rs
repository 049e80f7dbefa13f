//! Client-side network configuration

use shared::networking::{
    local_host_name, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_SYNC_TIMEOUT, DISCOVERY_PORT,
    DISCOVERY_WINDOW, MESSAGE_PORT,
};
use shared::SocketOptions;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Configuration for [`crate::network::ClientNetworking`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Port used when a server address is given without one
    pub message_port: u16,
    /// Upper bound on `send_synchronous`; `None` waits forever
    pub sync_timeout: Option<Duration>,
    /// Where discovery questions are sent, one window per target
    pub discovery_targets: Vec<SocketAddr>,
    pub discovery_window: Duration,
    pub max_message_size: usize,
    pub socket: SocketOptions,
    /// Name a discovered server must report to be shown as "localhost"
    pub host_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            message_port: MESSAGE_PORT,
            sync_timeout: Some(DEFAULT_SYNC_TIMEOUT),
            discovery_targets: vec![SocketAddr::from((Ipv4Addr::BROADCAST, DISCOVERY_PORT))],
            discovery_window: DISCOVERY_WINDOW,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            socket: SocketOptions::default(),
            host_name: local_host_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.message_port, MESSAGE_PORT);
        assert_eq!(config.sync_timeout, Some(DEFAULT_SYNC_TIMEOUT));
        assert_eq!(config.discovery_targets.len(), 1);
        assert!(config.discovery_targets[0].ip().is_ipv4());
        assert_eq!(config.discovery_targets[0].port(), DISCOVERY_PORT);
        assert!(!config.host_name.is_empty());
    }
}

//! LAN server discovery over UDP broadcast

use log::{debug, info, warn};
use shared::networking::{parse_discovery_answer, DISCOVERY_QUESTION};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

/// A server that answered a discovery question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredServer {
    pub address: IpAddr,
    /// Name the server reported, or "localhost" if it is this machine
    pub name: String,
}

/// Asks every target for servers and collects the answers.
///
/// Each target gets its own `window`; when it elapses the socket is dropped,
/// which abandons the pending read. Every responding address is listed once.
/// If no socket can be opened the result is simply empty.
pub async fn discover_servers(
    targets: &[SocketAddr],
    window: Duration,
    own_host_name: &str,
) -> Vec<DiscoveredServer> {
    let mut servers: Vec<DiscoveredServer> = Vec::new();

    for target in targets {
        let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = match UdpSocket::bind(bind_addr).await {
            Ok(socket) => socket,
            Err(e) => {
                warn!("Unable to open discovery socket: {}", e);
                continue;
            }
        };

        if let Err(e) = socket.set_broadcast(true) {
            warn!("Unable to enable broadcast on discovery socket: {}", e);
        }

        if let Err(e) = socket.send_to(DISCOVERY_QUESTION.as_bytes(), target).await {
            warn!("Failed to send discovery question to {}: {}", target, e);
            continue;
        }

        let deadline = Instant::now() + window;
        let mut buffer = [0u8; 1024];

        loop {
            let (len, from) = match timeout_at(deadline, socket.recv_from(&mut buffer)).await {
                Err(_) => break,
                Ok(Err(e)) => {
                    warn!("Discovery receive failed: {}", e);
                    break;
                }
                Ok(Ok(received)) => received,
            };

            let Some(name) = parse_discovery_answer(&buffer[..len]) else {
                debug!("Ignoring non-answer datagram from {}", from);
                continue;
            };

            if servers.iter().any(|server| server.address == from.ip()) {
                continue;
            }

            let name = if name == own_host_name {
                "localhost".to_string()
            } else {
                name
            };

            info!("Discovered server '{}' at {}", name, from.ip());
            servers.push(DiscoveredServer {
                address: from.ip(),
                name,
            });
        }
    }

    servers
}

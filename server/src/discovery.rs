//! UDP responder answering LAN discovery questions

use log::{debug, error};
use shared::networking::{discovery_answer, is_discovery_question};
use shared::ServerState;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;

/// Answers every discovery question with this server's name, but only while
/// `state` says new players are welcome. Questions arriving at other times
/// are dropped without a reply.
pub async fn run_discovery_responder(
    socket: UdpSocket,
    state: watch::Receiver<ServerState>,
    server_name: String,
) {
    let answer = discovery_answer(&server_name);
    let mut buffer = [0u8; 512];

    loop {
        match socket.recv_from(&mut buffer).await {
            Ok((len, addr)) => {
                if !is_discovery_question(&buffer[..len]) {
                    debug!("Ignoring {} byte datagram from {}", len, addr);
                    continue;
                }

                let current = *state.borrow();
                if !current.accepts_new_players() {
                    debug!("Not answering discovery from {} while {:?}", addr, current);
                    continue;
                }

                if let Err(e) = socket.send_to(answer.as_bytes(), addr).await {
                    error!("Failed to answer discovery from {}: {}", addr, e);
                } else {
                    debug!("Answered discovery from {}", addr);
                }
            }
            Err(e) => {
                error!("Error receiving discovery datagram: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

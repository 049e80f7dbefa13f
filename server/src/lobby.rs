//! Minimal lobby application driving the network core
//!
//! Admits players, answers id requests synchronously and relays lobby chat.
//! Everything game-specific beyond that belongs to the application proper.

use crate::connection_manager::{ConnectionId, PlayerInfo};
use crate::network::{ServerEvent, ServerNetworking};
use log::{error, info, warn};
use shared::networking::SERVER_PLAYER_ID;
use shared::{Message, MessageType, PlayerId, ServerState};
use tokio::sync::mpsc;

pub struct LobbyHost {
    next_player_id: PlayerId,
    next_object_id: i32,
    next_design_id: i32,
    host_player_id: Option<PlayerId>,
}

impl Default for LobbyHost {
    fn default() -> Self {
        Self::new()
    }
}

impl LobbyHost {
    pub fn new() -> Self {
        Self {
            next_player_id: 1,
            next_object_id: 1,
            next_design_id: 1,
            host_player_id: None,
        }
    }

    pub fn host_player_id(&self) -> Option<PlayerId> {
        self.host_player_id
    }

    /// Opens the lobby and handles events until the network core goes away.
    pub async fn run(mut self, net: ServerNetworking, mut events: mpsc::UnboundedReceiver<ServerEvent>) {
        net.set_server_state(ServerState::Lobby);
        info!("Lobby open");

        while let Some(event) = events.recv().await {
            self.handle_event(&net, event).await;
        }

        info!("Lobby closed");
    }

    pub async fn handle_event(&mut self, net: &ServerNetworking, event: ServerEvent) {
        match event {
            ServerEvent::NewConnectionMessage {
                connection,
                message,
            } => self.handle_new_connection(net, connection, message).await,
            ServerEvent::PlayerMessage { player_id, message } => {
                self.handle_player_message(net, player_id, message).await
            }
            ServerEvent::PlayerDisconnected {
                connection,
                player_id,
            } => match player_id {
                Some(player_id) => {
                    info!("Player {} left", player_id);
                    if self.host_player_id == Some(player_id) {
                        warn!("Host player {} disconnected", player_id);
                        self.host_player_id = None;
                    }
                }
                None => info!("Connection {} left before joining", connection),
            },
        }
    }

    async fn handle_new_connection(
        &mut self,
        net: &ServerNetworking,
        connection: ConnectionId,
        message: Message,
    ) {
        if message.message_type != MessageType::JoinGame {
            warn!(
                "Ignoring {:?} from connection {} before it joined",
                message.message_type, connection
            );
            return;
        }

        if !net.server_state().accepts_new_players() {
            warn!(
                "Turning away connection {}: not accepting players while {:?}",
                connection,
                net.server_state()
            );
            net.dump_connection(connection).await;
            return;
        }

        let player_id = self.next_player_id;
        let is_host = self.host_player_id.is_none();
        let info = PlayerInfo {
            name: message.text(),
            is_host,
        };

        if !net.establish_player(connection, player_id, info).await {
            return;
        }
        self.next_player_id += 1;
        if is_host {
            self.host_player_id = Some(player_id);
        }

        let host = self.host_player_id.unwrap_or(player_id);
        match (Message::join_ack(player_id), Message::host_id(player_id, host)) {
            (Ok(ack), Ok(host_id)) => {
                net.send(ack).await;
                net.send(host_id).await;
            }
            (Err(e), _) | (_, Err(e)) => error!("Failed to build join replies: {}", e),
        }
    }

    async fn handle_player_message(
        &mut self,
        net: &ServerNetworking,
        player_id: PlayerId,
        message: Message,
    ) {
        match message.message_type {
            MessageType::RequestNewObjectId => {
                let object_id = self.next_object_id;
                self.next_object_id += 1;
                self.reply(net, Message::dispatch_new_object_id(player_id, object_id))
                    .await;
            }
            MessageType::RequestNewDesignId => {
                let design_id = self.next_design_id;
                self.next_design_id += 1;
                self.reply(net, Message::dispatch_new_design_id(player_id, design_id))
                    .await;
            }
            MessageType::LobbyChat => {
                let chat = Message::lobby_chat(player_id, SERVER_PLAYER_ID, &message.text());
                let sent = net.send_to_all(&chat).await;
                info!("Player {} says '{}' ({} recipients)", player_id, chat.text(), sent);
            }
            MessageType::LobbyExit => {
                info!("Player {} leaving the lobby", player_id);
                net.dump_player(player_id).await;
                if self.host_player_id == Some(player_id) {
                    self.host_player_id = None;
                }
            }
            other => warn!(
                "Lobby does not handle {:?} ({:?}) from player {}",
                other, message.module, player_id
            ),
        }
    }

    async fn reply(&self, net: &ServerNetworking, response: Result<Message, shared::ProtocolError>) {
        match response {
            Ok(response) => {
                net.send(response).await;
            }
            Err(e) => error!("Failed to build response: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use shared::networking::DEFAULT_MAX_MESSAGE_SIZE;
    use shared::transport::{read_message, write_message};
    use shared::Module;
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    async fn start() -> ServerNetworking {
        let (net, events) = ServerNetworking::listen(ServerConfig::ephemeral())
            .await
            .unwrap();
        tokio::spawn(LobbyHost::new().run(net.clone(), events));
        // Let the lobby open before anyone connects
        while net.server_state() != ServerState::Lobby {
            tokio::task::yield_now().await;
        }
        net
    }

    async fn recv(stream: &mut TcpStream) -> Message {
        timeout(Duration::from_secs(2), read_message(stream, DEFAULT_MAX_MESSAGE_SIZE))
            .await
            .unwrap()
            .unwrap()
    }

    /// Returns the stream with the join replies consumed, plus the assigned
    /// id and the announced host.
    async fn join(net: &ServerNetworking, name: &str) -> (TcpStream, PlayerId, PlayerId) {
        let mut stream = TcpStream::connect(net.local_addr()).await.unwrap();
        assert_eq!(recv(&mut stream).await.message_type, MessageType::ServerStatus);

        write_message(&mut stream, &Message::join_game(name)).await.unwrap();

        let ack = recv(&mut stream).await;
        assert_eq!(ack.message_type, MessageType::JoinAck);
        let host = recv(&mut stream).await;
        assert_eq!(host.message_type, MessageType::HostId);

        (stream, ack.body_as().unwrap(), host.body_as().unwrap())
    }

    #[tokio::test]
    async fn test_first_joiner_is_host() {
        let net = start().await;

        let (_alice, alice_id, alice_host) = join(&net, "Alice").await;
        let (_bob, bob_id, bob_host) = join(&net, "Bob").await;

        assert_eq!(alice_id, 1);
        assert_eq!(bob_id, 2);
        assert_eq!(alice_host, 1);
        assert_eq!(bob_host, 1);
        assert_eq!(net.host_player_id().await, Some(1));

        net.shutdown().await;
    }

    #[tokio::test]
    async fn test_object_ids_are_synchronous_responses() {
        let net = start().await;
        let (mut alice, alice_id, _) = join(&net, "Alice").await;

        for expected in 1..=3 {
            write_message(&mut alice, &Message::request_new_object_id(alice_id))
                .await
                .unwrap();
            let response = recv(&mut alice).await;
            assert_eq!(response.message_type, MessageType::DispatchNewObjectId);
            assert_eq!(response.module, Module::SynchronousResponse);
            assert_eq!(response.body_as::<i32>().unwrap(), expected);
        }

        write_message(&mut alice, &Message::request_new_design_id(alice_id))
            .await
            .unwrap();
        let response = recv(&mut alice).await;
        assert_eq!(response.message_type, MessageType::DispatchNewDesignId);
        assert_eq!(response.body_as::<i32>().unwrap(), 1);

        net.shutdown().await;
    }

    #[tokio::test]
    async fn test_chat_is_relayed_to_everyone() {
        let net = start().await;
        let (mut alice, alice_id, _) = join(&net, "Alice").await;
        let (mut bob, _, _) = join(&net, "Bob").await;

        write_message(&mut alice, &Message::lobby_chat(alice_id, SERVER_PLAYER_ID, "hello"))
            .await
            .unwrap();

        for stream in [&mut alice, &mut bob] {
            let chat = recv(stream).await;
            assert_eq!(chat.message_type, MessageType::LobbyChat);
            assert_eq!(chat.sender, alice_id);
            assert_eq!(chat.text(), "hello");
        }

        net.shutdown().await;
    }

    #[tokio::test]
    async fn test_join_refused_outside_lobby() {
        let net = start().await;
        net.set_server_state(ServerState::PlayingGame);

        let mut stream = TcpStream::connect(net.local_addr()).await.unwrap();
        recv(&mut stream).await;
        write_message(&mut stream, &Message::join_game("Late")).await.unwrap();

        let result = timeout(
            Duration::from_secs(2),
            read_message(&mut stream, DEFAULT_MAX_MESSAGE_SIZE),
        )
        .await
        .unwrap();
        assert!(result.is_err());
        assert!(net.established_players().await.is_empty());

        net.shutdown().await;
    }

    #[tokio::test]
    async fn test_lobby_exit_dumps_player() {
        let net = start().await;
        let (mut alice, alice_id, _) = join(&net, "Alice").await;

        let exit = Message::new(
            MessageType::LobbyExit,
            alice_id,
            SERVER_PLAYER_ID,
            Module::Lobby,
            Vec::new(),
        );
        write_message(&mut alice, &exit).await.unwrap();

        assert!(timeout(
            Duration::from_secs(2),
            read_message(&mut alice, DEFAULT_MAX_MESSAGE_SIZE)
        )
        .await
        .unwrap()
        .is_err());
        assert!(net.established_players().await.is_empty());

        net.shutdown().await;
    }
}

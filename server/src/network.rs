//! Server network layer: TCP accept loop, per-connection pumps, inbound
//! dispatch and the UDP discovery responder

use crate::config::ServerConfig;
use crate::connection_manager::{ConnectionId, ConnectionTable, PlayerConnection, PlayerInfo};
use crate::discovery::run_discovery_responder;
use log::{debug, error, info, warn};
use shared::networking::INVALID_PLAYER_ID;
use shared::socket::configure_stream;
use shared::transport::{run_read_pump, run_write_pump};
use shared::{Message, NetworkError, PlayerId, ProtocolError, ServerState};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::AbortHandle;

/// Events handed to the application sitting on top of the network core
#[derive(Debug)]
pub enum ServerEvent {
    /// A message for the server from an established player. `player_id` is
    /// the player bound to the arrival connection, whatever the message
    /// claims as its sender.
    PlayerMessage { player_id: PlayerId, message: Message },
    /// A message for the server from a connection not yet bound to a player
    NewConnectionMessage {
        connection: ConnectionId,
        message: Message,
    },
    /// A connection went away without the application dumping it
    PlayerDisconnected {
        connection: ConnectionId,
        player_id: Option<PlayerId>,
    },
}

/// Raw events from the per-connection pumps into the dispatch task
#[derive(Debug)]
enum TransportEvent {
    Received {
        connection: ConnectionId,
        message: Message,
    },
    Closed {
        connection: ConnectionId,
        error: Option<ProtocolError>,
    },
}

struct Inner {
    config: ServerConfig,
    connections: RwLock<ConnectionTable>,
    state: watch::Sender<ServerState>,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    events: mpsc::UnboundedSender<ServerEvent>,
    local_addr: SocketAddr,
    discovery_addr: SocketAddr,
    tasks: Mutex<Vec<AbortHandle>>,
}

/// Handle to a listening server. Cheap to clone; every clone drives the
/// same connection table.
#[derive(Clone)]
pub struct ServerNetworking {
    inner: Arc<Inner>,
}

impl ServerNetworking {
    /// Binds the message port and the discovery port, then starts accepting.
    ///
    /// Failing to bind either port is returned as [`NetworkError::Bind`];
    /// nothing is left running in that case.
    pub async fn listen(
        config: ServerConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerEvent>), NetworkError> {
        let message_addr = config.message_addr();
        let listener = TcpListener::bind(message_addr)
            .await
            .map_err(|source| NetworkError::Bind {
                addr: message_addr,
                source,
            })?;

        let discovery_addr = config.discovery_addr();
        let discovery = UdpSocket::bind(discovery_addr)
            .await
            .map_err(|source| NetworkError::Bind {
                addr: discovery_addr,
                source,
            })?;

        let local_addr = listener.local_addr()?;
        let discovery_addr = discovery.local_addr()?;
        info!(
            "Server listening on {} (discovery on {})",
            local_addr, discovery_addr
        );

        let (state, state_rx) = watch::channel(ServerState::Idle);
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let server_name = config.server_name.clone();

        let server = Self {
            inner: Arc::new(Inner {
                config,
                connections: RwLock::new(ConnectionTable::new()),
                state,
                transport_tx,
                events,
                local_addr,
                discovery_addr,
                tasks: Mutex::new(Vec::new()),
            }),
        };

        let accept = tokio::spawn(server.clone().accept_loop(listener));
        let dispatch = tokio::spawn(server.clone().dispatch_loop(transport_rx));
        let discovery = tokio::spawn(run_discovery_responder(discovery, state_rx, server_name));

        if let Ok(mut tasks) = server.inner.tasks.lock() {
            tasks.extend([
                accept.abort_handle(),
                dispatch.abort_handle(),
                discovery.abort_handle(),
            ]);
        }

        Ok((server, events_rx))
    }

    async fn accept_loop(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => self.handle_accept(stream, addr).await,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    /// Records the peer as a New connection, starts its pumps and tells it
    /// what state the server is in.
    async fn handle_accept(&self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = configure_stream(&stream, &self.inner.config.socket) {
            warn!("Failed to set socket options for {}: {}", addr, e);
        }

        let (reader, writer) = stream.into_split();
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();

        let connection = self
            .inner
            .connections
            .write()
            .await
            .add_connection(addr, jobs_tx);

        let transport = self.inner.transport_tx.clone();
        tokio::spawn(async move {
            if let Err(error) = run_write_pump(writer, jobs_rx, |_| {}).await {
                let _ = transport.send(TransportEvent::Closed {
                    connection,
                    error: Some(error),
                });
            }
        });

        let transport = self.inner.transport_tx.clone();
        let max_body = self.inner.config.max_message_size;
        let reader_task = tokio::spawn(async move {
            let result = run_read_pump(reader, max_body, |message| {
                transport
                    .send(TransportEvent::Received {
                        connection,
                        message,
                    })
                    .is_ok()
            })
            .await;

            let _ = transport.send(TransportEvent::Closed {
                connection,
                error: result.err(),
            });
        });

        self.inner
            .connections
            .write()
            .await
            .set_reader(connection, reader_task.abort_handle());

        match Message::server_status(INVALID_PLAYER_ID, self.server_state()) {
            Ok(status) => {
                self.send_to_connection(connection, status).await;
            }
            Err(e) => error!("Failed to build server status: {}", e),
        }
    }

    async fn dispatch_loop(self, mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = transport_rx.recv().await {
            match event {
                TransportEvent::Received {
                    connection,
                    message,
                } => self.handle_message(connection, message).await,
                TransportEvent::Closed { connection, error } => {
                    self.handle_closed(connection, error).await
                }
            }
        }
    }

    async fn handle_message(&self, connection: ConnectionId, message: Message) {
        let (arrival_player, claimed_elsewhere) = {
            let table = self.inner.connections.read().await;
            let Some(arrival) = table.get(connection) else {
                debug!(
                    "Dropping {:?} from connection {} which is already gone",
                    message.message_type, connection
                );
                return;
            };
            let claimed_elsewhere = table
                .connection_for_player(message.sender)
                .filter(|bound| *bound != connection);
            (arrival.player_id, claimed_elsewhere)
        };

        let forged = match (arrival_player, claimed_elsewhere) {
            (_, Some(bound)) => {
                error!(
                    "Connection {} sent {:?} claiming to be player {}, who is on connection {}; dropping it",
                    connection, message.message_type, message.sender, bound
                );
                true
            }
            (Some(player_id), None) if message.sender != player_id => {
                error!(
                    "Player {} on connection {} sent {:?} with sender {}; dropping it",
                    player_id, connection, message.message_type, message.sender
                );
                true
            }
            _ => false,
        };
        if forged {
            if let Some(player_id) = self.take_connection(connection).await {
                self.emit(ServerEvent::PlayerDisconnected {
                    connection,
                    player_id,
                });
            }
            return;
        }

        if message.is_addressed_to_server() {
            let event = match arrival_player {
                Some(player_id) => ServerEvent::PlayerMessage { player_id, message },
                None => ServerEvent::NewConnectionMessage {
                    connection,
                    message,
                },
            };
            self.emit(event);
        } else if arrival_player.is_some() {
            debug!(
                "Relaying {:?} from player {} to player {}",
                message.message_type, message.sender, message.receiver
            );
            self.send(message).await;
        } else {
            error!(
                "Rejecting {:?} for player {} from unestablished connection {}",
                message.message_type, message.receiver, connection
            );
        }
    }

    async fn handle_closed(&self, connection: ConnectionId, error: Option<ProtocolError>) {
        let Some(record) = self.inner.connections.write().await.remove(connection) else {
            return;
        };

        match &error {
            None => info!("Connection {} ({}) closed", connection, record.addr),
            Some(e) if e.is_disconnect() => {
                info!("Connection {} ({}) closed: {}", connection, record.addr, e)
            }
            Some(e) => error!("Connection {} ({}) failed: {}", connection, record.addr, e),
        }

        let player_id = record.player_id;
        record.close();
        self.emit(ServerEvent::PlayerDisconnected {
            connection,
            player_id,
        });
    }

    fn emit(&self, event: ServerEvent) {
        if self.inner.events.send(event).is_err() {
            debug!("Application event receiver dropped");
        }
    }

    /// Removes and closes one connection. Returns its player id, which is
    /// `Some(None)` for a connection that was never established.
    async fn take_connection(&self, connection: ConnectionId) -> Option<Option<PlayerId>> {
        let record = self.inner.connections.write().await.remove(connection)?;
        Some(Self::close_record(record))
    }

    fn close_record(record: PlayerConnection) -> Option<PlayerId> {
        info!(
            "Dumping connection {} ({}{})",
            record.id,
            record.addr,
            record
                .player_id
                .map(|id| format!(", player {}", id))
                .unwrap_or_default()
        );
        let player_id = record.player_id;
        record.close();
        player_id
    }

    /// Routes `message` to the established player named by its receiver.
    pub async fn send(&self, message: Message) -> bool {
        let table = self.inner.connections.read().await;
        match table.find_player(message.receiver) {
            Some(connection) => {
                let receiver = message.receiver;
                let sent = connection.send(message);
                if !sent {
                    error!("Connection for player {} is no longer writable", receiver);
                }
                sent
            }
            None => {
                error!(
                    "Cannot send {:?}: no established player {}",
                    message.message_type, message.receiver
                );
                false
            }
        }
    }

    /// Sends to a specific connection, established or not.
    pub async fn send_to_connection(&self, connection: ConnectionId, message: Message) -> bool {
        let table = self.inner.connections.read().await;
        match table.get(connection) {
            Some(record) => record.send(message),
            None => {
                error!(
                    "Cannot send {:?}: no connection {}",
                    message.message_type, connection
                );
                false
            }
        }
    }

    /// Sends a copy of `message` to every established player, with the
    /// receiver rewritten per copy. Returns how many were queued.
    pub async fn send_to_all(&self, message: &Message) -> usize {
        let table = self.inner.connections.read().await;
        let mut sent = 0;
        for connection in table.connections() {
            if let Some(player_id) = connection.player_id {
                let mut copy = message.clone();
                copy.receiver = player_id;
                if connection.send(copy) {
                    sent += 1;
                }
            }
        }
        sent
    }

    /// Binds a New connection to `player_id`.
    ///
    /// If the requested name is taken by another established player, this
    /// player is stored as `name_<player_id>` and every tracked connection
    /// is sent a rename notice.
    pub async fn establish_player(
        &self,
        connection: ConnectionId,
        player_id: PlayerId,
        info: PlayerInfo,
    ) -> bool {
        if player_id == INVALID_PLAYER_ID {
            error!("Refusing to establish connection {} as the invalid player id", connection);
            return false;
        }

        let mut table = self.inner.connections.write().await;
        let requested = info.name.clone();

        match table.establish(connection, player_id, info) {
            Ok(None) => {
                info!(
                    "Connection {} established as player {} ({})",
                    connection, player_id, requested
                );
                true
            }
            Ok(Some(new_name)) => {
                info!(
                    "Connection {} established as player {}; name {} taken, renamed to {}",
                    connection, player_id, requested, new_name
                );
                for peer in table.connections() {
                    let receiver = peer.player_id.unwrap_or(INVALID_PLAYER_ID);
                    match Message::player_rename(receiver, player_id, &new_name) {
                        Ok(rename) => {
                            peer.send(rename);
                        }
                        Err(e) => error!("Failed to build rename notice: {}", e),
                    }
                }
                true
            }
            Err(e) => {
                error!("Failed to establish player {}: {}", player_id, e);
                false
            }
        }
    }

    pub async fn dump_player(&self, player_id: PlayerId) -> bool {
        let removed = self.inner.connections.write().await.remove_player(player_id);
        match removed {
            Some(record) => {
                Self::close_record(record);
                true
            }
            None => {
                error!("Cannot dump player {}: not connected", player_id);
                false
            }
        }
    }

    pub async fn dump_connection(&self, connection: ConnectionId) -> bool {
        if self.take_connection(connection).await.is_some() {
            true
        } else {
            error!("Cannot dump connection {}: not tracked", connection);
            false
        }
    }

    pub async fn dump_all_connections(&self) {
        let drained = self.inner.connections.write().await.drain();
        if !drained.is_empty() {
            info!("Dumping all {} connections", drained.len());
        }
        for record in drained {
            Self::close_record(record);
        }
    }

    pub fn set_server_state(&self, state: ServerState) {
        let previous = self.inner.state.send_replace(state);
        if previous != state {
            info!("Server state {:?} -> {:?}", previous, state);
        }
    }

    pub fn server_state(&self) -> ServerState {
        *self.inner.state.borrow()
    }

    pub async fn established_players(&self) -> Vec<PlayerId> {
        self.inner.connections.read().await.established_players()
    }

    pub async fn new_connection_count(&self) -> usize {
        self.inner.connections.read().await.new_connection_count()
    }

    pub async fn player_name(&self, player_id: PlayerId) -> Option<String> {
        self.inner
            .connections
            .read()
            .await
            .find_player(player_id)
            .and_then(|connection| connection.player_name.clone())
    }

    pub async fn host_player_id(&self) -> Option<PlayerId> {
        self.inner.connections.read().await.host_player_id()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn discovery_addr(&self) -> SocketAddr {
        self.inner.discovery_addr
    }

    /// Stops accepting, answering discovery and dispatching, then closes
    /// every connection.
    pub async fn shutdown(&self) {
        self.set_server_state(ServerState::ShuttingDown);
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        self.dump_all_connections().await;
        info!("Server shut down");
    }
}

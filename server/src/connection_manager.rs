//! Connection tracking for the server network core
//!
//! This module owns the server-side record of every live peer:
//! - Connection lifecycle (new, established, closed)
//! - Binding a connection to a player id, and the uniqueness rules that go with it
//! - Lookup by connection handle for inbound traffic and by player id for outbound
//!
//! There is exactly one table. "Established" is a property of a record (its
//! player id is set), not membership in a second map, so a player id can
//! never point at two live connections.

use log::info;
use shared::{Message, PlayerId, WriteJob};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Opaque handle identifying one accepted TCP connection.
///
/// Handles are never reused, so a peer that reconnects always gets a fresh
/// record in the New state.
pub type ConnectionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Accepted but not yet bound to a player
    New,
    /// Bound to a player id
    Established,
}

/// What the application knows about a player at the moment it admits them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub name: String,
    pub is_host: bool,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EstablishError {
    #[error("player {player_id} is already bound to connection {connection}")]
    PlayerAlreadyBound {
        player_id: PlayerId,
        connection: ConnectionId,
    },

    #[error("no new connection with handle {0}")]
    NoSuchNewConnection(ConnectionId),
}

/// One live peer
///
/// Holds the sending side of the connection's write pump and the abort
/// handle of its read pump; closing the record stops both, which closes
/// the socket.
#[derive(Debug)]
pub struct PlayerConnection {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub player_id: Option<PlayerId>,
    pub player_name: Option<String>,
    pub is_host: bool,
    pub accepted_at: Instant,
    outgoing: mpsc::UnboundedSender<WriteJob>,
    reader: Option<AbortHandle>,
}

impl PlayerConnection {
    pub fn new(
        id: ConnectionId,
        addr: SocketAddr,
        outgoing: mpsc::UnboundedSender<WriteJob>,
    ) -> Self {
        Self {
            id,
            addr,
            player_id: None,
            player_name: None,
            is_host: false,
            accepted_at: Instant::now(),
            outgoing,
            reader: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        if self.player_id.is_some() {
            ConnectionStatus::Established
        } else {
            ConnectionStatus::New
        }
    }

    pub fn is_established(&self) -> bool {
        self.status() == ConnectionStatus::Established
    }

    /// Queues a message on this connection's write pump. Returns false if
    /// the pump has already stopped.
    pub fn send(&self, message: Message) -> bool {
        self.outgoing.send(WriteJob::Send(message)).is_ok()
    }

    /// Stops both pumps. Unsent messages are discarded.
    pub fn close(self) {
        let _ = self.outgoing.send(WriteJob::Close);
        if let Some(reader) = self.reader {
            reader.abort();
        }
    }
}

/// Every connection the server currently tracks, new or established
pub struct ConnectionTable {
    connections: HashMap<ConnectionId, PlayerConnection>,
    next_connection_id: ConnectionId,
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            next_connection_id: 1,
        }
    }

    /// Records a freshly accepted peer in the New state.
    pub fn add_connection(
        &mut self,
        addr: SocketAddr,
        outgoing: mpsc::UnboundedSender<WriteJob>,
    ) -> ConnectionId {
        let id = self.next_connection_id;
        self.next_connection_id += 1;

        info!("Connection {} accepted from {}", id, addr);
        self.connections
            .insert(id, PlayerConnection::new(id, addr, outgoing));
        id
    }

    pub fn set_reader(&mut self, id: ConnectionId, reader: AbortHandle) {
        match self.connections.get_mut(&id) {
            Some(connection) => connection.reader = Some(reader),
            // Already gone; make sure its reader goes too
            None => reader.abort(),
        }
    }

    pub fn get(&self, id: ConnectionId) -> Option<&PlayerConnection> {
        self.connections.get(&id)
    }

    pub fn find_player(&self, player_id: PlayerId) -> Option<&PlayerConnection> {
        self.connections
            .values()
            .find(|connection| connection.player_id == Some(player_id))
    }

    pub fn connection_for_player(&self, player_id: PlayerId) -> Option<ConnectionId> {
        self.find_player(player_id).map(|connection| connection.id)
    }

    /// Promotes a New connection to an Established player.
    ///
    /// Fails if `player_id` is bound to a different connection, or if `id`
    /// is not a New connection. If another established player already uses
    /// the requested name, the player being established is stored as
    /// `name_<player_id>` instead and that name is returned.
    pub fn establish(
        &mut self,
        id: ConnectionId,
        player_id: PlayerId,
        info: PlayerInfo,
    ) -> Result<Option<String>, EstablishError> {
        if let Some(bound) = self.connection_for_player(player_id) {
            if bound != id {
                return Err(EstablishError::PlayerAlreadyBound {
                    player_id,
                    connection: bound,
                });
            }
        }

        let name_taken = self.connections.values().any(|connection| {
            connection.id != id
                && connection.is_established()
                && connection.player_name.as_deref() == Some(info.name.as_str())
        });

        let connection = self
            .connections
            .get_mut(&id)
            .filter(|connection| !connection.is_established())
            .ok_or(EstablishError::NoSuchNewConnection(id))?;

        let (name, renamed) = if name_taken {
            (format!("{}_{}", info.name, player_id), true)
        } else {
            (info.name, false)
        };

        connection.player_id = Some(player_id);
        connection.player_name = Some(name.clone());
        connection.is_host = info.is_host;

        Ok(renamed.then_some(name))
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<PlayerConnection> {
        self.connections.remove(&id)
    }

    pub fn remove_player(&mut self, player_id: PlayerId) -> Option<PlayerConnection> {
        let id = self.connection_for_player(player_id)?;
        self.connections.remove(&id)
    }

    pub fn drain(&mut self) -> Vec<PlayerConnection> {
        self.connections.drain().map(|(_, connection)| connection).collect()
    }

    pub fn connections(&self) -> impl Iterator<Item = &PlayerConnection> {
        self.connections.values()
    }

    /// Ids of all established players, ascending
    pub fn established_players(&self) -> Vec<PlayerId> {
        let mut players: Vec<PlayerId> = self
            .connections
            .values()
            .filter_map(|connection| connection.player_id)
            .collect();
        players.sort_unstable();
        players
    }

    pub fn new_connection_count(&self) -> usize {
        self.connections
            .values()
            .filter(|connection| !connection.is_established())
            .count()
    }

    pub fn host_player_id(&self) -> Option<PlayerId> {
        self.connections
            .values()
            .find(|connection| connection.is_host)
            .and_then(|connection| connection.player_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

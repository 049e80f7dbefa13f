//! The message envelope: one unit of client/server traffic

use crate::error::ProtocolError;
use crate::networking::{PlayerId, INVALID_PLAYER_ID, SERVER_PLAYER_ID};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Operation tag carried in every header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum MessageType {
    Undefined = 0,
    Debug = 1,
    ServerStatus = 2,
    HostSpGame = 3,
    HostMpGame = 4,
    JoinGame = 5,
    JoinAck = 6,
    HostId = 7,
    LobbyUpdate = 8,
    LobbyChat = 9,
    LobbyExit = 10,
    PlayerRename = 11,
    GameStart = 12,
    TurnOrders = 13,
    TurnProgress = 14,
    TurnUpdate = 15,
    PlayerChat = 16,
    EndGame = 17,
    RequestNewObjectId = 18,
    DispatchNewObjectId = 19,
    RequestNewDesignId = 20,
    DispatchNewDesignId = 21,
    CombatTurnOrders = 22,
}

impl MessageType {
    pub fn from_i32(value: i32) -> Option<Self> {
        use MessageType::*;

        let message_type = match value {
            0 => Undefined,
            1 => Debug,
            2 => ServerStatus,
            3 => HostSpGame,
            4 => HostMpGame,
            5 => JoinGame,
            6 => JoinAck,
            7 => HostId,
            8 => LobbyUpdate,
            9 => LobbyChat,
            10 => LobbyExit,
            11 => PlayerRename,
            12 => GameStart,
            13 => TurnOrders,
            14 => TurnProgress,
            15 => TurnUpdate,
            16 => PlayerChat,
            17 => EndGame,
            18 => RequestNewObjectId,
            19 => DispatchNewObjectId,
            20 => RequestNewDesignId,
            21 => DispatchNewDesignId,
            22 => CombatTurnOrders,
            _ => return None,
        };
        Some(message_type)
    }

    /// The reply type a sender of this message blocks for, if any.
    pub fn response_type(self) -> Option<MessageType> {
        match self {
            MessageType::RequestNewObjectId => Some(MessageType::DispatchNewObjectId),
            MessageType::RequestNewDesignId => Some(MessageType::DispatchNewDesignId),
            _ => None,
        }
    }

    pub fn is_synchronous(self) -> bool {
        self.response_type().is_some()
    }
}

/// Destination subsystem tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Module {
    Core = 0,
    Lobby = 1,
    Universe = 2,
    Empire = 3,
    Combat = 4,
    SynchronousResponse = 5,
}

impl Module {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Module::Core),
            1 => Some(Module::Lobby),
            2 => Some(Module::Universe),
            3 => Some(Module::Empire),
            4 => Some(Module::Combat),
            5 => Some(Module::SynchronousResponse),
            _ => None,
        }
    }
}

/// High-level state of the server application, as announced to peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerState {
    Idle,
    Lobby,
    GameSetup,
    PlayingGame,
    ShuttingDown,
}

impl ServerState {
    /// Only the lobby and game setup phases take new players, and only
    /// then does the server answer discovery queries.
    pub fn accepts_new_players(self) -> bool {
        matches!(self, ServerState::Lobby | ServerState::GameSetup)
    }
}

/// One wire unit. The header fields are derived from these attributes at
/// encode time, so the body length can never disagree with the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_type: MessageType,
    pub sender: PlayerId,
    pub receiver: PlayerId,
    pub module: Module,
    pub body: Vec<u8>,
}

impl Message {
    pub fn new(
        message_type: MessageType,
        sender: PlayerId,
        receiver: PlayerId,
        module: Module,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            message_type,
            sender,
            receiver,
            module,
            body: body.into(),
        }
    }

    /// Builds a message whose body is a bincode-encoded value.
    pub fn with_payload<T: Serialize>(
        message_type: MessageType,
        sender: PlayerId,
        receiver: PlayerId,
        module: Module,
        payload: &T,
    ) -> Result<Self, ProtocolError> {
        let body = bincode::serialize(payload)?;
        Ok(Self::new(message_type, sender, receiver, module, body))
    }

    /// Body length in bytes
    pub fn size(&self) -> usize {
        self.body.len()
    }

    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(bincode::deserialize(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_synchronous_response(&self) -> bool {
        self.module == Module::SynchronousResponse
    }

    pub fn is_addressed_to_server(&self) -> bool {
        self.receiver == SERVER_PLAYER_ID
    }

    pub fn server_status(receiver: PlayerId, state: ServerState) -> Result<Self, ProtocolError> {
        Self::with_payload(
            MessageType::ServerStatus,
            SERVER_PLAYER_ID,
            receiver,
            Module::Core,
            &state,
        )
    }

    /// Tells `receiver` that `player_id` is now known as `new_name`.
    pub fn player_rename(
        receiver: PlayerId,
        player_id: PlayerId,
        new_name: &str,
    ) -> Result<Self, ProtocolError> {
        Self::with_payload(
            MessageType::PlayerRename,
            SERVER_PLAYER_ID,
            receiver,
            Module::Core,
            &(player_id, new_name.to_string()),
        )
    }

    pub fn join_game(player_name: &str) -> Self {
        Self::new(
            MessageType::JoinGame,
            INVALID_PLAYER_ID,
            SERVER_PLAYER_ID,
            Module::Core,
            player_name,
        )
    }

    pub fn join_ack(player_id: PlayerId) -> Result<Self, ProtocolError> {
        Self::with_payload(
            MessageType::JoinAck,
            SERVER_PLAYER_ID,
            player_id,
            Module::Core,
            &player_id,
        )
    }

    pub fn host_id(receiver: PlayerId, host_player_id: PlayerId) -> Result<Self, ProtocolError> {
        Self::with_payload(
            MessageType::HostId,
            SERVER_PLAYER_ID,
            receiver,
            Module::Core,
            &host_player_id,
        )
    }

    pub fn lobby_chat(sender: PlayerId, receiver: PlayerId, text: &str) -> Self {
        Self::new(MessageType::LobbyChat, sender, receiver, Module::Lobby, text)
    }

    pub fn request_new_object_id(sender: PlayerId) -> Self {
        Self::new(
            MessageType::RequestNewObjectId,
            sender,
            SERVER_PLAYER_ID,
            Module::Core,
            Vec::new(),
        )
    }

    pub fn dispatch_new_object_id(receiver: PlayerId, object_id: i32) -> Result<Self, ProtocolError> {
        Self::with_payload(
            MessageType::DispatchNewObjectId,
            SERVER_PLAYER_ID,
            receiver,
            Module::SynchronousResponse,
            &object_id,
        )
    }

    pub fn request_new_design_id(sender: PlayerId) -> Self {
        Self::new(
            MessageType::RequestNewDesignId,
            sender,
            SERVER_PLAYER_ID,
            Module::Core,
            Vec::new(),
        )
    }

    pub fn dispatch_new_design_id(receiver: PlayerId, design_id: i32) -> Result<Self, ProtocolError> {
        Self::with_payload(
            MessageType::DispatchNewDesignId,
            SERVER_PLAYER_ID,
            receiver,
            Module::SynchronousResponse,
            &design_id,
        )
    }
}

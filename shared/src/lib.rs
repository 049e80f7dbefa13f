//! Wire protocol pieces shared by the client and server network cores:
//! the message envelope, the fixed header codec, the queues sitting on either
//! side of the I/O pumps, and the protocol constants both builds agree on.

pub mod error;
pub mod header;
pub mod message;
pub mod networking;
pub mod queue;
pub mod socket;
pub mod transport;

pub use error::{NetworkError, ProtocolError};
pub use header::{Header, HEADER_SIZE};
pub use message::{Message, MessageType, Module, ServerState};
pub use networking::{PlayerId, INVALID_PLAYER_ID, SERVER_PLAYER_ID};
pub use queue::{IncomingQueue, OutgoingQueue};
pub use socket::SocketOptions;
pub use transport::WriteJob;

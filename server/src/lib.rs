//! # Game Server Network Library
//!
//! This library provides the server side of the client/server networking core.
//! It accepts player connections over TCP, answers LAN discovery over UDP, and
//! hands every inbound message to the application through a single event
//! channel.
//!
//! ## Core Responsibilities
//!
//! ### Connection Lifecycle
//! Every accepted peer starts as a *new connection* and is told the server's
//! current state straight away. The application promotes it to an
//! *established player* once it has vetted the join request. A connection is
//! closed when the peer hangs up, when its stream fails to frame, or when the
//! application dumps it. A closed connection never comes back; a reconnecting
//! peer gets a brand-new record.
//!
//! ### Sender Authentication
//! The identity of a message's sender is taken from the connection it arrived
//! on, never from the sender field it carries. A connection claiming to be a
//! player who is bound to a different connection is dropped on the spot and
//! its message discarded.
//!
//! ### Routing
//! Messages addressed to the server go to the application. Messages addressed
//! to another player are forwarded verbatim, but only when they come from an
//! established player.
//!
//! ### LAN Discovery
//! A UDP responder answers discovery questions with the server's name while
//! the server is in the lobby or setting up a game, and stays silent
//! otherwise.
//!
//! ## Architecture Design
//!
//! ### Single Connection Table
//! All peers live in one table keyed by an opaque connection handle. Whether a
//! peer is established is a field on its record, so a player id can never be
//! bound to two live connections.
//!
//! ### Task Layout
//! - **Accept loop**: accepts TCP peers, applies socket options, starts pumps
//! - **Read pump** (one per connection): frames messages and forwards them
//! - **Write pump** (one per connection): the only writer on its socket
//! - **Dispatch loop**: authenticates, routes and reports disconnects
//! - **Discovery responder**: answers UDP discovery questions
//!
//! ## Module Organization
//!
//! ### Config Module (`config`)
//! Bind address, ports, size limits, socket options and the advertised name.
//!
//! ### Connection Manager Module (`connection_manager`)
//! The connection table and the establish rules (uniqueness of player ids,
//! duplicate name resolution).
//!
//! ### Network Module (`network`)
//! Listening, inbound dispatch, routing, dumps and server state.
//!
//! ### Discovery Module (`discovery`)
//! The UDP discovery responder.
//!
//! ### Lobby Module (`lobby`)
//! A small application that admits players, answers id requests and relays
//! lobby chat.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::lobby::LobbyHost;
//! use server::network::ServerNetworking;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Bind the message and discovery ports
//!     let (net, events) = ServerNetworking::listen(ServerConfig::default()).await?;
//!
//!     // Open the lobby and serve until every handle is gone
//!     LobbyHost::new().run(net, events).await;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection_manager;
pub mod discovery;
pub mod lobby;
pub mod network;

//! # Client Network Core
//!
//! Client-side half of the game's networking: one TCP connection to a game
//! server, LAN discovery of servers, and the queues the application drains.
//!
//! ## Architecture Overview
//!
//! The application never touches the socket. It talks to
//! [`network::ClientNetworking`], which hands outgoing messages to a single
//! networking task as jobs and collects incoming messages into a shared queue:
//!
//! ```text
//! application --send--> job channel --> write pump --> socket
//! application <--receive-- incoming queue <-- read pump <-- socket
//! ```
//!
//! ### Networking Task
//! Spawned once a connection is confirmed. It runs the read pump and the
//! write pump side by side; whichever ends first (peer close, I/O error,
//! framing error, or an explicit close job) ends the connection. Both queues
//! are then cleared and the client reports itself disconnected.
//!
//! ### Synchronous Requests
//! Some requests (new object ids, new design ids) block their caller until
//! the server answers. Answers carry the synchronous-response module and are
//! pulled out of the incoming queue directly, so they never reach the
//! ordinary receive path. The wait is bounded by
//! [`config::ClientConfig::sync_timeout`].
//!
//! ### Discovery
//! [`discovery::discover_servers`] broadcasts a fixed question over UDP and
//! lists every server that answers within the discovery window.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::config::ClientConfig;
//! use client::network::ClientNetworking;
//! use shared::Message;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let net = ClientNetworking::new(ClientConfig::default());
//!
//!     if !net.connect_to_localhost(Duration::from_secs(5)).await {
//!         eprintln!("failed to connect");
//!         return;
//!     }
//!
//!     net.send(Message::join_game("Player"));
//!
//!     while net.has_messages() {
//!         if let Some(message) = net.receive() {
//!             println!("{:?}", message.message_type);
//!         }
//!     }
//!
//!     net.disconnect_from_server().await;
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod network;

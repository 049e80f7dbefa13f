//! Client network core: one server connection, its pumps, and the
//! synchronous request pattern layered over the incoming queue

use crate::config::ClientConfig;
use crate::discovery::{discover_servers, DiscoveredServer};
use log::{debug, error, info, warn};
use shared::networking::CONNECT_RETRY_INTERVAL;
use shared::socket::configure_stream;
use shared::transport::{run_read_pump, run_write_pump};
use shared::{IncomingQueue, Message, NetworkError, PlayerId, WriteJob, INVALID_PLAYER_ID};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

/// Where the connection is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    /// Connected with nothing in flight
    ConnectedIdle,
    /// Connected with a write in flight
    ConnectedWriting,
    /// Close requested, networking task not yet finished
    Closing,
}

impl ConnectionPhase {
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            ConnectionPhase::ConnectedIdle | ConnectionPhase::ConnectedWriting
        )
    }
}

/// Everything the application and the networking task both read, behind
/// one lock.
#[derive(Debug)]
struct Session {
    phase: ConnectionPhase,
    player_id: PlayerId,
    host_player_id: PlayerId,
}

impl Session {
    fn new() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            player_id: INVALID_PLAYER_ID,
            host_player_id: INVALID_PLAYER_ID,
        }
    }
}

struct Link {
    jobs: mpsc::UnboundedSender<WriteJob>,
    task: JoinHandle<()>,
}

fn lock_session(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ClientNetworking {
    config: ClientConfig,
    session: Arc<Mutex<Session>>,
    incoming: Arc<IncomingQueue>,
    link: Mutex<Option<Link>>,
}

impl ClientNetworking {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            session: Arc::new(Mutex::new(Session::new())),
            incoming: Arc::new(IncomingQueue::new()),
            link: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connects to `address` (host or host:port), trying each resolved
    /// endpoint in turn until one accepts or `timeout` has passed.
    ///
    /// Returns whether a connection now exists. Failures are logged.
    pub async fn connect_to_server(&self, address: &str, timeout: Duration) -> bool {
        {
            let mut session = lock_session(&self.session);
            if session.phase != ConnectionPhase::Disconnected {
                warn!(
                    "connect_to_server called while {:?}, ignoring",
                    session.phase
                );
                return session.phase.is_connected();
            }
            session.phase = ConnectionPhase::Connecting;
        }

        match self.open_stream(address, timeout).await {
            Ok(stream) => {
                self.start_networking(stream);
                info!("Connected to server at {}", address);
                true
            }
            Err(e) => {
                error!("Failed to connect to server at {}: {}", address, e);
                lock_session(&self.session).phase = ConnectionPhase::Disconnected;
                false
            }
        }
    }

    pub async fn connect_to_localhost(&self, timeout: Duration) -> bool {
        self.connect_to_server(&Ipv4Addr::LOCALHOST.to_string(), timeout)
            .await
    }

    async fn resolve(&self, address: &str) -> Result<Vec<SocketAddr>, NetworkError> {
        if let Ok(addr) = address.parse::<SocketAddr>() {
            return Ok(vec![addr]);
        }

        let endpoints: Vec<SocketAddr> = match lookup_host(address).await {
            Ok(found) => found.collect(),
            Err(_) => lookup_host((address, self.config.message_port))
                .await
                .map_err(|e| NetworkError::Resolve(format!("{}: {}", address, e)))?
                .collect(),
        };

        if endpoints.is_empty() {
            return Err(NetworkError::Resolve(address.to_string()));
        }
        Ok(endpoints)
    }

    /// Round-robins over the resolved endpoints; the deadline is enforced
    /// here rather than by the socket layer.
    async fn open_stream(&self, address: &str, limit: Duration) -> Result<TcpStream, NetworkError> {
        let deadline = Instant::now() + limit;
        let endpoints = self.resolve(address).await?;

        loop {
            for endpoint in &endpoints {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(std::io::Error::from(std::io::ErrorKind::TimedOut).into());
                }

                match timeout(remaining, TcpStream::connect(endpoint)).await {
                    Ok(Ok(stream)) => return Ok(stream),
                    Ok(Err(e)) => debug!("Connection attempt to {} failed: {}", endpoint, e),
                    Err(_) => debug!("Connection attempt to {} timed out", endpoint),
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(remaining.min(CONNECT_RETRY_INTERVAL)).await;
        }
    }

    fn start_networking(&self, stream: TcpStream) {
        if let Err(e) = configure_stream(&stream, &self.config.socket) {
            warn!("Unable to apply socket options: {}", e);
        }

        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();

        // Must be set before the task exists so its exit can't be overwritten
        lock_session(&self.session).phase = ConnectionPhase::ConnectedIdle;

        let task = tokio::spawn(run_connection(
            stream,
            jobs_rx,
            Arc::clone(&self.session),
            Arc::clone(&self.incoming),
            self.config.max_message_size,
        ));

        let previous = self
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Link {
                jobs: jobs_tx,
                task,
            });
        if let Some(previous) = previous {
            previous.task.abort();
        }
    }

    /// Broadcasts a discovery question and lists the servers that answered.
    pub async fn discover_lan_servers(&self) -> Vec<DiscoveredServer> {
        discover_servers(
            &self.config.discovery_targets,
            self.config.discovery_window,
            &self.config.host_name,
        )
        .await
    }

    /// Queues `message` for the server. Logs and drops it when there is no
    /// connection.
    pub fn send(&self, message: Message) {
        if !self.is_connected() {
            error!(
                "Attempted to send {:?} while not connected",
                message.message_type
            );
            return;
        }

        let link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        match link.as_ref() {
            Some(link) => {
                if let Err(e) = link.jobs.send(WriteJob::Send(message)) {
                    error!("Networking task has stopped, dropping message: {:?}", e.0);
                }
            }
            None => error!(
                "Attempted to send {:?} without a connection",
                message.message_type
            ),
        }
    }

    /// Removes the oldest ordinary message from the incoming queue.
    ///
    /// Callers are expected to check [`ClientNetworking::has_messages`]
    /// first; calling on an empty queue is logged as an error.
    pub fn receive(&self) -> Option<Message> {
        let message = self.incoming.pop_front();
        if message.is_none() {
            error!("receive called with no messages available");
        }
        message
    }

    pub fn has_messages(&self) -> bool {
        !self.incoming.is_empty()
    }

    pub fn pending_messages(&self) -> usize {
        self.incoming.len()
    }

    /// Sends `message` and waits for the synchronous response to it.
    ///
    /// The response is taken out of the incoming queue and never shows up
    /// through [`ClientNetworking::receive`]. Returns `None` if the
    /// configured timeout passes or the connection drops first.
    pub async fn send_synchronous(&self, message: Message) -> Option<Message> {
        let request_type = message.message_type;
        let expected = request_type.response_type();
        let generation = self.incoming.generation();

        if !self.is_connected() {
            error!(
                "Attempted synchronous {:?} while not connected",
                request_type
            );
            return None;
        }

        self.send(message);

        let response = self.incoming.take_synchronous_response(expected, generation);
        let response = match self.config.sync_timeout {
            Some(limit) => match timeout(limit, response).await {
                Ok(response) => response,
                Err(_) => {
                    error!(
                        "Timed out after {:?} waiting for response to {:?}",
                        limit, request_type
                    );
                    self.incoming
                        .abandon_synchronous_response(expected, generation);
                    return None;
                }
            },
            None => response.await,
        };

        if response.is_none() {
            warn!(
                "Connection lost while waiting for response to {:?}",
                request_type
            );
        }
        response
    }

    /// Asks the networking task to close the connection and waits for it to
    /// finish. Does nothing when already disconnected.
    pub async fn disconnect_from_server(&self) {
        let link = self
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(link) = link else {
            debug!("disconnect_from_server called while not connected");
            return;
        };

        {
            let mut session = lock_session(&self.session);
            if session.phase.is_connected() {
                session.phase = ConnectionPhase::Closing;
            }
        }

        // Fails only if the task already exited on its own
        let _ = link.jobs.send(WriteJob::Close);

        if let Err(e) = link.task.await {
            if !e.is_cancelled() {
                error!("Networking task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        lock_session(&self.session).phase.is_connected()
    }

    pub fn phase(&self) -> ConnectionPhase {
        lock_session(&self.session).phase
    }

    pub fn player_id(&self) -> PlayerId {
        lock_session(&self.session).player_id
    }

    pub fn set_player_id(&self, player_id: PlayerId) {
        lock_session(&self.session).player_id = player_id;
    }

    pub fn host_player_id(&self) -> PlayerId {
        lock_session(&self.session).host_player_id
    }

    pub fn set_host_player_id(&self, host_player_id: PlayerId) {
        lock_session(&self.session).host_player_id = host_player_id;
    }

    pub fn player_is_host(&self, player_id: PlayerId) -> bool {
        player_id != INVALID_PLAYER_ID && player_id == self.host_player_id()
    }
}

/// Body of the networking task: runs both pumps until either ends, then
/// tears the connection state down.
async fn run_connection(
    stream: TcpStream,
    jobs: mpsc::UnboundedReceiver<WriteJob>,
    session: Arc<Mutex<Session>>,
    incoming: Arc<IncomingQueue>,
    max_message_size: usize,
) {
    let (reader, writer) = stream.into_split();

    let sink = Arc::clone(&incoming);
    let read_pump = run_read_pump(reader, max_message_size, move |message| {
        sink.push(message);
        true
    });

    let busy_session = Arc::clone(&session);
    let write_pump = run_write_pump(writer, jobs, move |busy| {
        let mut session = lock_session(&busy_session);
        if session.phase.is_connected() {
            session.phase = if busy {
                ConnectionPhase::ConnectedWriting
            } else {
                ConnectionPhase::ConnectedIdle
            };
        }
    });

    let result = tokio::select! {
        result = read_pump => result,
        result = write_pump => result,
    };

    match result {
        Ok(()) => info!("Disconnected from server"),
        Err(e) if e.is_disconnect() => info!("Server closed the connection: {}", e),
        Err(e) => error!("Connection to server failed: {}", e),
    }

    // Phase first: a request that still sees Connected has already captured
    // the old generation and is released by the clear below.
    {
        let mut session = lock_session(&session);
        session.phase = ConnectionPhase::Disconnected;
        session.player_id = INVALID_PLAYER_ID;
        session.host_player_id = INVALID_PLAYER_ID;
    }
    incoming.clear();
}

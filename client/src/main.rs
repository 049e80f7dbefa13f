use clap::Parser;
use client::config::ClientConfig;
use client::network::ClientNetworking;
use log::{error, info, warn};
use shared::{Message, MessageType, PlayerId};
use std::time::Duration;
use tokio::time::{sleep, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to (host or host:port)
    #[arg(short = 's', long)]
    server: Option<String>,

    /// Look for servers on the local network and join the first one found
    #[arg(short = 'd', long)]
    discover: bool,

    /// Player name to join with
    #[arg(short = 'n', long, default_value = "Player")]
    name: String,

    /// Connection timeout in seconds
    #[arg(short = 't', long, default_value = "10")]
    timeout: u64,

    /// Timeout for synchronous requests in seconds (0 waits forever)
    #[arg(long, default_value = "5")]
    sync_timeout: u64,
}

/// Polls the incoming queue until a message of `wanted` type shows up.
async fn wait_for(net: &ClientNetworking, wanted: MessageType, limit: Duration) -> Option<Message> {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline && net.is_connected() {
        while net.has_messages() {
            match net.receive() {
                Some(message) if message.message_type == wanted => return Some(message),
                Some(message) => info!(
                    "Received {:?} from {}: {}",
                    message.message_type,
                    message.sender,
                    message.text()
                ),
                None => break,
            }
        }
        sleep(Duration::from_millis(20)).await;
    }
    None
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ClientConfig {
        sync_timeout: (args.sync_timeout > 0).then(|| Duration::from_secs(args.sync_timeout)),
        ..ClientConfig::default()
    };
    let net = ClientNetworking::new(config);
    let timeout = Duration::from_secs(args.timeout);

    let server = match (args.server, args.discover) {
        (Some(server), _) => server,
        (None, true) => {
            let servers = net.discover_lan_servers().await;
            for server in &servers {
                info!("Found server '{}' at {}", server.name, server.address);
            }
            match servers.first() {
                Some(server) => server.address.to_string(),
                None => {
                    error!("No servers found on the local network");
                    return Ok(());
                }
            }
        }
        (None, false) => "127.0.0.1".to_string(),
    };

    info!("Connecting to: {}", server);
    if !net.connect_to_server(&server, timeout).await {
        error!("Failed to connect to {}", server);
        return Ok(());
    }

    net.send(Message::join_game(&args.name));
    let Some(ack) = wait_for(&net, MessageType::JoinAck, timeout).await else {
        warn!("Server never acknowledged the join");
        net.disconnect_from_server().await;
        return Ok(());
    };

    let player_id: PlayerId = ack.body_as()?;
    net.set_player_id(player_id);
    info!("Joined as player {}", player_id);

    if let Some(host) = wait_for(&net, MessageType::HostId, Duration::from_secs(1)).await {
        net.set_host_player_id(host.body_as()?);
        info!(
            "Host is player {} (that's {})",
            net.host_player_id(),
            if net.player_is_host(player_id) { "us" } else { "someone else" }
        );
    }

    match net
        .send_synchronous(Message::request_new_object_id(player_id))
        .await
    {
        Some(response) => info!("Server issued object id {}", response.body_as::<i32>()?),
        None => warn!("No object id issued"),
    }

    net.send(Message::lobby_chat(
        player_id,
        shared::SERVER_PLAYER_ID,
        &format!("{} says hello", args.name),
    ));
    wait_for(&net, MessageType::LobbyChat, Duration::from_secs(1)).await;

    net.disconnect_from_server().await;
    info!("Disconnected");

    Ok(())
}

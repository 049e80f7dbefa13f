use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::lobby::LobbyHost;
use server::network::ServerNetworking;
use shared::networking::{DISCOVERY_PORT, MESSAGE_PORT};
use std::net::IpAddr;

/// Main-method of the application.
/// Parses command-line arguments, binds the server ports and runs the lobby
/// until it ends or Ctrl+C is pressed.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: IpAddr,
        /// Port for player connections
        #[clap(short, long, default_value_t = MESSAGE_PORT)]
        port: u16,
        /// Port for LAN discovery questions
        #[clap(short, long, default_value_t = DISCOVERY_PORT)]
        discovery_port: u16,
        /// Name announced to LAN discovery
        #[clap(short, long)]
        name: Option<String>,
    }

    env_logger::init();
    let args = Args::parse();

    let defaults = ServerConfig::default();
    let config = ServerConfig {
        bind_ip: args.host,
        message_port: args.port,
        discovery_port: args.discovery_port,
        server_name: args.name.unwrap_or_else(|| defaults.server_name.clone()),
        ..defaults
    };

    let (net, events) = match ServerNetworking::listen(config).await {
        Ok(listening) => listening,
        Err(e) => {
            error!("Fatal: {}", e);
            std::process::exit(1);
        }
    };

    let lobby = tokio::spawn(LobbyHost::new().run(net.clone(), events));

    // Handle shutdown gracefully
    tokio::select! {
        result = lobby => {
            if let Err(e) = result {
                error!("Lobby task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    net.shutdown().await;
    Ok(())
}

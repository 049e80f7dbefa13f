//! TCP socket options applied to every message connection

use crate::networking::SOCKET_LINGER_TIME;
use socket2::SockRef;
use std::time::Duration;
use tokio::net::TcpStream;

/// Options applied on successful connect (client) and accept (server).
///
/// Linger and keep-alive make an ungraceful process exit still flush
/// pending bytes and let the peer notice a dead connection promptly.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    pub nodelay: bool,
    pub linger: Option<Duration>,
    pub keepalive: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            nodelay: true,
            linger: Some(SOCKET_LINGER_TIME),
            keepalive: true,
        }
    }
}

pub fn configure_stream(stream: &TcpStream, options: &SocketOptions) -> std::io::Result<()> {
    stream.set_nodelay(options.nodelay)?;

    let sock_ref = SockRef::from(stream);
    sock_ref.set_linger(options.linger)?;
    sock_ref.set_keepalive(options.keepalive)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_configure_stream_applies_options() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let stream = TcpStream::connect(addr).await.unwrap();
        configure_stream(&stream, &SocketOptions::default()).unwrap();

        let sock_ref = SockRef::from(&stream);
        assert!(sock_ref.keepalive().unwrap());
        assert_eq!(sock_ref.linger().unwrap(), Some(SOCKET_LINGER_TIME));
        assert!(stream.nodelay().unwrap());

        accept.await.unwrap();
    }
}

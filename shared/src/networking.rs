//! Fixed protocol constants shared by client and server builds

use std::time::Duration;

/// Player ids are signed so the sentinel below fits in the same field.
pub type PlayerId = i32;

/// "No player": the sender of server-originated messages, the receiver of
/// messages addressed to the server, and the id of an unjoined client.
pub const INVALID_PLAYER_ID: PlayerId = -1;
pub const SERVER_PLAYER_ID: PlayerId = INVALID_PLAYER_ID;

/// TCP port for game message traffic and player connections
pub const MESSAGE_PORT: u16 = 12345;
/// UDP port the server listens on for LAN discovery queries
pub const DISCOVERY_PORT: u16 = 12346;

/// Exact payload of a discovery request datagram
pub const DISCOVERY_QUESTION: &str = "ORION_NET_DISCOVERY?";
/// Prefix of a discovery answer; the server's name follows it
pub const DISCOVERY_ANSWER: &str = "ORION_NET_HERE:";

pub const SOCKET_LINGER_TIME: Duration = Duration::from_secs(5);

/// Largest body a header may declare before the frame is rejected (64MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(5);
pub const DISCOVERY_WINDOW: Duration = Duration::from_millis(500);
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Name of this machine as the operating system reports it, or
/// `"localhost"` when it reports none.
pub fn local_host_name() -> String {
    let name = gethostname::gethostname();
    let name = name.to_string_lossy();
    let name = name.trim();
    if name.is_empty() {
        "localhost".to_string()
    } else {
        name.to_string()
    }
}

/// Builds the datagram a server sends back to a discovery request.
pub fn discovery_answer(server_name: &str) -> String {
    format!("{}{}", DISCOVERY_ANSWER, server_name)
}

/// Extracts the server name from a discovery answer, if it is one.
pub fn parse_discovery_answer(payload: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(payload).ok()?;
    text.strip_prefix(DISCOVERY_ANSWER)
        .map(|name| name.trim().to_string())
}

pub fn is_discovery_question(payload: &[u8]) -> bool {
    payload == DISCOVERY_QUESTION.as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_answer_roundtrip() {
        let answer = discovery_answer("stardock");
        assert!(answer.starts_with(DISCOVERY_ANSWER));
        assert_eq!(
            parse_discovery_answer(answer.as_bytes()),
            Some("stardock".to_string())
        );
    }

    #[test]
    fn test_discovery_answer_rejects_foreign_payload() {
        assert_eq!(parse_discovery_answer(b"hello there"), None);
        assert_eq!(parse_discovery_answer(&[0xff, 0xfe, 0x00]), None);
    }

    #[test]
    fn test_discovery_question_is_exact_match() {
        assert!(is_discovery_question(DISCOVERY_QUESTION.as_bytes()));
        assert!(!is_discovery_question(b"ORION_NET_DISCOVERY"));
        assert!(!is_discovery_question(
            format!("{}extra", DISCOVERY_QUESTION).as_bytes()
        ));
    }

    #[test]
    fn test_sentinels() {
        assert_eq!(INVALID_PLAYER_ID, -1);
        assert_eq!(SERVER_PLAYER_ID, INVALID_PLAYER_ID);
        assert_ne!(MESSAGE_PORT, DISCOVERY_PORT);
    }

    #[test]
    fn test_local_host_name_is_never_empty() {
        assert!(!local_host_name().is_empty());
    }

    #[test]
    fn test_local_host_name_matches_os() {
        let reported = gethostname::gethostname();
        let expected = match reported.to_string_lossy().trim() {
            "" => "localhost".to_string(),
            name => name.to_string(),
        };
        assert_eq!(local_host_name(), expected);
    }
}

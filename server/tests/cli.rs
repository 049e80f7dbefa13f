//! Tests for the server binary's command line behavior

use std::net::TcpListener;
use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

/// A port already taken by another listener makes the server exit with an
/// error status instead of running without a message socket
#[test]
fn occupied_port_exits_with_failure() {
    let blocker = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = blocker.local_addr().unwrap().port();

    let mut child = Command::new(env!("CARGO_BIN_EXE_server"))
        .args(["-H", "127.0.0.1", "-p", &port.to_string(), "-d", "0"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() > deadline {
            child.kill().unwrap();
            panic!("server kept running on an occupied port");
        }
        sleep(Duration::from_millis(20));
    };

    assert!(!status.success());
    assert_eq!(status.code(), Some(1));
    drop(blocker);
}

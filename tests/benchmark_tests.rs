//! Performance benchmarks for the wire codec and framing

use shared::header::{encode_header, Header};
use shared::networking::DEFAULT_MAX_MESSAGE_SIZE;
use shared::transport::{read_message, write_message};
use shared::{Message, MessageType, Module, HEADER_SIZE};
use std::time::Instant;

/// Benchmarks header encoding
#[test]
fn benchmark_header_encode() {
    let message = Message::lobby_chat(1, 2, "benchmark");

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _ = encode_header(&message).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Header encode: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // Should complete in under 200ms for 100k iterations
    assert!(duration.as_millis() < 200);
}

/// Benchmarks header decoding, including field validation
#[test]
fn benchmark_header_decode() {
    let bytes = encode_header(&Message::new(
        MessageType::TurnOrders,
        3,
        -1,
        Module::Empire,
        vec![0u8; 4096],
    ))
    .unwrap();

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let header = Header::decode(&bytes).unwrap();
        assert_eq!(header.body_len, 4096);
    }

    let duration = start.elapsed();
    println!(
        "Header decode: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 200);
}

/// Benchmarks payload serialization for structured bodies
#[test]
fn benchmark_payload_serialization() {
    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        let message = Message::player_rename(i, i, "Renamed Player").unwrap();
        let (id, name): (i32, String) = message.body_as().unwrap();
        assert_eq!(id, i);
        assert_eq!(name.len(), 14);
    }

    let duration = start.elapsed();
    println!(
        "Payload round trip: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}

/// Benchmarks framing a stream of mixed-size messages through an in-memory pipe
#[tokio::test]
async fn benchmark_stream_framing() {
    let messages: Vec<Message> = (0..2_000)
        .map(|i| Message::lobby_chat(1, 2, &"z".repeat(i % 512)))
        .collect();
    let total_bytes: usize = messages.iter().map(|m| HEADER_SIZE + m.size()).sum();

    let (mut writer, mut reader) = tokio::io::duplex(64 * 1024);
    let start = Instant::now();

    let to_send = messages.clone();
    let write_task = tokio::spawn(async move {
        for message in &to_send {
            write_message(&mut writer, message).await.unwrap();
        }
    });

    for expected in &messages {
        let received = read_message(&mut reader, DEFAULT_MAX_MESSAGE_SIZE)
            .await
            .unwrap();
        assert_eq!(&received, expected);
    }
    write_task.await.unwrap();

    let duration = start.elapsed();
    println!(
        "Stream framing: {} messages ({} bytes) in {:?} ({:.2} MB/s)",
        messages.len(),
        total_bytes,
        duration,
        total_bytes as f64 / duration.as_secs_f64() / 1_000_000.0
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

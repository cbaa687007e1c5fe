// tests/unit_link_test.rs

mod common;

use std::time::Duration;

use common::{raw_frame, read_raw_frame, test_addr};
use fleetkeeper::connection::DeviceLink;
use fleetkeeper::core::protocol::{Denied, FrameHeader, MAX_BODY_LEN, MessageType, Pong, encode_header};
use prost::Message;
use tokio::io::AsyncWriteExt;

const IDLE: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_send_receive_roundtrip() {
    let (a, b) = tokio::io::duplex(4096);
    let sender = DeviceLink::new(a, test_addr(), IDLE);
    let receiver = DeviceLink::new(b, test_addr(), IDLE);

    let pong = Pong { seq: 7 };
    let request_id = sender.send(MessageType::Pong, &pong).await.unwrap();
    assert_eq!(request_id, 1);

    let frame = receiver.receive().await.unwrap();
    assert_eq!(frame.header.request_id, 1);
    assert_eq!(frame.message_type(), Some(MessageType::Pong));
    assert_eq!(frame.decode_body::<Pong>().unwrap(), pong);
}

#[tokio::test]
async fn test_request_ids_increase_per_connection() {
    let (a, b) = tokio::io::duplex(4096);
    let sender = DeviceLink::new(a, test_addr(), IDLE);
    let receiver = DeviceLink::new(b, test_addr(), IDLE);

    for expected in 1..=3u64 {
        let rid = sender.send(MessageType::Pong, &Pong { seq: expected }).await.unwrap();
        assert_eq!(rid, expected);
        let frame = receiver.receive().await.unwrap();
        assert_eq!(frame.header.request_id, expected);
    }
}

#[tokio::test]
async fn test_short_body_is_permanent_error() {
    let (a, mut b) = tokio::io::duplex(4096);
    let link = DeviceLink::new(a, test_addr(), IDLE);

    // Declare ten body bytes, deliver four, then hang up.
    let header = encode_header(FrameHeader {
        request_id: 1,
        message_type: MessageType::Pong as u64,
        body_len: 10,
    });
    b.write_all(&header).await.unwrap();
    b.write_all(&[1, 2, 3, 4]).await.unwrap();
    drop(b);

    let err = link.receive().await.unwrap_err();
    assert!(err.is_permanent(), "expected permanent error, got {err}");
}

#[tokio::test]
async fn test_truncated_header_is_permanent_error() {
    let (a, mut b) = tokio::io::duplex(4096);
    let link = DeviceLink::new(a, test_addr(), IDLE);

    b.write_all(&[0u8; 7]).await.unwrap();
    drop(b);

    let err = link.receive().await.unwrap_err();
    assert!(err.is_permanent());
}

#[tokio::test]
async fn test_oversized_declared_body_is_permanent_error() {
    let (a, mut b) = tokio::io::duplex(4096);
    let link = DeviceLink::new(a, test_addr(), IDLE);

    let header = encode_header(FrameHeader {
        request_id: 1,
        message_type: MessageType::Pong as u64,
        body_len: MAX_BODY_LEN + 1,
    });
    b.write_all(&header).await.unwrap();

    let err = link.receive().await.unwrap_err();
    assert!(err.is_permanent());
}

#[tokio::test]
async fn test_idle_window_bounds_receive() {
    let (a, _b) = tokio::io::duplex(4096);
    let link = DeviceLink::new(a, test_addr(), Duration::from_millis(50));

    let err = link.receive().await.unwrap_err();
    assert!(err.is_temporary(), "idle expiry should be retryable: {err}");
}

#[tokio::test]
async fn test_deny_sends_reason_then_closes() {
    let (a, mut b) = tokio::io::duplex(4096);
    let link = DeviceLink::new(a, test_addr(), IDLE);

    link.deny("unsupported protocol version", false).await.unwrap();

    let (header, body) = read_raw_frame(&mut b).await;
    assert_eq!(header.message_type, MessageType::Denied as u64);
    let denied = Denied::decode(body.as_slice()).unwrap();
    assert_eq!(denied.reason, "unsupported protocol version");
    assert!(!denied.soft);

    // The socket is closed right after the denial.
    let mut rest = Vec::new();
    let n = tokio::io::AsyncReadExt::read_to_end(&mut b, &mut rest).await.unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_empty_body_frame() {
    let (a, mut b) = tokio::io::duplex(4096);
    let link = DeviceLink::new(a, test_addr(), IDLE);

    b.write_all(&raw_frame(9, MessageType::Pong as u64, &[])).await.unwrap();

    let frame = link.receive().await.unwrap();
    assert_eq!(frame.header.request_id, 9);
    assert_eq!(frame.header.body_len, 0);
    assert!(frame.body.is_empty());
}

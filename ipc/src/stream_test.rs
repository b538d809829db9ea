use super::*;
use crate::Parameters;
use serde_json::json;
use tokio::time::{Duration, timeout};

fn result_map() -> Parameters {
    json!({"UrlResponse": "https://example.com/cb?code=abc"}).as_object().cloned().expect("object")
}

#[tokio::test]
async fn writer_and_reader_exchange_with_handshake() {
    let (daemon_side, helper_side) = tokio::io::duplex(64);
    let (helper_read, helper_write) = tokio::io::split(helper_side);
    let (daemon_read, daemon_write) = tokio::io::split(daemon_side);

    let helper = tokio::spawn(async move {
        let mut reader = FrameReader::new(helper_read, Role::Server, true);
        let mut writer = FrameWriter::new(helper_write, true).await.expect("handshake");
        let Some(Message::Start(params)) = reader.next().await.expect("read") else {
            panic!("expected start");
        };
        assert_eq!(params["Caption"], json!("A"));
        writer.send(&Message::SetResult(result_map())).await.expect("send");
    });

    let mut writer = FrameWriter::new(daemon_write, true).await.expect("handshake");
    let mut reader = FrameReader::new(daemon_read, Role::Client, true);
    let start = json!({"Caption": "A"}).as_object().cloned().expect("object");
    writer.send(&Message::Start(start)).await.expect("send");

    let reply = timeout(Duration::from_secs(2), reader.next())
        .await
        .expect("reply timed out")
        .expect("read");
    assert_eq!(reply, Some(Message::SetResult(result_map())));
    helper.await.expect("helper task");
}

#[tokio::test]
async fn reader_skips_opcodes_meant_for_other_role() {
    let (mut tx, rx) = tokio::io::duplex(256);
    let mut bytes = encode_frame(&Message::Start(Parameters::new()));
    bytes.extend(4u32.to_le_bytes());
    bytes.extend(77u32.to_le_bytes());
    bytes.extend(encode_frame(&Message::SetCanceled));
    tx.write_all(&bytes).await.expect("write");
    drop(tx);

    let mut reader = FrameReader::new(rx, Role::Client, false);
    assert_eq!(reader.next().await.expect("read"), Some(Message::SetCanceled));
    assert_eq!(reader.next().await.expect("read"), None);
}

#[tokio::test]
async fn reader_ignores_noise_before_token() {
    let (mut tx, rx) = tokio::io::duplex(256);
    tx.write_all(b"Gtk-Message: loaded module\n").await.expect("noise");
    tx.write_all(HANDSHAKE).await.expect("token");
    tx.write_all(&encode_frame(&Message::SetCanceled)).await.expect("frame");
    drop(tx);

    let mut reader = FrameReader::new(rx, Role::Client, true);
    assert_eq!(reader.next().await.expect("read"), Some(Message::SetCanceled));
}

#[tokio::test]
async fn end_of_stream_mid_frame_reads_as_closed() {
    let (mut tx, rx) = tokio::io::duplex(64);
    let frame = encode_frame(&Message::SetResult(result_map()));
    tx.write_all(&frame[..frame.len() / 2]).await.expect("write");
    drop(tx);

    let mut reader = FrameReader::new(rx, Role::Client, false);
    assert_eq!(reader.next().await.expect("read"), None);
}

#[tokio::test]
async fn oversized_frame_is_an_error() {
    let (mut tx, rx) = tokio::io::duplex(64);
    tx.write_all(&u32::MAX.to_le_bytes()).await.expect("write");

    let mut reader = FrameReader::new(rx, Role::Client, false);
    let err = reader.next().await.expect_err("oversized frame");
    assert!(matches!(err, CodecError::FrameTooLarge(_)));
}

#[tokio::test]
async fn shutdown_signals_end_of_stream_to_peer() {
    let (daemon_side, helper_side) = tokio::io::duplex(64);
    let (_daemon_read, daemon_write) = tokio::io::split(daemon_side);
    let mut writer = FrameWriter::new(daemon_write, true).await.expect("handshake");
    writer.send(&Message::Cancel).await.expect("send");
    writer.shutdown().await.expect("shutdown");

    let mut reader = FrameReader::new(helper_side, Role::Server, true);
    assert_eq!(reader.next().await.expect("read"), Some(Message::Cancel));
    assert_eq!(reader.next().await.expect("read"), None);
}

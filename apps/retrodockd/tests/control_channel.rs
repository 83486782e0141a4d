//! End-to-end control-channel tests: a real unix socket, the real framer and
//! the real emulation thread, with no core loaded.

use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::unbounded_channel;

use retrodock_host::runner::{Runner, RunnerConfig};
use retrodock_proto::encode_frame;
use retrodock_proto::messages::{ControlReply, ControlRequest};
use retrodockd::serve;
use tempfile::TempDir;

async fn start_server(dir: &Path) -> UnixStream {
    let socket = dir.join("control.sock");
    let listener = UnixListener::bind(&socket).unwrap();
    let (notify_tx, notify_rx) = unbounded_channel();
    let handle = Runner::spawn(
        RunnerConfig {
            frame_path: dir.join("frames"),
            system_dir: None,
            save_dir: None,
        },
        notify_tx,
    );
    tokio::spawn(async move {
        let _ = serve(listener, handle, notify_rx).await;
    });
    UnixStream::connect(&socket).await.unwrap()
}

async fn send(stream: &mut UnixStream, request: &ControlRequest) {
    let frame = encode_frame(request).unwrap();
    stream.write_all(&frame).await.unwrap();
}

async fn read_reply(stream: &mut UnixStream) -> ControlReply {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).await.unwrap();
    let len = u32::from_le_bytes(prefix) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn init_with_a_bogus_core_returns_an_error_reply() {
    let dir = TempDir::new().unwrap();
    let mut client = start_server(dir.path()).await;

    send(
        &mut client,
        &ControlRequest::InitEmu {
            core: "/nonexistent/core.so".into(),
            game: "/nonexistent/rom".into(),
        },
    )
    .await;

    match read_reply(&mut client).await {
        ControlReply::Error { message } => assert!(message.contains("failed to load core")),
        other => panic!("expected error reply, got {other:?}"),
    }
}

#[tokio::test]
async fn partial_writes_are_reassembled_into_one_request() {
    let dir = TempDir::new().unwrap();
    let mut client = start_server(dir.path()).await;

    let frame = encode_frame(&ControlRequest::PlayEmu).unwrap();
    // Split inside the length prefix, then inside the body.
    client.write_all(&frame[..2]).await.unwrap();
    client.flush().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    client.write_all(&frame[2..frame.len() - 3]).await.unwrap();
    client.flush().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    client.write_all(&frame[frame.len() - 3..]).await.unwrap();

    // No core is loaded, so the fully reassembled request is answered with
    // an invalid-transition error.
    match read_reply(&mut client).await {
        ControlReply::Error { message } => assert!(message.contains("invalid transition")),
        other => panic!("expected error reply, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_json_gets_an_error_and_the_connection_survives() {
    let dir = TempDir::new().unwrap();
    let mut client = start_server(dir.path()).await;

    let bad = b"{this is not json";
    client
        .write_all(&(bad.len() as u32).to_le_bytes())
        .await
        .unwrap();
    client.write_all(bad).await.unwrap();
    assert!(matches!(
        read_reply(&mut client).await,
        ControlReply::Error { .. }
    ));

    send(
        &mut client,
        &ControlRequest::UpdateVariable {
            key: "missing".into(),
            value: "x".into(),
        },
    )
    .await;
    match read_reply(&mut client).await {
        ControlReply::Error { message } => assert!(message.contains("unknown variable")),
        other => panic!("expected error reply, got {other:?}"),
    }
}

#[tokio::test]
async fn request_ahead_of_a_malformed_frame_is_still_answered() {
    let dir = TempDir::new().unwrap();
    let mut client = start_server(dir.path()).await;

    let mut burst = encode_frame(&ControlRequest::UpdateVariable {
        key: "missing".into(),
        value: "x".into(),
    })
    .unwrap();
    let bad = b"{this is not json";
    burst.extend_from_slice(&(bad.len() as u32).to_le_bytes());
    burst.extend_from_slice(bad);
    client.write_all(&burst).await.unwrap();

    // The well-formed request in front must not be swallowed by the broken
    // frame behind it: first its reply, then the framing error.
    match read_reply(&mut client).await {
        ControlReply::Error { message } => assert!(message.contains("unknown variable")),
        other => panic!("expected unknown-variable error, got {other:?}"),
    }
    match read_reply(&mut client).await {
        ControlReply::Error { message } => assert!(message.contains("malformed JSON")),
        other => panic!("expected malformed-JSON error, got {other:?}"),
    }
}

#[tokio::test]
async fn kill_replies_and_notifies_with_the_terminal_state() {
    let dir = TempDir::new().unwrap();
    let mut client = start_server(dir.path()).await;

    send(&mut client, &ControlRequest::KillEmu).await;

    // Direct reply first, then the state-change notification.
    match read_reply(&mut client).await {
        ControlReply::StateChanged { state } => assert_eq!(state, "killed"),
        other => panic!("expected stateChanged reply, got {other:?}"),
    }
    match read_reply(&mut client).await {
        ControlReply::StateChanged { state } => assert_eq!(state, "killed"),
        other => panic!("expected stateChanged notification, got {other:?}"),
    }

    // Terminal: every later verb is refused.
    send(&mut client, &ControlRequest::PlayEmu).await;
    assert!(matches!(
        read_reply(&mut client).await,
        ControlReply::Error { .. }
    ));
}

#[tokio::test]
async fn two_requests_in_one_write_get_two_replies() {
    let dir = TempDir::new().unwrap();
    let mut client = start_server(dir.path()).await;

    let mut burst = encode_frame(&ControlRequest::PlayEmu).unwrap();
    burst.extend_from_slice(&encode_frame(&ControlRequest::PauseEmu).unwrap());
    client.write_all(&burst).await.unwrap();

    for _ in 0..2 {
        assert!(matches!(
            read_reply(&mut client).await,
            ControlReply::Error { .. }
        ));
    }
}

mod common;

use jsonsock::{Address, MessageListener, MessageSocket};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use common::{collect_errors, collect_messages, init_tracing, next, WAIT};

async fn raw_client_and_server() -> (
    TcpStream,
    MessageSocket,
    mpsc::UnboundedReceiver<String>,
    mpsc::UnboundedReceiver<Value>,
) {
    let listener = MessageListener::bind(&Address::tcp("127.0.0.1", 0))
        .await
        .unwrap();
    let Address::Tcp(host_port) = listener.local_addr().unwrap() else {
        panic!("expected a tcp address");
    };
    let raw = TcpStream::connect(host_port).await.unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    let server = listener
        .accept_with(move |socket| {
            let _ = tx.send((collect_errors(socket), collect_messages(socket)));
        })
        .await
        .unwrap();
    let (errors, messages) = rx.recv().unwrap();
    (raw, server, errors, messages)
}

#[tokio::test]
async fn malformed_header_is_reported_once_and_yields_nothing() {
    init_tracing();
    let (mut raw, server, mut errors, mut messages) = raw_client_and_server().await;
    let (closed_tx, mut closes) = mpsc::unbounded_channel();
    server.on_close(move |had_error| {
        let _ = closed_tx.send(had_error);
    });

    raw.write_all(b"wtf#\"Hello\"").await.unwrap();
    let error = next(&mut errors).await;
    assert!(error.contains("InvalidHeader"), "{error}");

    raw.write_all(b"4#true13#\"Hello there\"").await.unwrap();
    raw.shutdown().await.unwrap();

    assert!(next(&mut closes).await, "close should carry the decode failure");
    tokio::time::timeout(WAIT, server.closed()).await.unwrap();
    assert!(errors.try_recv().is_err(), "reported exactly once");
    assert!(messages.try_recv().is_err(), "no messages after a bad header");
}

#[tokio::test]
async fn truncated_length_payload_is_skipped() {
    init_tracing();
    let (mut raw, server, mut errors, mut messages) = raw_client_and_server().await;

    raw.write_all(b"4#\"Hel").await.unwrap();
    let error = next(&mut errors).await;
    assert!(error.contains("InvalidPayload"), "{error}");

    raw.write_all(b"13#\"Hello there\"").await.unwrap();
    assert_eq!(next(&mut messages).await, json!("Hello there"));
    assert!(!server.is_closed());
}

#[tokio::test]
async fn frame_cut_by_close_is_reported() {
    init_tracing();
    let (mut raw, server, mut errors, _messages) = raw_client_and_server().await;

    raw.write_all(b"13#\"Hello").await.unwrap();
    raw.shutdown().await.unwrap();

    let error = next(&mut errors).await;
    assert!(error.contains("IncompleteFrame"), "{error}");
    tokio::time::timeout(WAIT, server.closed()).await.unwrap();
}

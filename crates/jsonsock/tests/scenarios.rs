mod common;

use jsonsock::{Address, MessageListener, MessageSocket, SocketError, SocketState};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use common::{collect_messages, init_tracing, next, unique_temp_dir, WAIT};

/// Server that answers `{"type":"ping"}` with `{"type":"pong"}` and records
/// whether it considered itself closed while handling each message.
async fn ping_pong_server(
    listener: MessageListener,
) -> (MessageSocket, mpsc::UnboundedReceiver<(Value, bool)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let server = listener
        .accept_with(move |socket| {
            socket.on_message(move |socket, message| {
                let _ = tx.send((message.clone(), socket.is_closed()));
                if message["type"] == "ping" {
                    let _ = socket.try_send(&json!({"type": "pong"}));
                }
            });
        })
        .await
        .expect("server should accept");
    (server, rx)
}

async fn ping_pong(address: Address, listener: MessageListener) {
    let server = tokio::spawn(ping_pong_server(listener));

    let client = MessageSocket::default();
    let mut replies = collect_messages(&client);
    client.connect(&address).await.expect("client should connect");
    assert_eq!(client.state(), SocketState::Open);

    client.send(&json!({"type": "ping"})).await.unwrap();
    assert_eq!(next(&mut replies).await, json!({"type": "pong"}));
    assert!(!client.is_closed());

    let (server, mut seen) = server.await.unwrap();
    assert_eq!(next(&mut seen).await, (json!({"type": "ping"}), false));
    assert!(!server.is_closed());

    client.send_and_close(&json!({"type": "bye"})).await.unwrap();
    assert!(client.is_closed());
    assert_eq!(next(&mut seen).await, (json!({"type": "bye"}), false));
    tokio::time::timeout(WAIT, server.closed())
        .await
        .expect("server should observe close");
    assert!(server.is_closed());
}

#[tokio::test]
async fn ping_pong_over_tcp() {
    init_tracing();
    let listener = MessageListener::bind(&Address::tcp("127.0.0.1", 0))
        .await
        .unwrap();
    let address = listener.local_addr().unwrap();
    ping_pong(address, listener).await;
}

#[cfg(unix)]
#[tokio::test]
async fn ping_pong_over_unix_socket() {
    init_tracing();
    let dir = unique_temp_dir("ping-pong");
    let address = Address::unix(dir.join("ping.sock"));
    let listener = MessageListener::bind(&address).await.unwrap();
    ping_pong(address, listener).await;
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn hundred_messages_arrive_in_order() {
    init_tracing();
    let listener = MessageListener::bind(&Address::tcp("127.0.0.1", 0))
        .await
        .unwrap();
    let address = listener.local_addr().unwrap();

    let (tx, mut received) = mpsc::unbounded_channel();
    let server = tokio::spawn(async move {
        listener
            .accept_with(move |socket| {
                socket.on_message(move |_, message| {
                    let _ = tx.send(message.clone());
                });
            })
            .await
            .unwrap()
    });

    let client = MessageSocket::default();
    client.connect(&address).await.unwrap();
    for i in 1..=100 {
        client.send(&json!({"number": i})).await.unwrap();
    }

    for expected in 1..=100 {
        assert_eq!(next(&mut received).await, json!({"number": expected}));
    }
    client.close().await.unwrap();
    let server = server.await.unwrap();
    tokio::time::timeout(WAIT, server.closed()).await.unwrap();
    assert!(received.try_recv().is_err(), "no duplicates");
    assert_eq!(server.stats().messages_received, 100);
}

#[tokio::test]
async fn send_after_close_never_panics() {
    init_tracing();
    let listener = MessageListener::bind(&Address::tcp("127.0.0.1", 0))
        .await
        .unwrap();
    let address = listener.local_addr().unwrap();
    let server = tokio::spawn(async move { listener.accept_with(|_| {}).await.unwrap() });

    let client = MessageSocket::default();
    client.connect(&address).await.unwrap();
    let _server = server.await.unwrap();

    client.close().await.unwrap();
    client.close().await.unwrap();
    assert!(client.is_closed());
    for _ in 0..3 {
        assert!(matches!(
            client.send(&json!("late")).await,
            Err(SocketError::Closed)
        ));
        assert!(matches!(client.flush().await, Err(SocketError::Closed)));
    }
    assert!(client.is_closed());
}

#[tokio::test]
async fn server_close_is_observed_and_reconnect_recovers() {
    init_tracing();
    let listener = MessageListener::bind(&Address::tcp("127.0.0.1", 0))
        .await
        .unwrap();
    let address = listener.local_addr().unwrap();

    let (tx, mut received) = mpsc::unbounded_channel();
    let server = tokio::spawn(async move {
        for round in 0..2 {
            let tx = tx.clone();
            let socket = listener
                .accept_with(move |socket| {
                    socket.on_message(move |_, message| {
                        let _ = tx.send((round, message.clone()));
                    });
                })
                .await
                .unwrap();
            if round == 0 {
                socket.close().await.unwrap();
            } else {
                socket.closed().await;
            }
        }
    });

    let client = MessageSocket::default();
    let (closed_tx, mut closes) = mpsc::unbounded_channel();
    client.on_close(move |had_error| {
        let _ = closed_tx.send(had_error);
    });

    client.connect(&address).await.unwrap();
    assert!(!next(&mut closes).await);
    assert!(client.is_closed());
    assert!(matches!(
        client.send(&json!(1)).await,
        Err(SocketError::Closed)
    ));

    client.reconnect().await.unwrap();
    assert_eq!(client.state(), SocketState::Open);
    client.send(&json!({"after": "reconnect"})).await.unwrap();
    assert_eq!(next(&mut received).await, (1, json!({"after": "reconnect"})));

    client.close().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn connect_failure_latches_closed_and_reports() {
    init_tracing();
    let listener = MessageListener::bind(&Address::tcp("127.0.0.1", 0))
        .await
        .unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let client = MessageSocket::default();
    let mut errors = common::collect_errors(&client);
    let err = client.connect(&address).await.unwrap_err();
    assert!(matches!(err, SocketError::Transport(_)));
    assert!(next(&mut errors).await.contains("Transport"));
    assert!(client.is_closed());
}

mod common;

use std::time::Duration;

use jsonsock::{
    send_once, send_once_and_receive, Address, MessageListener, MessageSocket, SocketError,
    SocketOptions,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use common::{init_tracing, next, unique_temp_dir, WAIT};

/// Accept `connections` clients, answering each message with `answer`.
fn spawn_server<F>(
    listener: MessageListener,
    connections: usize,
    answer: F,
) -> (
    mpsc::UnboundedReceiver<Value>,
    tokio::task::JoinHandle<Vec<MessageSocket>>,
)
where
    F: Fn(&Value) -> Option<Value> + Send + Sync + Clone + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        let mut sockets = Vec::new();
        for _ in 0..connections {
            let tx = tx.clone();
            let answer = answer.clone();
            let socket = listener
                .accept_with(move |socket| {
                    socket.on_message(move |socket, message| {
                        let _ = tx.send(message.clone());
                        if let Some(reply) = answer(message) {
                            let _ = socket.try_send(&reply);
                        }
                    });
                })
                .await
                .unwrap();
            sockets.push(socket);
        }
        sockets
    });
    (rx, task)
}

#[tokio::test]
async fn send_once_over_tcp() {
    init_tracing();
    let listener = MessageListener::bind(&Address::tcp("127.0.0.1", 0))
        .await
        .unwrap();
    let address = listener.local_addr().unwrap();
    let (mut received, server) = spawn_server(listener, 1, |_| None);

    send_once(&address, &json!({"fire": "forget"}), SocketOptions::default())
        .await
        .unwrap();
    assert_eq!(next(&mut received).await, json!({"fire": "forget"}));

    for socket in server.await.unwrap() {
        tokio::time::timeout(WAIT, socket.closed()).await.unwrap();
    }
}

#[cfg(unix)]
#[tokio::test]
async fn send_once_and_receive_over_unix_socket() {
    init_tracing();
    let dir = unique_temp_dir("oneshot");
    let address = Address::unix(dir.join("oneshot.sock"));
    let listener = MessageListener::bind(&address).await.unwrap();
    let (mut received, server) = spawn_server(listener, 2, |message| {
        if message["type"] == "ping" {
            Some(json!({"type": "pong"}))
        } else {
            Some(json!({"success": false, "error": "unknown message type"}))
        }
    });

    let reply = send_once_and_receive(&address, &json!({"type": "ping"}), SocketOptions::default())
        .await
        .unwrap();
    assert_eq!(reply, json!({"type": "pong"}));
    assert_eq!(next(&mut received).await, json!({"type": "ping"}));

    let err = send_once_and_receive(&address, &json!({"type": "bogus"}), SocketOptions::default())
        .await
        .unwrap_err();
    assert!(
        matches!(&err, SocketError::Remote(reason) if reason == "unknown message type"),
        "{err:?}"
    );

    for socket in server.await.unwrap() {
        tokio::time::timeout(WAIT, socket.closed()).await.unwrap();
    }
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn peer_closing_without_reply_is_disconnected() {
    init_tracing();
    let listener = MessageListener::bind(&Address::tcp("127.0.0.1", 0))
        .await
        .unwrap();
    let address = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let socket = listener.accept_with(|_| {}).await.unwrap();
        socket.close().await.unwrap();
    });

    let err = send_once_and_receive(
        &address,
        &json!("anyone?"),
        SocketOptions::default().with_reply_timeout(Duration::from_secs(5)),
    )
    .await
    .unwrap_err();
    assert!(
        matches!(err, SocketError::Disconnected | SocketError::Closed),
        "{err:?}"
    );
    server.await.unwrap();
}

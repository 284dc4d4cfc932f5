//! Fire-and-forget and request/reply helpers over a fresh connection.

use std::sync::{Arc, Mutex, PoisonError};

use jsonsock_transport::Address;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Result, SocketError};
use crate::options::SocketOptions;
use crate::socket::MessageSocket;

type ReplySlot = Arc<Mutex<Option<oneshot::Sender<Result<Value>>>>>;

/// Connect, send one message and close.
pub async fn send_once<T>(address: &Address, message: &T, options: SocketOptions) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let socket = MessageSocket::new(options);
    socket.connect(address).await?;
    socket.send_and_close(message).await
}

/// Connect, send one message, wait for exactly one reply and close.
///
/// A reply of the form `{"success": false, ...}` is turned into
/// [`SocketError::Remote`], carrying its `error` field (or `message` when
/// there is none). The first error on the connection fails the request, and
/// a close before any reply yields [`SocketError::Disconnected`]. Waits at
/// most [`SocketOptions::reply_timeout`] when set.
pub async fn send_once_and_receive<T>(
    address: &Address,
    message: &T,
    options: SocketOptions,
) -> Result<Value>
where
    T: Serialize + ?Sized,
{
    let reply_timeout = options.reply_timeout;
    let socket = MessageSocket::new(options);
    let (tx, rx) = oneshot::channel();
    let slot: ReplySlot = Arc::new(Mutex::new(Some(tx)));

    let on_reply = Arc::clone(&slot);
    socket.on_message(move |_, reply| settle(&on_reply, Ok(reply.clone())));
    let on_error = Arc::clone(&slot);
    socket.on_error(move |err| settle(&on_error, Err(err.replicate())));
    let on_close = Arc::clone(&slot);
    socket.on_close(move |_| settle(&on_close, Err(SocketError::Disconnected)));

    socket.connect(address).await?;
    if let Err(err) = socket.send(message).await {
        let _ = socket.close().await;
        return Err(err);
    }

    let reply = match reply_timeout {
        Some(limit) => match tokio::time::timeout(limit, rx).await {
            Ok(reply) => reply,
            Err(_) => {
                debug!(?limit, %address, "no reply in time");
                socket.abort();
                return Err(SocketError::Timeout(limit));
            }
        },
        None => rx.await,
    };

    if let Err(err) = socket.close().await {
        debug!(error = %err, "close after reply failed");
    }
    let reply = reply.map_err(|_| SocketError::Disconnected)??;
    check_reply(reply)
}

fn settle(slot: &ReplySlot, result: Result<Value>) {
    let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(sender) = sender {
        let _ = sender.send(result);
    }
}

fn check_reply(reply: Value) -> Result<Value> {
    if reply.get("success") != Some(&Value::Bool(false)) {
        return Ok(reply);
    }
    let reason = match reply.get("error").or_else(|| reply.get("message")) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => "remote reported failure".to_string(),
    };
    Err(SocketError::Remote(reason))
}

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use jsonsock::MessageSocket;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing_subscriber::EnvFilter;

pub const WAIT: Duration = Duration::from_secs(10);

/// Route library logs to the test harness; `RUST_LOG=debug` shows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_target(false)
        .try_init();
}

pub fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/jsonsock-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

pub fn collect_messages(socket: &MessageSocket) -> UnboundedReceiver<Value> {
    let (tx, rx) = mpsc::unbounded_channel();
    socket.on_message(move |_, message| {
        let _ = tx.send(message.clone());
    });
    rx
}

pub fn collect_errors(socket: &MessageSocket) -> UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    socket.on_error(move |err| {
        let _ = tx.send(format!("{err:?}"));
    });
    rx
}

pub async fn next<T>(rx: &mut UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

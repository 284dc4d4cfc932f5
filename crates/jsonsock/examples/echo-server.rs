//! Echo server: answers every message with the same message.
//!
//! Run with:
//!   cargo run --example echo-server -- tcp://127.0.0.1:7070
//!
//! In another terminal:
//!   cargo run --example ping-pong -- tcp://127.0.0.1:7070
//!
//! `unix:/tmp/jsonsock-echo.sock` works as well. Set `RUST_LOG=debug` for
//! connection-level logging.

use jsonsock::{Address, MessageListener};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let address: Address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tcp://127.0.0.1:7070".to_string())
        .parse()?;

    let listener = MessageListener::bind(&address).await?;
    eprintln!("Listening on {}", listener.local_addr()?);

    loop {
        let socket = listener
            .accept_with(|socket| {
                socket.on_message(|socket, message| {
                    if let Err(err) = socket.try_send(message) {
                        tracing::warn!(error = %err, "echo failed");
                    }
                });
                socket.on_error(|err| tracing::warn!(error = %err, "connection error"));
            })
            .await?;
        tokio::spawn(async move {
            socket.closed().await;
            let stats = socket.stats();
            eprintln!(
                "Peer disconnected after {} messages ({:.0} B/s)",
                stats.messages_received,
                stats.throughput()
            );
        });
    }
}

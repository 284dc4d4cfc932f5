//! Sends one ping to a server and prints the reply.
//!
//! Run the echo server first:
//!   cargo run --example echo-server
//!
//! Then:
//!   cargo run --example ping-pong -- tcp://127.0.0.1:7070

use std::time::Duration;

use jsonsock::{send_once_and_receive, Address, SocketOptions};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let address: Address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tcp://127.0.0.1:7070".to_string())
        .parse()?;

    let options = SocketOptions::default().with_reply_timeout(Duration::from_secs(3));
    let reply = send_once_and_receive(&address, &json!({"type": "ping"}), options).await?;
    println!("{reply}");
    Ok(())
}

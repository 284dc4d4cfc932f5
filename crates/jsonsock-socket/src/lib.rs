//! Event-driven JSON message sockets.
//!
//! A [`MessageSocket`] turns any duplex byte stream into a message channel:
//! values go in as length-prefixed JSON frames and come out through
//! registered listeners, in order, regardless of how the transport chunks
//! the bytes.
//!
//! Each connection runs two tasks. The reader decodes and dispatches; the
//! writer owns the outbound buffer and is fed through a bounded queue, which
//! is where backpressure is applied. Both stop when the socket closes.

pub mod error;
pub mod listener;
pub mod listeners;
pub mod oneshot;
pub mod options;
mod reader;
pub mod socket;
pub mod state;
pub mod stats;
mod writer;

pub use error::{Result, SocketError};
pub use listener::MessageListener;
pub use listeners::ListenerId;
pub use oneshot::{send_once, send_once_and_receive};
pub use options::{SocketOptions, WriteConfig, DEFAULT_CLOSE_TIMEOUT, DEFAULT_QUEUE_CAPACITY};
pub use socket::MessageSocket;
pub use state::SocketState;
pub use stats::{StatisticsProbe, Stats};

//! Duplex byte-stream transports for jsonsock.
//!
//! Provides a unified async interface over the local and network transports
//! a message socket can ride on:
//! - TCP (`host:port`)
//! - Unix domain sockets (Linux/macOS)
//!
//! This is the lowest layer of jsonsock. Everything else builds on top of
//! the [`Stream`] type and the [`Transport`] trait provided here.

pub mod address;
pub mod error;
pub mod listener;
pub mod traits;

pub use address::Address;
pub use error::{Result, TransportError};
pub use listener::Listener;
pub use traits::{connect, Stream, Transport};

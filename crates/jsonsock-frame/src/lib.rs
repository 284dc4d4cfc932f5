//! Length-prefixed JSON message framing.
//!
//! Every message travels as:
//! - the payload length in bytes, as ASCII decimal digits
//! - a one-byte delimiter (`#` by default)
//! - the payload, UTF-8 encoded JSON
//!
//! The decoder reassembles messages from arbitrarily chunked input. The
//! [`WriteScheduler`] decides when encoded frames reach the transport, either
//! one write per frame or coalesced into a bounded buffer.
//!
//! With the `async` feature, [`FrameDecoder`] and [`FrameEncoder`] implement
//! the `tokio_util::codec` traits.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod reader;
pub mod scheduler;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::JsonCodec;
pub use codec::{
    Decoded, Delimiter, FrameConfig, FrameDecoder, FrameEncoder, DEFAULT_DELIMITER,
    DEFAULT_MAX_HEADER_LEN, DEFAULT_MAX_PAYLOAD,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use scheduler::{WriteMode, WriteScheduler, DEFAULT_BATCH_CAPACITY, DEFAULT_IDLE_INTERVAL};
pub use writer::FrameWriter;

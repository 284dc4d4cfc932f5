use std::time::Duration;

use jsonsock_frame::FrameError;
use jsonsock_transport::TransportError;

/// Errors surfaced by a [`MessageSocket`](crate::MessageSocket).
///
/// Send-side errors are returned to the caller. Everything that happens on
/// the connection itself (decode failures, transport failures) is delivered
/// to the socket's error listeners instead.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// The socket is closing or closed.
    #[error("the socket is closed")]
    Closed,

    /// The socket has no connection yet.
    #[error("the socket is not connected")]
    NotConnected,

    /// The send queue is at capacity.
    #[error("send queue is full")]
    Full,

    /// Framing error (decode failure, oversize frame, serialization).
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Transport setup error (bind, connect, address).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Error reported by the underlying stream, passed through unchanged.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// The peer replied with `"success": false`.
    #[error("remote error: {0}")]
    Remote(String),

    /// The peer closed the connection before replying.
    #[error("peer disconnected before replying")]
    Disconnected,

    /// No reply arrived in time.
    #[error("no reply within {0:?}")]
    Timeout(Duration),
}

impl SocketError {
    /// Whether the connection's decode path or transport is finished.
    pub fn is_fatal(&self) -> bool {
        match self {
            SocketError::Frame(err) => err.is_fatal(),
            SocketError::Io(_) | SocketError::Transport(_) | SocketError::Disconnected => true,
            _ => false,
        }
    }

    /// Owned copy of an error seen by reference in a listener.
    ///
    /// Error sources that cannot be cloned are carried over by kind and
    /// message.
    pub(crate) fn replicate(&self) -> SocketError {
        match self {
            SocketError::Closed => SocketError::Closed,
            SocketError::NotConnected => SocketError::NotConnected,
            SocketError::Full => SocketError::Full,
            SocketError::Frame(err) => replicate_frame(err),
            SocketError::Transport(err) => match err.io_source() {
                Some(source) => SocketError::Io(copy_io(source)),
                None => SocketError::Io(std::io::Error::other(err.to_string())),
            },
            SocketError::Io(err) => SocketError::Io(copy_io(err)),
            SocketError::Remote(message) => SocketError::Remote(message.clone()),
            SocketError::Disconnected => SocketError::Disconnected,
            SocketError::Timeout(after) => SocketError::Timeout(*after),
        }
    }
}

fn replicate_frame(err: &FrameError) -> SocketError {
    let copy = match err {
        FrameError::InvalidHeader { header } => FrameError::InvalidHeader {
            header: header.clone(),
        },
        FrameError::HeaderTooLong { len, max } => FrameError::HeaderTooLong {
            len: *len,
            max: *max,
        },
        FrameError::PayloadTooLarge { size, max } => FrameError::PayloadTooLarge {
            size: *size,
            max: *max,
        },
        FrameError::InvalidPayload { payload, message } => FrameError::InvalidPayload {
            payload: payload.clone(),
            message: message.clone(),
        },
        FrameError::OversizeFrame { size, capacity } => FrameError::OversizeFrame {
            size: *size,
            capacity: *capacity,
        },
        FrameError::InvalidDelimiter(byte) => FrameError::InvalidDelimiter(*byte),
        FrameError::IncompleteFrame { buffered } => FrameError::IncompleteFrame {
            buffered: *buffered,
        },
        FrameError::ConnectionClosed => FrameError::ConnectionClosed,
        FrameError::Io(err) => FrameError::Io(copy_io(err)),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    };
    SocketError::Frame(copy)
}

fn copy_io(err: &std::io::Error) -> std::io::Error {
    std::io::Error::new(err.kind(), err.to_string())
}

pub type Result<T> = std::result::Result<T, SocketError>;

//! Length-prefixed JSON messages over stream sockets.
//!
//! Every message is one frame: the payload length in bytes as ASCII digits,
//! a delimiter (`#` by default), then the JSON text. Any JSON value can be
//! sent, and messages arrive whole and in order however the transport
//! splits the bytes.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP and Unix-domain streams, addresses, listeners
//! - [`frame`]: Frame codec, write batching, blocking reader/writer
//! - [`socket`]: Event-driven [`MessageSocket`], one-shot helpers

/// Re-export transport types.
pub mod transport {
    pub use jsonsock_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use jsonsock_frame::*;
}

/// Re-export socket types.
pub mod socket {
    pub use jsonsock_socket::*;
}

pub use jsonsock_frame::{Delimiter, FrameConfig, FrameError, WriteMode};
pub use jsonsock_socket::{
    send_once, send_once_and_receive, ListenerId, MessageListener, MessageSocket, SocketError,
    SocketOptions, SocketState,
};
pub use jsonsock_transport::Address;

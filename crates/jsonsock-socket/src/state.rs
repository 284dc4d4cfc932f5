use std::fmt;

/// Connection lifecycle of a [`MessageSocket`](crate::MessageSocket).
///
/// ```text
/// Idle ──connect──► Connecting ──► Open ──close──► Closing ──► Closed
///                                   │                           ▲
///                                   └──── peer EOF / error ─────┘
/// ```
///
/// `Closed` is latched: only an explicit reconnect or attach leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketState {
    /// No transport has been attached yet.
    Idle,
    /// A transport connect is in flight.
    Connecting,
    /// Messages flow in both directions.
    Open,
    /// A graceful close is draining the outbound path.
    Closing,
    /// The connection is finished.
    Closed,
}

impl SocketState {
    pub fn is_closed(self) -> bool {
        self == SocketState::Closed
    }

    /// Whether new messages may be sent in this state.
    pub fn accepts_sends(self) -> bool {
        self == SocketState::Open
    }
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SocketState::Idle => "idle",
            SocketState::Connecting => "connecting",
            SocketState::Open => "open",
            SocketState::Closing => "closing",
            SocketState::Closed => "closed",
        };
        f.write_str(name)
    }
}

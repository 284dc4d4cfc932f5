use bytes::Bytes;

/// Errors that can occur during frame encoding/decoding and write scheduling.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The length header is not a run of ASCII digits.
    #[error("invalid content length header ({header:?})")]
    InvalidHeader { header: String },

    /// No delimiter arrived within the maximum header length.
    #[error("content length header too long ({len} bytes without delimiter, max {max})")]
    HeaderTooLong { len: usize, max: usize },

    /// The declared payload length exceeds the configured maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A fully assembled payload is not valid JSON.
    #[error("could not parse JSON: {message}")]
    InvalidPayload { payload: Bytes, message: String },

    /// A single frame does not fit the write buffer.
    #[error("frame of {size} bytes exceeds write buffer capacity of {capacity} bytes")]
    OversizeFrame { size: usize, capacity: usize },

    /// The configured delimiter cannot be told apart from a length digit.
    #[error("invalid delimiter byte 0x{0:02x} (must be printable ASCII and not a digit)")]
    InvalidDelimiter(u8),

    /// The value could not be serialized as JSON.
    #[error("could not serialize message: {0}")]
    Serialize(#[source] serde_json::Error),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended in the middle of a frame.
    #[error("connection closed mid-frame ({buffered} bytes of an incomplete frame discarded)")]
    IncompleteFrame { buffered: usize },

    /// The stream is closed.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether this error makes the rest of the byte stream untrustworthy.
    ///
    /// Header errors leave no way to find the next frame boundary, so the
    /// decoder halts. Payload errors are delimited by their length prefix and
    /// decoding continues with the next frame.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FrameError::InvalidHeader { .. }
                | FrameError::HeaderTooLong { .. }
                | FrameError::PayloadTooLarge { .. }
                | FrameError::Io(_)
                | FrameError::IncompleteFrame { .. }
                | FrameError::ConnectionClosed
        )
    }

    /// Raw bytes of a payload that failed to parse.
    pub fn payload(&self) -> Option<&Bytes> {
        match self {
            FrameError::InvalidPayload { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;

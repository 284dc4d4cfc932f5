use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::error::{FrameError, Result};

/// Default header delimiter: `#`.
pub const DEFAULT_DELIMITER: u8 = b'#';

/// Default maximum payload size accepted by the decoder: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Default maximum number of header digits before a delimiter must appear.
pub const DEFAULT_MAX_HEADER_LEN: usize = 20;

/// The byte that ends a length header.
///
/// Must be printable ASCII and not a decimal digit, otherwise the end of the
/// header could not be told apart from the length itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Delimiter(u8);

impl Delimiter {
    /// Validate and wrap a delimiter byte.
    pub fn new(byte: u8) -> Result<Self> {
        if !byte.is_ascii_graphic() || byte.is_ascii_digit() {
            return Err(FrameError::InvalidDelimiter(byte));
        }
        Ok(Self(byte))
    }

    /// The raw delimiter byte.
    pub fn as_byte(self) -> u8 {
        self.0
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Self(DEFAULT_DELIMITER)
    }
}

impl TryFrom<char> for Delimiter {
    type Error = FrameError;

    fn try_from(c: char) -> Result<Self> {
        let byte = u8::try_from(u32::from(c)).map_err(|_| FrameError::InvalidDelimiter(0xff))?;
        Self::new(byte)
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Byte terminating the length header. Default: `#`.
    pub delimiter: Delimiter,
    /// Maximum declared payload length the decoder accepts. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Maximum header length in bytes. Default: 20.
    pub max_header_len: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::default(),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            max_header_len: DEFAULT_MAX_HEADER_LEN,
        }
    }
}

impl FrameConfig {
    /// Same configuration with a different delimiter.
    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }
}

/// Serializes values into self-delimiting frames.
///
/// Wire format:
/// ```text
/// ┌──────────────────┬───────────┬───────────────────────────┐
/// │ Length           │ Delimiter │ Payload                   │
/// │ (ASCII decimal)  │ (1 byte)  │ (Length bytes, UTF-8 JSON)│
/// └──────────────────┴───────────┴───────────────────────────┘
/// ```
///
/// `Length` counts encoded bytes, not characters, so multi-byte text is
/// framed correctly. For example `"é"` is framed as `4#"é"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameEncoder {
    delimiter: Delimiter,
}

impl FrameEncoder {
    /// Create an encoder using `delimiter` after the length.
    pub fn new(delimiter: Delimiter) -> Self {
        Self { delimiter }
    }

    /// Create an encoder matching a frame configuration.
    pub fn from_config(config: &FrameConfig) -> Self {
        Self::new(config.delimiter)
    }

    /// Encode one value into a standalone frame.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        self.encode_into(value, &mut dst)?;
        Ok(dst.freeze())
    }

    /// Encode one value, appending the frame to `dst`.
    pub fn encode_into<T: Serialize + ?Sized>(&self, value: &T, dst: &mut BytesMut) -> Result<()> {
        let payload = serde_json::to_vec(value).map_err(FrameError::Serialize)?;
        self.encode_payload(&payload, dst);
        Ok(())
    }

    /// Frame an already serialized JSON payload.
    pub fn encode_payload(&self, payload: &[u8], dst: &mut BytesMut) {
        let header = payload.len().to_string();
        dst.reserve(header.len() + 1 + payload.len());
        dst.put_slice(header.as_bytes());
        dst.put_u8(self.delimiter.as_byte());
        dst.put_slice(payload);
    }
}

/// One frame's outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A complete, well-formed message.
    Message(Value),
    /// A complete frame whose payload is not valid JSON. Decoding continues
    /// with the next frame.
    InvalidPayload { payload: Bytes, message: String },
}

impl Decoded {
    /// Convert into a `Result`, mapping bad payloads to [`FrameError::InvalidPayload`].
    pub fn into_result(self) -> Result<Value> {
        match self {
            Decoded::Message(value) => Ok(value),
            Decoded::InvalidPayload { payload, message } => {
                Err(FrameError::InvalidPayload { payload, message })
            }
        }
    }
}

/// Incrementally reconstructs messages from arbitrarily chunked bytes.
///
/// The decoder is either awaiting a header (`awaited == None`) or awaiting
/// `n` payload bytes. Payload bytes are only interpreted once all `n` have
/// arrived, so a multi-byte character split across reads is never decoded
/// from a partial sequence. Bytes beyond the current frame stay in the buffer
/// and are consumed by the next loop iteration.
///
/// Header errors are fatal: the decoder drops its buffer and halts, and every
/// later call yields nothing.
#[derive(Debug)]
pub struct FrameDecoder {
    config: FrameConfig,
    awaited: Option<usize>,
    halted: bool,
    pending: BytesMut,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(FrameConfig::default())
    }
}

impl FrameDecoder {
    /// Create a decoder with explicit configuration.
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            awaited: None,
            halted: false,
            pending: BytesMut::new(),
        }
    }

    /// Push a chunk of bytes and collect every frame it completes, in order.
    ///
    /// A fatal error is returned at most once, as the last element; after it
    /// the decoder is halted.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<Value>> {
        let mut out = Vec::new();
        if self.halted {
            return out;
        }

        let mut pending = std::mem::take(&mut self.pending);
        pending.extend_from_slice(chunk);

        loop {
            match self.decode(&mut pending) {
                Ok(Some(decoded)) => out.push(decoded.into_result()),
                Ok(None) => break,
                Err(err) => {
                    out.push(Err(err));
                    break;
                }
            }
        }

        if !self.halted {
            self.pending = pending;
        }
        out
    }

    /// Decode the next frame from `src`, consuming its bytes.
    ///
    /// Returns `Ok(None)` if `src` doesn't contain a complete frame yet.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Decoded>> {
        if self.halted {
            src.clear();
            return Ok(None);
        }

        let len = match self.awaited {
            Some(len) => len,
            None => match self.parse_header(src) {
                Ok(Some(len)) => {
                    self.awaited = Some(len);
                    len
                }
                Ok(None) => return Ok(None),
                Err(err) => {
                    self.halt(src);
                    return Err(err);
                }
            },
        };

        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        self.awaited = None;
        let payload = src.split_to(len).freeze();
        trace!(len, "frame complete");
        Ok(Some(parse_payload(payload)))
    }

    /// Decode at end of stream, reporting a frame cut short by the close.
    pub fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Decoded>> {
        if let Some(decoded) = self.decode(src)? {
            return Ok(Some(decoded));
        }
        if self.halted || (src.is_empty() && self.awaited.is_none()) {
            return Ok(None);
        }
        let buffered = src.len();
        self.awaited = None;
        *src = BytesMut::new();
        Err(FrameError::IncompleteFrame { buffered })
    }

    /// Whether a fatal error has stopped this decoder.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Payload length currently being accumulated, if a header was parsed.
    pub fn awaited_len(&self) -> Option<usize> {
        self.awaited
    }

    /// Bytes held by [`feed`](Self::feed) that do not yet form a frame.
    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }

    /// Current decoder configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn parse_header(&self, src: &mut BytesMut) -> Result<Option<usize>> {
        let max_header_len = self.config.max_header_len;
        let window = &src[..src.len().min(max_header_len + 1)];
        let delimiter = self.config.delimiter.as_byte();
        let end = window.iter().position(|&b| b == delimiter);
        let token = &window[..end.unwrap_or(window.len())];

        if !token.iter().all(u8::is_ascii_digit) {
            return Err(FrameError::InvalidHeader {
                header: String::from_utf8_lossy(token).into_owned(),
            });
        }

        let Some(end) = end else {
            if window.len() > max_header_len {
                return Err(FrameError::HeaderTooLong {
                    len: window.len(),
                    max: max_header_len,
                });
            }
            return Ok(None);
        };

        if token.is_empty() {
            return Err(FrameError::InvalidHeader {
                header: String::new(),
            });
        }

        // All digits, so the only possible failure is overflow.
        let len = std::str::from_utf8(token)
            .ok()
            .and_then(|digits| digits.parse::<usize>().ok())
            .ok_or_else(|| FrameError::PayloadTooLarge {
                size: usize::MAX,
                max: self.config.max_payload_size,
            })?;

        if len > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: self.config.max_payload_size,
            });
        }

        src.advance(end + 1);
        Ok(Some(len))
    }

    fn halt(&mut self, src: &mut BytesMut) {
        self.halted = true;
        self.awaited = None;
        *src = BytesMut::new();
        self.pending = BytesMut::new();
    }
}

fn parse_payload(payload: Bytes) -> Decoded {
    match serde_json::from_slice::<Value>(&payload) {
        Ok(value) => Decoded::Message(value),
        Err(err) => Decoded::InvalidPayload {
            message: err.to_string(),
            payload,
        },
    }
}

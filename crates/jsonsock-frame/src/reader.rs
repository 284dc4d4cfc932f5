use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::codec::{FrameConfig, FrameDecoder};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete messages from any blocking `Read` stream.
///
/// Partial reads are handled internally, so callers always get complete
/// messages. A payload that is not valid JSON is returned as
/// [`FrameError::InvalidPayload`] and the next call continues with the
/// following frame. Header errors are fatal and every later call fails with
/// [`FrameError::ConnectionClosed`].
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    decoder: FrameDecoder,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            decoder: FrameDecoder::new(config),
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` at a clean EOF and
    /// `Err(FrameError::IncompleteFrame)` when EOF cuts a frame short.
    pub fn read_message(&mut self) -> Result<Value> {
        if self.decoder.is_halted() {
            return Err(FrameError::ConnectionClosed);
        }

        loop {
            if let Some(decoded) = self.decoder.decode(&mut self.buf)? {
                return decoded.into_result();
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return match self.decoder.decode_eof(&mut self.buf)? {
                    Some(decoded) => decoded.into_result(),
                    None => Err(FrameError::ConnectionClosed),
                };
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Read the next message and deserialize it into `M`.
    pub fn read_as<M: DeserializeOwned>(&mut self) -> Result<M> {
        let value = self.read_message()?;
        M::deserialize(&value).map_err(|err| FrameError::InvalidPayload {
            payload: serde_json::to_vec(&value).unwrap_or_default().into(),
            message: err.to_string(),
        })
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current decoder configuration.
    pub fn config(&self) -> &FrameConfig {
        self.decoder.config()
    }
}

impl<T: Read> Iterator for FrameReader<T> {
    type Item = Result<Value>;

    /// Yields messages until the stream closes. A fatal error, including a
    /// frame cut short by EOF, is yielded once before the iteration ends.
    fn next(&mut self) -> Option<Result<Value>> {
        match self.read_message() {
            Err(FrameError::ConnectionClosed) => None,
            other => Some(other),
        }
    }
}

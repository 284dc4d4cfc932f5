use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use serde::Serialize;

use crate::codec::{FrameConfig, FrameEncoder};
use crate::error::{FrameError, Result};
use crate::scheduler::{WriteMode, WriteScheduler};

/// Writes messages to any blocking `Write` stream.
///
/// In [`WriteMode::Immediate`] every message is written and flushed on its
/// own. In [`WriteMode::Batched`] messages are coalesced by a
/// [`WriteScheduler`] and leave on overflow or an explicit
/// [`flush`](Self::flush). There is no idle timer in the blocking writer.
pub struct FrameWriter<T: Write> {
    inner: T,
    encoder: FrameEncoder,
    scheduler: WriteScheduler,
    scratch: BytesMut,
}

impl<T: Write> FrameWriter<T> {
    /// Create an immediate-mode writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, &FrameConfig::default(), WriteMode::Immediate)
    }

    /// Create a writer with explicit configuration.
    pub fn with_config(inner: T, config: &FrameConfig, mode: WriteMode) -> Self {
        Self {
            inner,
            encoder: FrameEncoder::from_config(config),
            scheduler: WriteScheduler::new(mode),
            scratch: BytesMut::new(),
        }
    }

    /// Encode and send one message.
    ///
    /// In batched mode this may only buffer the frame.
    pub fn send<M: Serialize + ?Sized>(&mut self, message: &M) -> Result<()> {
        self.encoder.encode_into(message, &mut self.scratch)?;
        let frame = self.scratch.split().freeze();

        if let Some(chunk) = self.scheduler.enqueue(frame)? {
            self.write_chunk(&chunk)?;
            if self.scheduler.mode() == WriteMode::Immediate {
                self.flush_inner()?;
            }
        }
        Ok(())
    }

    /// Write everything buffered and flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(chunk) = self.scheduler.flush() {
            self.write_chunk(&chunk)?;
        }
        self.flush_inner()
    }

    /// Bytes buffered but not yet written.
    pub fn buffered(&self) -> usize {
        self.scheduler.buffered()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Flush buffered messages and return the inner stream.
    pub fn into_inner(mut self) -> Result<T> {
        self.flush()?;
        Ok(self.inner)
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < chunk.len() {
            match self.inner.write(&chunk[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(())
    }

    fn flush_inner(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}

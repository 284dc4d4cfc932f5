//! Outbound batching policy.
//!
//! [`WriteScheduler`] decides *when* encoded frames reach the transport; it
//! never performs I/O itself. Drivers (the blocking [`FrameWriter`] and the
//! socket's async writer task) hand it frames and write whatever chunk it
//! returns, in the order returned.
//!
//! [`FrameWriter`]: crate::writer::FrameWriter

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::error::{FrameError, Result};

/// Default outbound buffer capacity in batched mode: 64 KiB.
pub const DEFAULT_BATCH_CAPACITY: usize = 64 * 1024;

/// Default interval between idle checks in batched mode.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(10);

/// How frames are handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// One underlying write per frame.
    #[default]
    Immediate,
    /// Frames accumulate in a fixed-capacity buffer.
    ///
    /// The buffer is written when the next frame would overflow it, on an
    /// explicit flush, or when an idle check finds its occupancy unchanged
    /// since the previous check. The idle flush bounds latency on a best-effort
    /// basis only; call flush when delivery matters.
    Batched {
        capacity: usize,
        idle_interval: Duration,
    },
}

impl WriteMode {
    /// Batched mode with default capacity and idle interval.
    pub fn batched() -> Self {
        WriteMode::Batched {
            capacity: DEFAULT_BATCH_CAPACITY,
            idle_interval: DEFAULT_IDLE_INTERVAL,
        }
    }

    /// Buffer capacity, if batching.
    pub fn capacity(&self) -> Option<usize> {
        match self {
            WriteMode::Immediate => None,
            WriteMode::Batched { capacity, .. } => Some(*capacity),
        }
    }

    /// Idle check interval, if batching.
    pub fn idle_interval(&self) -> Option<Duration> {
        match self {
            WriteMode::Immediate => None,
            WriteMode::Batched { idle_interval, .. } => Some(*idle_interval),
        }
    }

    /// Reject a frame that can never fit the outbound buffer.
    pub fn check_frame(&self, size: usize) -> Result<()> {
        match self.capacity() {
            Some(capacity) if size > capacity => Err(FrameError::OversizeFrame { size, capacity }),
            _ => Ok(()),
        }
    }
}

/// Batches encoded frames into a bounded buffer.
///
/// Invariant: `buffered() <= capacity` in batched mode. Chunks returned by
/// [`enqueue`](Self::enqueue), [`flush`](Self::flush) and
/// [`on_idle_tick`](Self::on_idle_tick) must be written in the order they are
/// returned; together they reproduce the enqueued frames byte for byte.
#[derive(Debug)]
pub struct WriteScheduler {
    mode: WriteMode,
    buf: BytesMut,
    last_observed: usize,
    flushes: u64,
}

impl WriteScheduler {
    /// Create a scheduler for `mode`.
    pub fn new(mode: WriteMode) -> Self {
        let buf = match mode {
            WriteMode::Immediate => BytesMut::new(),
            WriteMode::Batched { capacity, .. } => BytesMut::with_capacity(capacity),
        };
        Self {
            mode,
            buf,
            last_observed: 0,
            flushes: 0,
        }
    }

    /// Add a frame. Returns a chunk that must be written now, if any.
    ///
    /// In immediate mode that chunk is the frame itself. In batched mode it is
    /// the previous buffer contents when `frame` would overflow them; `frame`
    /// then starts the new buffer. A frame larger than the capacity is
    /// rejected and the buffer is left untouched.
    pub fn enqueue(&mut self, frame: Bytes) -> Result<Option<Bytes>> {
        let capacity = match self.mode {
            WriteMode::Immediate => return Ok(Some(frame)),
            WriteMode::Batched { capacity, .. } => capacity,
        };
        self.mode.check_frame(frame.len())?;

        let overflow = if self.buf.len() + frame.len() > capacity {
            trace!(
                buffered = self.buf.len(),
                incoming = frame.len(),
                "buffer full, flushing before enqueue"
            );
            self.flush()
        } else {
            None
        };

        self.buf.extend_from_slice(&frame);
        Ok(overflow)
    }

    /// Take everything buffered.
    pub fn flush(&mut self) -> Option<Bytes> {
        self.last_observed = 0;
        if self.buf.is_empty() {
            return None;
        }
        self.flushes += 1;
        Some(self.buf.split().freeze())
    }

    /// Periodic idle check: flush when occupancy is nonzero and unchanged
    /// since the previous check.
    pub fn on_idle_tick(&mut self) -> Option<Bytes> {
        let occupancy = self.buf.len();
        if occupancy != 0 && occupancy == self.last_observed {
            trace!(occupancy, "stalled buffer, forcing flush");
            return self.flush();
        }
        self.last_observed = occupancy;
        None
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Number of non-empty flushes performed so far.
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    /// The scheduling mode.
    pub fn mode(&self) -> WriteMode {
        self.mode
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Point-in-time copy of a socket's counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Stats {
    pub bytes_received: u64,
    pub messages_received: u64,
    pub decode_errors: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    /// Underlying writes issued by the outbound path.
    pub writes: u64,
    /// Time since the probe started.
    pub elapsed: Duration,
}

impl Stats {
    /// Received bytes per second over [`elapsed`](Self::elapsed).
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.bytes_received as f64 / secs
    }
}

/// Lock-free counters updated by a socket's reader and writer tasks.
///
/// Counters accumulate across reconnects.
#[derive(Debug)]
pub struct StatisticsProbe {
    started: Instant,
    bytes_received: AtomicU64,
    messages_received: AtomicU64,
    decode_errors: AtomicU64,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    writes: AtomicU64,
}

impl Default for StatisticsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsProbe {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            bytes_received: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_read(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, bytes: usize) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Received bytes per second since the probe started.
    pub fn throughput(&self) -> f64 {
        self.snapshot().throughput()
    }

    pub fn snapshot(&self) -> Stats {
        Stats {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }
}

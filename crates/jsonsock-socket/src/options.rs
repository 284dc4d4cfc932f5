use std::time::Duration;

use jsonsock_frame::{Delimiter, FrameConfig, WriteMode};

/// Default number of queued send commands before `send` waits.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default upper bound for a graceful close.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbound path configuration.
#[derive(Debug, Clone)]
pub struct WriteConfig {
    /// Immediate or batched writes. Default: immediate.
    pub mode: WriteMode,
    /// Capacity of the command queue feeding the writer task. When it is
    /// full, [`send`](crate::MessageSocket::send) waits and
    /// [`try_send`](crate::MessageSocket::try_send) fails with
    /// [`SocketError::Full`](crate::SocketError::Full). Default: 1024.
    pub queue_capacity: usize,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            mode: WriteMode::Immediate,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Socket configuration.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Frame codec settings shared by both directions.
    pub frame: FrameConfig,
    /// Outbound path settings.
    pub write: WriteConfig,
    /// How long [`close`](crate::MessageSocket::close) waits for the peer
    /// before aborting the connection. Default: 5 seconds.
    pub close_timeout: Duration,
    /// Reply deadline for [`send_once_and_receive`](crate::send_once_and_receive).
    /// Default: none.
    pub reply_timeout: Option<Duration>,
    /// Answer every decode error with an error reply to the peer, in
    /// addition to reporting it locally. Default: off.
    pub reply_to_decode_errors: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            write: WriteConfig::default(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            reply_timeout: None,
            reply_to_decode_errors: false,
        }
    }
}

impl SocketOptions {
    /// Override the header delimiter.
    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.frame.delimiter = delimiter;
        self
    }

    /// Override frame codec settings.
    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    /// Override the write mode.
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write.mode = mode;
        self
    }

    /// Override the send queue capacity (clamped to at least 1).
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.write.queue_capacity = capacity.max(1);
        self
    }

    /// Override the graceful close bound.
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Set a reply deadline for one-shot requests.
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = Some(timeout);
        self
    }

    /// Reply to the peer when its frames fail to decode.
    pub fn with_decode_error_replies(mut self, enabled: bool) -> Self {
        self.reply_to_decode_errors = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = SocketOptions::default();
        assert_eq!(options.frame.delimiter.as_byte(), b'#');
        assert_eq!(options.write.mode, WriteMode::Immediate);
        assert_eq!(options.write.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(options.close_timeout, DEFAULT_CLOSE_TIMEOUT);
        assert!(options.reply_timeout.is_none());
        assert!(!options.reply_to_decode_errors);
    }

    #[test]
    fn builders_override_fields() {
        let options = SocketOptions::default()
            .with_delimiter(Delimiter::new(b'|').unwrap())
            .with_write_mode(WriteMode::batched())
            .with_queue_capacity(0)
            .with_close_timeout(Duration::from_millis(250))
            .with_reply_timeout(Duration::from_secs(1))
            .with_decode_error_replies(true);

        assert_eq!(options.frame.delimiter.as_byte(), b'|');
        assert!(matches!(options.write.mode, WriteMode::Batched { .. }));
        assert_eq!(options.write.queue_capacity, 1);
        assert_eq!(options.close_timeout, Duration::from_millis(250));
        assert_eq!(options.reply_timeout, Some(Duration::from_secs(1)));
        assert!(options.reply_to_decode_errors);
    }
}

use std::sync::Arc;

use bytes::BytesMut;
use jsonsock_frame::{Decoded, FrameDecoder, FrameError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::error::SocketError;
use crate::socket::Link;
use crate::stats::StatisticsProbe;

const READ_BUFFER_CAPACITY: usize = 8 * 1024;

/// Reads the inbound half, decodes frames and dispatches them in arrival
/// order. After a fatal decode error the decoder discards input, but the
/// task keeps reading so the peer's close is still observed.
pub(crate) struct ReaderTask<R> {
    io: R,
    decoder: FrameDecoder,
    stats: Arc<StatisticsProbe>,
    link: Link,
}

impl<R: AsyncRead + Unpin> ReaderTask<R> {
    pub(crate) fn new(
        io: R,
        decoder: FrameDecoder,
        stats: Arc<StatisticsProbe>,
        link: Link,
    ) -> Self {
        Self {
            io,
            decoder,
            stats,
            link,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut buf = BytesMut::with_capacity(READ_BUFFER_CAPACITY);
        let mut had_error = false;

        loop {
            let read = tokio::select! {
                biased;
                _ = self.link.cancelled() => {
                    trace!("reader cancelled");
                    return;
                }
                read = self.io.read_buf(&mut buf) => read,
            };

            match read {
                Ok(0) => {
                    debug!(buffered = buf.len(), "peer closed its write side");
                    had_error |= self.drain_eof(&mut buf);
                    self.link.finish(had_error).await;
                    return;
                }
                Ok(n) => {
                    self.stats.record_read(n);
                    had_error |= self.drain(&mut buf);
                }
                Err(err) => {
                    debug!(error = %err, "read failed");
                    self.link.fail(SocketError::Io(err));
                    return;
                }
            }
        }
    }

    /// Dispatch every complete frame in `buf` until a handler ends the
    /// connection. Returns `true` on a fatal decode error.
    fn drain(&mut self, buf: &mut BytesMut) -> bool {
        while !self.link.is_cancelled() {
            match self.decoder.decode(buf) {
                Ok(Some(decoded)) => self.dispatch(decoded),
                Ok(None) => return false,
                Err(err) => return self.decode_failed(err),
            }
        }
        false
    }

    fn drain_eof(&mut self, buf: &mut BytesMut) -> bool {
        while !self.link.is_cancelled() {
            match self.decoder.decode_eof(buf) {
                Ok(Some(decoded)) => self.dispatch(decoded),
                Ok(None) => return false,
                Err(err) => return self.decode_failed(err),
            }
        }
        false
    }

    fn dispatch(&self, decoded: Decoded) {
        match decoded {
            Decoded::Message(message) => {
                self.stats.record_message();
                self.link.dispatch(&message);
            }
            Decoded::InvalidPayload { payload, message } => {
                self.stats.record_decode_error();
                debug!(len = payload.len(), %message, "dropping unparseable payload");
                self.link
                    .decode_error(FrameError::InvalidPayload { payload, message });
            }
        }
    }

    fn decode_failed(&self, err: FrameError) -> bool {
        self.stats.record_decode_error();
        debug!(error = %err, "inbound stream is no longer decodable");
        self.link.decode_error(err);
        true
    }
}

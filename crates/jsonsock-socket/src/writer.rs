//! Dedicated writer task.
//!
//! ```text
//! send / try_send ─┐
//! flush ───────────┼─► mpsc::Sender<Command> ─► writer task ─► WriteScheduler ─► transport
//! close ───────────┘                              ▲
//!                                   idle ticker ──┘ (batched mode only)
//! ```
//!
//! The bounded command queue is the backpressure point. The task owns the
//! write half and the scheduler, so no lock guards the outbound buffer and
//! chunks reach the transport in enqueue order.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use jsonsock_frame::{WriteMode, WriteScheduler};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, trace};

use crate::error::{Result, SocketError};
use crate::socket::Link;
use crate::stats::StatisticsProbe;

pub(crate) type Ack = oneshot::Sender<Result<()>>;

#[derive(Debug)]
pub(crate) enum Command {
    /// An encoded frame. Acked once it is buffered or written.
    Frame { bytes: Bytes, ack: Option<Ack> },
    /// Write everything buffered.
    Flush { ack: Ack },
    /// Drain, half-close the write side and stop.
    Close { ack: Option<Ack> },
}

pub(crate) struct WriterTask<W> {
    io: W,
    scheduler: WriteScheduler,
    commands: mpsc::Receiver<Command>,
    stats: Arc<StatisticsProbe>,
    link: Link,
}

impl<W: AsyncWrite + Unpin> WriterTask<W> {
    pub(crate) fn new(
        io: W,
        mode: WriteMode,
        commands: mpsc::Receiver<Command>,
        stats: Arc<StatisticsProbe>,
        link: Link,
    ) -> Self {
        Self {
            io,
            scheduler: WriteScheduler::new(mode),
            commands,
            stats,
            link,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut ticker = idle_ticker(self.scheduler.mode());

        loop {
            let command = tokio::select! {
                _ = self.link.cancelled() => {
                    trace!("writer cancelled");
                    return;
                }
                command = self.commands.recv() => command,
                _ = next_tick(&mut ticker) => {
                    if let Some(chunk) = self.scheduler.on_idle_tick() {
                        let written = self.write(&chunk).await;
                        if !self.settle(None, written) {
                            return;
                        }
                    }
                    continue;
                }
            };

            let Some(command) = command else {
                // Every socket handle is gone.
                debug!("socket dropped, closing write side");
                let closed = self.shutdown().await;
                self.settle(None, closed);
                return;
            };

            match command {
                Command::Frame { bytes, ack } => {
                    let chunk = match self.scheduler.enqueue(bytes) {
                        Ok(chunk) => chunk,
                        Err(err) => {
                            reply(ack, Err(err.into()));
                            continue;
                        }
                    };
                    self.stats.record_frame_sent();
                    let written = match chunk {
                        Some(chunk) => self.write(&chunk).await,
                        None => Ok(()),
                    };
                    if !self.settle(ack, written) {
                        return;
                    }
                }
                Command::Flush { ack } => {
                    let flushed = self.flush().await;
                    if !self.settle(Some(ack), flushed) {
                        return;
                    }
                }
                Command::Close { ack } => {
                    let closed = self.shutdown().await;
                    debug!(flushes = self.scheduler.flush_count(), "write side closed");
                    self.settle(ack, closed);
                    return;
                }
            }
        }
    }

    async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.io.write_all(chunk).await?;
        self.io.flush().await?;
        self.stats.record_write(chunk.len());
        trace!(len = chunk.len(), "chunk written");
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        match self.scheduler.flush() {
            Some(chunk) => self.write(&chunk).await,
            None => self.io.flush().await,
        }
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.flush().await?;
        self.io.shutdown().await
    }

    /// Ack a command and report a write failure. Returns `false` once the
    /// connection is unusable.
    fn settle(&self, ack: Option<Ack>, result: io::Result<()>) -> bool {
        match result {
            Ok(()) => {
                reply(ack, Ok(()));
                true
            }
            Err(err) => {
                debug!(error = %err, "write failed");
                reply(
                    ack,
                    Err(SocketError::Io(io::Error::new(err.kind(), err.to_string()))),
                );
                self.link.fail(SocketError::Io(err));
                false
            }
        }
    }
}

fn reply(ack: Option<Ack>, result: Result<()>) {
    if let Some(ack) = ack {
        // The sender may have stopped waiting.
        let _ = ack.send(result);
    }
}

fn idle_ticker(mode: WriteMode) -> Option<Interval> {
    let period = mode.idle_interval().filter(|period| !period.is_zero())?;
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bytes::Bytes;
use jsonsock_frame::{FrameDecoder, FrameEncoder, FrameError};
use jsonsock_transport::{Address, Transport};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Result, SocketError};
use crate::listeners::{ListenerId, Listeners};
use crate::options::SocketOptions;
use crate::reader::ReaderTask;
use crate::state::SocketState;
use crate::stats::{StatisticsProbe, Stats};
use crate::writer::{Command, WriterTask};

/// An event-driven JSON message socket.
///
/// Each message travels as one length-prefixed frame. A socket is a cheap
/// `Clone` handle; every clone drives the same connection.
///
/// Register listeners before [`connect`](Self::connect) or
/// [`attach`](Self::attach): messages are dispatched from the moment the
/// connection opens. Handlers run on the connection's reader task, one at a
/// time and in arrival order, so they must not block. A message handler gets
/// the socket back and can answer with [`try_send`](Self::try_send).
///
/// Errors on the connection (decode failures, transport failures) go to the
/// error listeners; with none registered they are logged at `warn` and
/// dropped. Nothing here terminates the process.
#[derive(Clone)]
pub struct MessageSocket {
    shared: Arc<Shared>,
}

struct Shared {
    options: SocketOptions,
    encoder: FrameEncoder,
    state: watch::Sender<SocketState>,
    listeners: Listeners,
    stats: Arc<StatisticsProbe>,
    connection: Mutex<Option<Connection>>,
    address: Mutex<Option<Address>>,
    generation: AtomicU64,
}

impl Shared {
    /// Latch `Closed`. Returns `true` if the state changed.
    fn set_closed(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_closed() {
                return false;
            }
            *state = SocketState::Closed;
            true
        })
    }
}

/// Tasks and queue of one transport connection.
struct Connection {
    generation: u64,
    commands: mpsc::Sender<Command>,
    token: CancellationToken,
    writer: JoinHandle<()>,
    reader: Option<JoinHandle<()>>,
}

impl Connection {
    fn abort(&self) {
        self.token.cancel();
        self.writer.abort();
        if let Some(reader) = &self.reader {
            reader.abort();
        }
    }
}

impl Default for MessageSocket {
    fn default() -> Self {
        Self::new(SocketOptions::default())
    }
}

impl MessageSocket {
    /// Create an unconnected socket.
    pub fn new(options: SocketOptions) -> Self {
        let (state, _) = watch::channel(SocketState::Idle);
        Self {
            shared: Arc::new(Shared {
                encoder: FrameEncoder::from_config(&options.frame),
                options,
                state,
                listeners: Listeners::default(),
                stats: Arc::new(StatisticsProbe::new()),
                connection: Mutex::new(None),
                address: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Connect to `address` and start exchanging messages.
    ///
    /// A connect failure is reported to the error listeners, latches the
    /// socket closed and is returned. An existing connection is dropped
    /// abruptly first.
    pub async fn connect(&self, address: &Address) -> Result<()> {
        *lock(&self.shared.address) = Some(address.clone());
        self.dial(address).await
    }

    /// Re-dial the address of the last [`connect`](Self::connect) with a
    /// fresh decoder and outbound buffer.
    pub async fn reconnect(&self) -> Result<()> {
        let address = lock(&self.shared.address)
            .clone()
            .ok_or(SocketError::NotConnected)?;
        info!(%address, "reconnecting");
        self.dial(&address).await
    }

    async fn dial(&self, address: &Address) -> Result<()> {
        let generation = self.begin_connecting();
        debug!(%address, generation, "connecting");

        match jsonsock_transport::connect(address).await {
            Ok(stream) => {
                if !self.still_connecting(generation) {
                    debug!(%address, "connect superseded");
                    return Err(SocketError::Closed);
                }
                self.attach(stream);
                Ok(())
            }
            Err(err) => {
                let err = SocketError::Transport(err);
                self.shared.listeners.emit_error(&err);
                if self.still_connecting(generation) && self.shared.set_closed() {
                    self.shared.listeners.emit_close(true);
                }
                Err(err)
            }
        }
    }

    fn begin_connecting(&self) -> u64 {
        let mut connection = lock(&self.shared.connection);
        if let Some(previous) = connection.take() {
            previous.abort();
        }
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.state.send_replace(SocketState::Connecting);
        generation
    }

    fn still_connecting(&self, generation: u64) -> bool {
        self.shared.generation.load(Ordering::SeqCst) == generation
            && self.state() == SocketState::Connecting
    }

    /// Run the socket over an already connected transport, such as a stream
    /// accepted by a [`MessageListener`](crate::MessageListener).
    ///
    /// Must be called within a tokio runtime. An existing connection is
    /// dropped abruptly first.
    pub fn attach<S: Transport>(&self, stream: S) {
        let (read_half, write_half) = tokio::io::split(stream);
        let (commands, receiver) = mpsc::channel(self.shared.options.write.queue_capacity.max(1));
        let token = CancellationToken::new();

        let generation = {
            let mut connection = lock(&self.shared.connection);
            if let Some(previous) = connection.take() {
                previous.abort();
            }
            let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let writer = tokio::spawn(
                WriterTask::new(
                    write_half,
                    self.shared.options.write.mode,
                    receiver,
                    Arc::clone(&self.shared.stats),
                    self.link(generation, &token),
                )
                .run(),
            );
            *connection = Some(Connection {
                generation,
                commands,
                token: token.clone(),
                writer,
                reader: None,
            });
            self.shared.state.send_replace(SocketState::Open);
            generation
        };

        info!(generation, "socket open");
        self.shared.listeners.emit_connect(self);

        let reader = tokio::spawn(
            ReaderTask::new(
                read_half,
                FrameDecoder::new(self.shared.options.frame.clone()),
                Arc::clone(&self.shared.stats),
                self.link(generation, &token),
            )
            .run(),
        );
        match lock(&self.shared.connection).as_mut() {
            Some(connection) if connection.generation == generation => {
                connection.reader = Some(reader);
            }
            _ => reader.abort(),
        }
    }

    fn link(&self, generation: u64, token: &CancellationToken) -> Link {
        Link {
            shared: Arc::downgrade(&self.shared),
            generation,
            token: token.clone(),
        }
    }

    /// Send one message.
    ///
    /// Resolves once the writer has taken the frame: after the write in
    /// immediate mode, after buffering in batched mode. Waits while the send
    /// queue is full.
    ///
    /// Fails without writing anything if the socket is not open
    /// ([`SocketError::Closed`] / [`SocketError::NotConnected`]), the value
    /// cannot be serialized, or its frame exceeds the batch capacity.
    pub async fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        let (commands, bytes) = self.prepare(message)?;
        let (ack, done) = oneshot::channel();
        commands
            .send(Command::Frame {
                bytes,
                ack: Some(ack),
            })
            .await
            .map_err(|_| SocketError::Closed)?;
        done.await.map_err(|_| SocketError::Closed)?
    }

    /// Queue one message without waiting.
    ///
    /// Returns [`SocketError::Full`] when the send queue is at capacity. Write
    /// failures are reported to the error listeners.
    pub fn try_send<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        let (commands, bytes) = self.prepare(message)?;
        commands
            .try_send(Command::Frame { bytes, ack: None })
            .map_err(|err| match err {
                TrySendError::Full(_) => SocketError::Full,
                TrySendError::Closed(_) => SocketError::Closed,
            })
    }

    /// Write everything buffered in batched mode.
    pub async fn flush(&self) -> Result<()> {
        let commands = self.commands()?;
        let (ack, done) = oneshot::channel();
        commands
            .send(Command::Flush { ack })
            .await
            .map_err(|_| SocketError::Closed)?;
        done.await.map_err(|_| SocketError::Closed)?
    }

    /// Send one message, then [`close`](Self::close).
    pub async fn send_and_close<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        self.send(message).await?;
        self.close().await
    }

    /// Send `{"success": false, "error": "<error>"}`.
    pub async fn send_error(&self, error: impl fmt::Display) -> Result<()> {
        let reply = error_reply(&error);
        self.send(&reply).await
    }

    /// Send an error reply, then [`close`](Self::close).
    pub async fn send_end_error(&self, error: impl fmt::Display) -> Result<()> {
        let reply = error_reply(&error);
        self.send_and_close(&reply).await
    }

    /// Close gracefully.
    ///
    /// Buffered frames are written, the write side is half-closed, and the
    /// socket waits for the peer to close its side, bounded by
    /// [`close_timeout`](SocketOptions::close_timeout); after that the
    /// connection is aborted. Closing a closed socket is a no-op.
    pub async fn close(&self) -> Result<()> {
        let (generation, commands) = {
            let connection = lock(&self.shared.connection);
            let current = connection
                .as_ref()
                .map(|connection| (connection.generation, connection.commands.clone()));
            match (self.state(), current) {
                (SocketState::Closed, _) => return Ok(()),
                (SocketState::Open | SocketState::Closing, Some(current)) => {
                    self.shared.state.send_if_modified(|state| {
                        if *state != SocketState::Open {
                            return false;
                        }
                        *state = SocketState::Closing;
                        true
                    });
                    current
                }
                _ => {
                    // Nothing to drain.
                    if let Some(connection) = connection.as_ref() {
                        connection.abort();
                    }
                    let changed = self.shared.set_closed();
                    drop(connection);
                    if changed {
                        self.shared.listeners.emit_close(false);
                    }
                    return Ok(());
                }
            }
        };
        debug!(generation, "closing");

        let timeout = self.shared.options.close_timeout;
        let mut state = self.shared.state.subscribe();
        let graceful = tokio::time::timeout(timeout, async move {
            let (ack, done) = oneshot::channel();
            let drained = match commands.send(Command::Close { ack: Some(ack) }).await {
                Ok(()) => done.await.unwrap_or(Ok(())),
                // The writer already stopped.
                Err(_) => Ok(()),
            };
            let _ = state.wait_for(|state| state.is_closed()).await;
            drained
        })
        .await;

        match graceful {
            Ok(drained) => drained,
            Err(_) => {
                debug!(?timeout, "peer did not close in time, aborting");
                if self.current_generation() == Some(generation) {
                    self.abort();
                }
                Ok(())
            }
        }
    }

    /// Drop the connection immediately, discarding buffered frames.
    pub fn abort(&self) {
        let changed = {
            let connection = lock(&self.shared.connection);
            if let Some(connection) = connection.as_ref() {
                connection.abort();
            }
            self.shared.set_closed()
        };
        if changed {
            info!("socket aborted");
            self.shared.listeners.emit_close(false);
        }
    }

    /// Whether the socket has latched closed.
    pub fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    pub fn state(&self) -> SocketState {
        *self.shared.state.borrow()
    }

    /// Wait until the socket is closed.
    pub async fn closed(&self) {
        let mut state = self.shared.state.subscribe();
        let _ = state.wait_for(|state| state.is_closed()).await;
    }

    /// Address of the last [`connect`](Self::connect), if any.
    pub fn address(&self) -> Option<Address> {
        lock(&self.shared.address).clone()
    }

    pub fn options(&self) -> &SocketOptions {
        &self.shared.options
    }

    /// Snapshot of the traffic counters.
    pub fn stats(&self) -> Stats {
        self.shared.stats.snapshot()
    }

    /// Called with the socket each time a connection opens.
    pub fn on_connect<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&MessageSocket) + Send + Sync + 'static,
    {
        self.shared.listeners.add_connect(Arc::new(handler))
    }

    /// Called for every decoded message, in arrival order.
    pub fn on_message<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&MessageSocket, &Value) + Send + Sync + 'static,
    {
        self.shared.listeners.add_message(Arc::new(handler))
    }

    /// Called for decode and transport errors.
    pub fn on_error<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&SocketError) + Send + Sync + 'static,
    {
        self.shared.listeners.add_error(Arc::new(handler))
    }

    /// Called once per connection when the socket latches closed, with
    /// whether an error caused or preceded the close.
    pub fn on_close<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.shared.listeners.add_close(Arc::new(handler))
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }

    fn commands(&self) -> Result<mpsc::Sender<Command>> {
        let connection = lock(&self.shared.connection);
        let state = self.state();
        if !state.accepts_sends() {
            return Err(match state {
                SocketState::Idle | SocketState::Connecting => SocketError::NotConnected,
                _ => SocketError::Closed,
            });
        }
        connection
            .as_ref()
            .map(|connection| connection.commands.clone())
            .ok_or(SocketError::NotConnected)
    }

    fn prepare<T: Serialize + ?Sized>(
        &self,
        message: &T,
    ) -> Result<(mpsc::Sender<Command>, Bytes)> {
        let commands = self.commands()?;
        let frame = self.shared.encoder.encode(message)?;
        self.shared.options.write.mode.check_frame(frame.len())?;
        Ok((commands, frame))
    }

    fn current_generation(&self) -> Option<u64> {
        lock(&self.shared.connection)
            .as_ref()
            .map(|connection| connection.generation)
    }

    fn commands_for(&self, generation: u64) -> Option<mpsc::Sender<Command>> {
        lock(&self.shared.connection)
            .as_ref()
            .filter(|connection| connection.generation == generation)
            .map(|connection| connection.commands.clone())
    }

    fn latch_closed(&self, generation: u64, had_error: bool) {
        let changed = {
            let connection = lock(&self.shared.connection);
            match connection.as_ref() {
                Some(connection) if connection.generation == generation => {
                    connection.token.cancel();
                }
                _ => return,
            }
            self.shared.set_closed()
        };
        if changed {
            info!(generation, had_error, "socket closed");
            self.shared.listeners.emit_close(had_error);
        }
    }
}

impl fmt::Debug for MessageSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageSocket")
            .field("state", &self.state())
            .field("address", &self.address())
            .finish()
    }
}

/// A connection task's way back to its socket.
///
/// Holds the socket weakly: once every handle is dropped the writer drains
/// and half-closes, and the reader stops dispatching.
#[derive(Clone)]
pub(crate) struct Link {
    shared: Weak<Shared>,
    generation: u64,
    token: CancellationToken,
}

impl Link {
    pub(crate) async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Whether this connection was aborted, latched closed or replaced.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The socket, while this link's connection is still its current one.
    fn socket(&self) -> Option<MessageSocket> {
        if self.token.is_cancelled() {
            return None;
        }
        let socket = MessageSocket {
            shared: self.shared.upgrade()?,
        };
        (socket.current_generation() == Some(self.generation)).then_some(socket)
    }

    pub(crate) fn dispatch(&self, message: &Value) {
        match self.socket() {
            Some(socket) => socket.shared.listeners.emit_message(&socket, message),
            None => debug!(generation = self.generation, "message after connection ended"),
        }
    }

    pub(crate) fn report(&self, err: SocketError) {
        match self.socket() {
            Some(socket) => socket.shared.listeners.emit_error(&err),
            None => debug!(error = %err, "error after connection ended"),
        }
    }

    pub(crate) fn decode_error(&self, err: FrameError) {
        let Some(socket) = self.socket() else {
            debug!(error = %err, "decode error after connection ended");
            return;
        };
        if socket.shared.options.reply_to_decode_errors {
            if let Err(send_err) = socket.try_send(&error_reply(&err)) {
                debug!(error = %send_err, "could not reply to decode error");
            }
        }
        socket.shared.listeners.emit_error(&SocketError::Frame(err));
    }

    /// Report a transport failure and latch closed.
    pub(crate) fn fail(&self, err: SocketError) {
        self.report(err);
        self.latch_closed(true);
    }

    pub(crate) fn latch_closed(&self, had_error: bool) {
        if let Some(socket) = self.socket() {
            socket.latch_closed(self.generation, had_error);
        }
        self.token.cancel();
    }

    /// The peer closed its write side: drain and half-close ours, then latch
    /// closed.
    pub(crate) async fn finish(&self, had_error: bool) {
        let target = self.socket().and_then(|socket| {
            socket
                .commands_for(self.generation)
                .map(|commands| (commands, socket.shared.options.close_timeout))
        });

        if let Some((commands, timeout)) = target {
            let drain = async {
                let (ack, done) = oneshot::channel();
                if commands.send(Command::Close { ack: Some(ack) }).await.is_ok() {
                    let _ = done.await;
                }
            };
            if tokio::time::timeout(timeout, drain).await.is_err() {
                debug!(?timeout, "write side did not drain in time");
            }
        }
        self.latch_closed(had_error);
    }
}

fn error_reply(error: &dyn fmt::Display) -> Value {
    json!({"success": false, "error": error.to_string()})
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

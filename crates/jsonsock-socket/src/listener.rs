use jsonsock_transport::{Address, Listener, Stream};
use tracing::debug;

use crate::error::Result;
use crate::options::SocketOptions;
use crate::socket::MessageSocket;

/// Accepts connections and hands them out as message sockets.
pub struct MessageListener {
    listener: Listener,
    options: SocketOptions,
}

impl MessageListener {
    /// Bind to a TCP or Unix-domain address.
    pub async fn bind(address: &Address) -> Result<Self> {
        let listener = Listener::bind(address).await?;
        Ok(Self {
            listener,
            options: SocketOptions::default(),
        })
    }

    /// Options for sockets created by [`accept_with`](Self::accept_with).
    pub fn with_options(mut self, options: SocketOptions) -> Self {
        self.options = options;
        self
    }

    /// Accept the next raw transport stream, ready for
    /// [`MessageSocket::attach`].
    pub async fn accept(&self) -> Result<Stream> {
        Ok(self.listener.accept().await?)
    }

    /// Accept the next connection as a socket.
    ///
    /// `setup` runs before the connection starts, so listeners it registers
    /// see every message.
    pub async fn accept_with<F>(&self, setup: F) -> Result<MessageSocket>
    where
        F: FnOnce(&MessageSocket),
    {
        let stream = self.listener.accept().await?;
        debug!(transport = stream.transport_name(), peer = ?stream.peer_addr(), "accepted");
        let socket = MessageSocket::new(self.options.clone());
        setup(&socket);
        socket.attach(stream);
        Ok(socket)
    }

    /// The concrete bound address.
    pub fn local_addr(&self) -> Result<Address> {
        Ok(self.listener.local_addr()?)
    }

    pub fn options(&self) -> &SocketOptions {
        &self.options
    }
}

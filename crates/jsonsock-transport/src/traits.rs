use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::address::Address;
use crate::error::{Result, TransportError};

/// The duplex byte stream a message socket is bound to.
///
/// Reads deliver data (`Ok(0)` is the peer closing), writes hand bytes to the
/// peer, and `shutdown` half-closes the write side. Anything that is
/// `AsyncRead + AsyncWrite + Send + Unpin + 'static` qualifies, including
/// `tokio::io::DuplexStream` for in-memory tests.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// A connected stream, returned by [`connect`] and [`Listener::accept`](crate::Listener::accept).
pub struct Stream {
    inner: StreamInner,
}

enum StreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

impl Stream {
    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: StreamInner::Tcp(stream),
        }
    }

    #[cfg(unix)]
    pub(crate) fn from_unix(stream: tokio::net::UnixStream) -> Self {
        Self {
            inner: StreamInner::Unix(stream),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            StreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            StreamInner::Unix(_) => "unix-domain-socket",
        }
    }

    /// Remote address, when the transport exposes one.
    pub fn peer_addr(&self) -> Option<String> {
        match &self.inner {
            StreamInner::Tcp(stream) => stream.peer_addr().ok().map(|addr| addr.to_string()),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.peer_addr().ok().and_then(|addr| {
                addr.as_pathname()
                    .map(|path| path.display().to_string())
            }),
        }
    }

    /// Get the credentials of the connected peer.
    ///
    /// Returns `(uid, gid, pid)` for Unix domain sockets. `pid` is `None` on
    /// platforms that do not report it; TCP streams always return `None`.
    pub fn peer_credentials(&self) -> Option<(u32, u32, Option<i32>)> {
        match &self.inner {
            StreamInner::Tcp(_) => None,
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream
                .peer_cred()
                .ok()
                .map(|cred| (cred.uid(), cred.gid(), cred.pid())),
        }
    }

    /// Disable Nagle's algorithm on TCP streams. No-op for other transports.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        match &self.inner {
            StreamInner::Tcp(stream) => stream.set_nodelay(nodelay).map_err(Into::into),
            #[cfg(unix)]
            StreamInner::Unix(_) => Ok(()),
        }
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            StreamInner::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            StreamInner::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().inner {
            StreamInner::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            StreamInner::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            StreamInner::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            StreamInner::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            StreamInner::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            StreamInner::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("type", &self.transport_name())
            .finish()
    }
}

/// Connect to a listening peer.
pub async fn connect(address: &Address) -> Result<Stream> {
    match address {
        Address::Tcp(host_port) => {
            let stream =
                TcpStream::connect(host_port.as_str())
                    .await
                    .map_err(|e| TransportError::Connect {
                        address: address.to_string(),
                        source: e,
                    })?;
            debug!(%address, "connected to tcp endpoint");
            Ok(Stream::from_tcp(stream))
        }
        #[cfg(unix)]
        Address::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(path).await.map_err(|e| {
                TransportError::Connect {
                    address: address.to_string(),
                    source: e,
                }
            })?;
            debug!(?path, "connected to unix domain socket");
            Ok(Stream::from_unix(stream))
        }
        #[cfg(not(unix))]
        Address::Unix(_) => Err(TransportError::Unsupported(address.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn connect_refused_reports_address() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect(&Address::Tcp(addr.to_string())).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        assert!(err.to_string().contains(&addr.to_string()));
        assert!(err.io_source().is_some());
    }

    #[tokio::test]
    async fn tcp_stream_reads_and_writes() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let mut stream = connect(&Address::Tcp(addr.to_string())).await.unwrap();
        assert_eq!(stream.transport_name(), "tcp");
        assert!(stream.peer_credentials().is_none());
        stream.set_nodelay(true).unwrap();

        stream.write_all(b"hello").await.unwrap();
        let mut echoed = [0u8; 5];
        stream.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"hello");

        server.await.unwrap();
    }

    #[test]
    fn duplex_is_a_transport() {
        fn assert_transport<T: Transport>() {}
        assert_transport::<tokio::io::DuplexStream>();
        assert_transport::<Stream>();
    }
}

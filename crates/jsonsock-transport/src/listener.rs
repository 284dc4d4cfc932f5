#[cfg(unix)]
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::PathBuf;

use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::address::Address;
use crate::error::{Result, TransportError};
use crate::traits::Stream;

/// Accepts incoming transport connections on an [`Address`].
///
/// For Unix domain sockets the socket file is created at bind time (stale
/// sockets are removed first) and cleaned up via `Drop`.
pub struct Listener {
    inner: ListenerInner,
}

enum ListenerInner {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixSocketFile),
}

#[cfg(unix)]
struct UnixSocketFile {
    listener: tokio::net::UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl Listener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on `address`.
    pub async fn bind(address: &Address) -> Result<Self> {
        match address {
            Address::Tcp(host_port) => {
                let listener = TcpListener::bind(host_port.as_str()).await.map_err(|e| {
                    TransportError::Bind {
                        address: address.to_string(),
                        source: e,
                    }
                })?;
                info!(%address, "listening on tcp endpoint");
                Ok(Self {
                    inner: ListenerInner::Tcp(listener),
                })
            }
            #[cfg(unix)]
            Address::Unix(path) => Self::bind_unix(path.clone(), Self::DEFAULT_SOCKET_MODE),
            #[cfg(not(unix))]
            Address::Unix(_) => Err(TransportError::Unsupported(address.to_string())),
        }
    }

    /// Bind a filesystem-path Unix domain socket with an explicit mode.
    #[cfg(unix)]
    pub fn bind_unix(path: PathBuf, mode: u32) -> Result<Self> {
        let bind_err = |path: &PathBuf, source: std::io::Error| TransportError::Bind {
            address: Address::Unix(path.clone()).to_string(),
            source,
        };

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        // Remove stale socket if it exists, but never remove non-socket files.
        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| bind_err(&path, e))?;
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(|e| bind_err(&path, e))?;
            } else {
                return Err(bind_err(
                    &path,
                    std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                ));
            }
        }

        let listener = tokio::net::UnixListener::bind(&path).map_err(|e| bind_err(&path, e))?;

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| bind_err(&path, e))?;
        let created = std::fs::symlink_metadata(&path).map_err(|e| bind_err(&path, e))?;
        let created_inode = Some((created.dev(), created.ino()));

        info!(?path, "listening on unix domain socket");

        Ok(Self {
            inner: ListenerInner::Unix(UnixSocketFile {
                listener,
                path,
                created_inode,
            }),
        })
    }

    /// Accept the next incoming connection.
    pub async fn accept(&self) -> Result<Stream> {
        match &self.inner {
            ListenerInner::Tcp(listener) => {
                let (stream, peer) = listener.accept().await.map_err(TransportError::Accept)?;
                debug!(%peer, "accepted tcp connection");
                Ok(Stream::from_tcp(stream))
            }
            #[cfg(unix)]
            ListenerInner::Unix(socket) => {
                let (stream, _addr) = socket
                    .listener
                    .accept()
                    .await
                    .map_err(TransportError::Accept)?;
                debug!("accepted unix connection");
                Ok(Stream::from_unix(stream))
            }
        }
    }

    /// The concrete bound address (resolves port `0` to the assigned port).
    pub fn local_addr(&self) -> Result<Address> {
        match &self.inner {
            ListenerInner::Tcp(listener) => Ok(Address::Tcp(listener.local_addr()?.to_string())),
            #[cfg(unix)]
            ListenerInner::Unix(socket) => Ok(Address::Unix(socket.path.clone())),
        }
    }
}

#[cfg(unix)]
impl Drop for UnixSocketFile {
    fn drop(&mut self) {
        if let Some((expected_dev, expected_ino)) = self.created_inode {
            if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
                if metadata.file_type().is_socket()
                    && metadata.dev() == expected_dev
                    && metadata.ino() == expected_ino
                {
                    debug!(path = ?self.path, "cleaning up socket file");
                    let _ = std::fs::remove_file(&self.path);
                } else {
                    debug!(
                        path = ?self.path,
                        "socket path identity changed; skipping cleanup"
                    );
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::traits::connect;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "jsonsock-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn bind_accept_connect_unix() {
        let dir = temp_dir("uds");
        let sock_path = dir.join("test.sock");
        let address = Address::unix(&sock_path);

        let listener = Listener::bind(&address).await.unwrap();
        assert!(sock_path.exists());
        assert_eq!(listener.local_addr().unwrap(), address);

        let client = tokio::spawn(async move {
            let mut client = connect(&address).await.unwrap();
            client.write_all(b"hello").await.unwrap();
        });

        let mut server = listener.accept().await.unwrap();
        assert_eq!(server.transport_name(), "unix-domain-socket");
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
        assert!(server.peer_credentials().is_some());

        client.await.unwrap();

        drop(listener);
        assert!(
            !sock_path.exists(),
            "socket file should be cleaned up on drop"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn bind_tcp_resolves_port_zero() {
        let listener = Listener::bind(&Address::tcp("127.0.0.1", 0)).await.unwrap();
        match listener.local_addr().unwrap() {
            Address::Tcp(host_port) => assert!(!host_port.ends_with(":0")),
            other => panic!("unexpected address {other:?}"),
        }
    }

    #[tokio::test]
    async fn path_too_long() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = Listener::bind(&Address::unix(long_path)).await;
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[tokio::test]
    async fn bind_default_permissions_hardened() {
        let dir = temp_dir("perms");
        let sock_path = dir.join("perm.sock");

        let listener = Listener::bind(&Address::unix(&sock_path)).await.unwrap();
        let mode = std::fs::metadata(&sock_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn bind_replaces_stale_socket() {
        let dir = temp_dir("stale");
        let sock_path = dir.join("stale.sock");

        // A bound std listener leaves a socket file behind once forgotten.
        let stale = std::os::unix::net::UnixListener::bind(&sock_path).unwrap();
        drop(stale);
        assert!(sock_path.exists());

        let listener = Listener::bind(&Address::unix(&sock_path)).await;
        assert!(listener.is_ok());

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn bind_rejects_existing_non_socket_file() {
        let dir = temp_dir("bind-file");
        let sock_path = dir.join("not-a-socket.sock");
        std::fs::write(&sock_path, b"regular-file").unwrap();

        let result = Listener::bind(&Address::unix(&sock_path)).await;
        assert!(matches!(result, Err(TransportError::Bind { .. })));
        assert!(sock_path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn drop_does_not_remove_replaced_path() {
        let dir = temp_dir("drop-race");
        let sock_path = dir.join("drop.sock");

        let listener = Listener::bind(&Address::unix(&sock_path)).await.unwrap();
        assert!(sock_path.exists());

        // Replace path while listener is alive.
        std::fs::remove_file(&sock_path).unwrap();
        std::fs::write(&sock_path, b"replacement-file").unwrap();

        drop(listener);
        assert!(
            sock_path.exists(),
            "drop must not remove path if inode identity changed"
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}

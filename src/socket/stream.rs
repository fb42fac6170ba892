//! Raw transports and the plain/TLS socket built on top of them.
//!
//! [`Transport`] is the byte pipe (TCP or a Unix domain socket).
//! [`SocketType`] is what the connector hands out: the transport itself, or
//! a BoringSSL stream wrapping it.

use crate::base::neterror::NetError;
use crate::socket::authority::Target;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio_boring::SslStream;

#[derive(Debug)]
pub enum Transport {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Transport {
    /// Open a transport to `target`.
    ///
    /// TCP hosts are resolved and each address is tried in order; the first
    /// to accept wins. Nagle's algorithm is disabled on the resulting socket.
    pub async fn open(target: &Target) -> Result<Self, NetError> {
        match target {
            Target::Tcp { host, port } => {
                let addrs = tokio::net::lookup_host((host.as_str(), *port))
                    .await
                    .map_err(|_| NetError::NameNotResolved)?;

                let mut last_err = NetError::NameNotResolved;
                for addr in addrs {
                    match TcpStream::connect(addr).await {
                        Ok(stream) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::warn!(error = %e, "tcp set_nodelay error");
                            }
                            return Ok(Transport::Tcp(stream));
                        }
                        Err(e) => {
                            tracing::debug!(addr = %addr, error = %e, "tcp connect attempt failed");
                            last_err = NetError::from(&e);
                        }
                    }
                }
                Err(last_err)
            }
            #[cfg(unix)]
            Target::Unix(path) => {
                // No Nagle on Unix sockets: nothing to tune.
                let stream = UnixStream::connect(path).await?;
                Ok(Transport::Unix(stream))
            }
            #[cfg(not(unix))]
            Target::Unix(_) => Err(NetError::AddressInvalid),
        }
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Transport::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Transport::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Transport::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            Transport::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// A connected socket, plaintext or TLS.
#[derive(Debug)]
pub enum SocketType {
    Plain(Transport),
    Ssl(SslStream<Transport>),
}

impl SocketType {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, SocketType::Ssl(_))
    }

    /// Whether the TLS handshake resumed an offered session.
    pub fn session_reused(&self) -> bool {
        match self {
            SocketType::Plain(_) => false,
            SocketType::Ssl(s) => s.ssl().session_reused(),
        }
    }

    /// Protocol selected via ALPN, if any.
    pub fn negotiated_alpn(&self) -> Option<&[u8]> {
        match self {
            SocketType::Plain(_) => None,
            SocketType::Ssl(s) => s.ssl().selected_alpn_protocol(),
        }
    }
}

impl AsyncRead for SocketType {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketType::Plain(s) => Pin::new(s).poll_read(cx, buf),
            SocketType::Ssl(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SocketType {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            SocketType::Plain(s) => Pin::new(s).poll_write(cx, buf),
            SocketType::Ssl(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketType::Plain(s) => Pin::new(s).poll_flush(cx),
            SocketType::Ssl(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketType::Plain(s) => Pin::new(s).poll_shutdown(cx),
            SocketType::Ssl(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

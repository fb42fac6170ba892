use crate::base::neterror::NetError;
use crate::socket::authority::Target;
use crate::socket::events::{SocketEvent, SocketEvents};
use crate::socket::stream::SocketType;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// A socket produced by a `Connector`.
///
/// Owned by the caller, who is responsible for teardown. I/O failures are
/// reported on the socket's [`SocketEvents`] in addition to being returned
/// from the read/write call, so a connector still tracking the socket can
/// drop a suspect TLS session.
#[derive(Debug)]
pub struct ConnectedSocket {
    inner: SocketType,
    events: SocketEvents,
    target: Target,
}

impl ConnectedSocket {
    pub(crate) fn new(inner: SocketType, events: SocketEvents, target: Target) -> Self {
        Self {
            inner,
            events,
            target,
        }
    }

    /// Where this socket is connected to.
    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn is_encrypted(&self) -> bool {
        self.inner.is_encrypted()
    }

    pub fn session_reused(&self) -> bool {
        self.inner.session_reused()
    }

    pub fn negotiated_alpn(&self) -> Option<&[u8]> {
        self.inner.negotiated_alpn()
    }

    pub fn events(&self) -> &SocketEvents {
        &self.events
    }

    /// Report an error observed by the socket's consumer.
    ///
    /// Use `NetError::Informational` for deliberate, benign closes.
    pub fn emit_error(&self, err: NetError) {
        self.events.emit(SocketEvent::Error(err));
    }

    /// Whether a connector is still learning sessions from this socket.
    pub fn is_tracked(&self) -> bool {
        self.events.is_tracked()
    }

    pub fn inner(&self) -> &SocketType {
        &self.inner
    }

    /// Consume and return the inner socket.
    ///
    /// Further I/O on the returned socket is no longer reported to the
    /// connector; detach first if that is the intent.
    pub fn into_inner(self) -> SocketType {
        self.inner
    }

    fn report<T>(&self, poll: Poll<std::io::Result<T>>) -> Poll<std::io::Result<T>> {
        if let Poll::Ready(Err(e)) = &poll {
            self.events.emit(SocketEvent::Error(NetError::from(e)));
        }
        poll
    }
}

impl AsyncRead for ConnectedSocket {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        self.report(poll)
    }
}

impl AsyncWrite for ConnectedSocket {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        self.report(poll)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let poll = Pin::new(&mut self.inner).poll_flush(cx);
        self.report(poll)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let poll = Pin::new(&mut self.inner).poll_shutdown(cx);
        self.report(poll)
    }
}

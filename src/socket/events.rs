//! Per-socket notification channel.
//!
//! Every [`ConnectedSocket`](crate::socket::client::ConnectedSocket) owns a
//! [`SocketEvents`] hub. The TLS layer reports new session tickets on it, the
//! socket reports its own I/O failures on it, and the socket's consumer may
//! report errors it observes at a higher layer. At most one listener (the
//! connector's session learner) is attached at a time.

use crate::base::neterror::NetError;
use crate::socket::tls::session::{SessionCache, TlsSession};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Something that happened on a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The peer issued a resumable session.
    NewSession(TlsSession),
    /// The socket failed, or its owner signalled a close.
    Error(NetError),
}

/// Applies socket events to a connector's session cache.
#[derive(Clone)]
pub(crate) struct SessionListener {
    cache: Arc<SessionCache>,
}

impl SessionListener {
    pub(crate) fn new(cache: Arc<SessionCache>) -> Self {
        Self { cache }
    }

    fn belongs_to(&self, cache: &Arc<SessionCache>) -> bool {
        Arc::ptr_eq(&self.cache, cache)
    }
}

/// Event hub shared between a socket and the TLS callbacks installed for it.
#[derive(Clone, Default)]
pub struct SocketEvents {
    listener: Arc<Mutex<Option<SessionListener>>>,
}

impl SocketEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to the attached listener, if any.
    ///
    /// The listener runs under the hub lock, so an event racing with a
    /// detach is either fully applied before it or dropped.
    pub fn emit(&self, event: SocketEvent) {
        if let Some(listener) = self.lock().as_ref() {
            listener.cache.apply(&event);
        }
    }

    /// Whether a session listener is currently attached.
    pub fn is_tracked(&self) -> bool {
        self.lock().is_some()
    }

    pub(crate) fn attach(&self, listener: SessionListener) {
        *self.lock() = Some(listener);
    }

    /// Remove the listener if it feeds `cache`. Returns whether one was removed.
    pub(crate) fn detach(&self, cache: &Arc<SessionCache>) -> bool {
        let mut slot = self.lock();
        match slot.as_ref() {
            Some(listener) if listener.belongs_to(cache) => {
                slot.take();
                true
            }
            _ => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<SessionListener>> {
        self.listener.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for SocketEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketEvents")
            .field("tracked", &self.is_tracked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(tag: &[u8]) -> TlsSession {
        TlsSession::from(tag.to_vec())
    }

    #[test]
    fn test_emit_without_listener_is_noop() {
        let events = SocketEvents::new();
        assert!(!events.is_tracked());
        events.emit(SocketEvent::NewSession(session(b"s1")));
    }

    #[test]
    fn test_listener_updates_cache() {
        let cache = Arc::new(SessionCache::default());
        let events = SocketEvents::new();
        events.attach(SessionListener::new(cache.clone()));

        events.emit(SocketEvent::NewSession(session(b"s1")));
        assert_eq!(cache.get(), Some(session(b"s1")));

        events.emit(SocketEvent::Error(NetError::ConnectionReset));
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn test_detach_stops_updates() {
        let cache = Arc::new(SessionCache::default());
        let events = SocketEvents::new();
        events.attach(SessionListener::new(cache.clone()));
        events.emit(SocketEvent::NewSession(session(b"s1")));

        assert!(events.detach(&cache));
        assert!(!events.is_tracked());

        events.emit(SocketEvent::Error(NetError::ConnectionReset));
        events.emit(SocketEvent::NewSession(session(b"s2")));
        assert_eq!(cache.get(), Some(session(b"s1")));

        // second detach is a no-op
        assert!(!events.detach(&cache));
    }

    #[test]
    fn test_detach_ignores_foreign_listener() {
        let ours = Arc::new(SessionCache::default());
        let theirs = Arc::new(SessionCache::default());
        let events = SocketEvents::new();
        events.attach(SessionListener::new(theirs.clone()));

        assert!(!events.detach(&ours));
        assert!(events.is_tracked());

        events.emit(SocketEvent::NewSession(session(b"s1")));
        assert_eq!(theirs.get(), Some(session(b"s1")));
        assert_eq!(ours.get(), None);
    }

    #[test]
    fn test_clones_share_listener() {
        let cache = Arc::new(SessionCache::default());
        let events = SocketEvents::new();
        let tls_side = events.clone();
        events.attach(SessionListener::new(cache.clone()));

        tls_side.emit(SocketEvent::NewSession(session(b"s1")));
        assert_eq!(cache.get(), Some(session(b"s1")));

        events.detach(&cache);
        tls_side.emit(SocketEvent::NewSession(session(b"s2")));
        assert_eq!(cache.get(), Some(session(b"s1")));
    }
}

//! TLS session resumption state.
//!
//! A connector remembers the most recent session ticket its peer handed out
//! and offers it on the next handshake. The cache is a single slot: the last
//! relevant socket event wins, nothing is merged.

use crate::base::neterror::NetError;
use crate::socket::events::SocketEvent;
use boring::ssl::SslSession;
use bytes::Bytes;
use std::fmt;
use std::sync::Mutex;

/// Opaque, DER-encoded TLS session.
#[derive(Clone, PartialEq, Eq)]
pub struct TlsSession(Bytes);

impl TlsSession {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode into a BoringSSL session that can be offered in a handshake.
    pub fn to_ssl_session(&self) -> Result<SslSession, NetError> {
        SslSession::from_der(&self.0).map_err(|_| NetError::SslProtocolError)
    }
}

impl From<Vec<u8>> for TlsSession {
    fn from(der: Vec<u8>) -> Self {
        Self(Bytes::from(der))
    }
}

impl From<Bytes> for TlsSession {
    fn from(der: Bytes) -> Self {
        Self(der)
    }
}

// Session bytes are key material; never print them.
impl fmt::Debug for TlsSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSession").field("len", &self.0.len()).finish()
    }
}

/// Cache transition for a single socket event.
///
/// A new ticket replaces whatever was cached. An error drops the cached
/// session unless it is informational.
pub fn next_session(current: Option<TlsSession>, event: &SocketEvent) -> Option<TlsSession> {
    match event {
        SocketEvent::NewSession(session) => Some(session.clone()),
        SocketEvent::Error(err) if err.is_informational() => current,
        SocketEvent::Error(_) => None,
    }
}

/// The single resumable session slot shared by all sockets of a connector.
#[derive(Default)]
pub struct SessionCache {
    slot: Mutex<Option<TlsSession>>,
}

impl SessionCache {
    pub fn new(initial: Option<TlsSession>) -> Self {
        Self {
            slot: Mutex::new(initial),
        }
    }

    pub fn get(&self) -> Option<TlsSession> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().take();
    }

    /// Apply one socket event to the cached session.
    pub fn apply(&self, event: &SocketEvent) {
        let mut slot = self.lock();
        let had_session = slot.is_some();
        *slot = next_session(slot.take(), event);
        match event {
            SocketEvent::NewSession(session) => {
                tracing::debug!(len = session.len(), "TLS session learned");
            }
            SocketEvent::Error(err) if had_session && slot.is_none() => {
                tracing::debug!(error = %err, "TLS session invalidated");
            }
            SocketEvent::Error(_) => {}
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<TlsSession>> {
        // Poisoning cannot leave the Option half-written; keep using it.
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache").field("session", &*self.lock()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(tag: &[u8]) -> TlsSession {
        TlsSession::from(tag.to_vec())
    }

    #[test]
    fn test_new_session_overwrites() {
        let s1 = session(b"s1");
        let s2 = session(b"s2");

        let state = next_session(None, &SocketEvent::NewSession(s1.clone()));
        assert_eq!(state, Some(s1));

        let state = next_session(state, &SocketEvent::NewSession(s2.clone()));
        assert_eq!(state, Some(s2));
    }

    #[test]
    fn test_error_clears_session() {
        let state = Some(session(b"s1"));
        let state = next_session(state, &SocketEvent::Error(NetError::ConnectionReset));
        assert_eq!(state, None);

        let state = next_session(None, &SocketEvent::Error(NetError::SslProtocolError));
        assert_eq!(state, None);
    }

    #[test]
    fn test_informational_error_keeps_session() {
        let s1 = session(b"s1");
        let state = next_session(Some(s1.clone()), &SocketEvent::Error(NetError::Informational));
        assert_eq!(state, Some(s1));

        let state = next_session(None, &SocketEvent::Error(NetError::Informational));
        assert_eq!(state, None);
    }

    #[test]
    fn test_last_event_wins() {
        let s1 = session(b"s1");
        let s2 = session(b"s2");

        // error then ticket: the ticket survives
        let cache = SessionCache::new(Some(s1.clone()));
        cache.apply(&SocketEvent::Error(NetError::ConnectionAborted));
        cache.apply(&SocketEvent::NewSession(s2.clone()));
        assert_eq!(cache.get(), Some(s2.clone()));

        // ticket then error: nothing survives
        cache.apply(&SocketEvent::NewSession(s1));
        cache.apply(&SocketEvent::Error(NetError::ConnectionClosed));
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn test_cache_clear_and_seed() {
        let cache = SessionCache::new(Some(session(b"seed")));
        assert_eq!(cache.get(), Some(session(b"seed")));
        cache.clear();
        assert!(cache.get().is_none());
    }

    #[test]
    fn test_debug_hides_bytes() {
        let s = session(b"secret-ticket");
        let out = format!("{:?}", s);
        assert!(!out.contains("secret"));
        assert!(out.contains("13"));
    }

    #[test]
    fn test_garbage_der_rejected() {
        let s = session(b"definitely not DER");
        assert_eq!(s.to_ssl_session().err(), Some(NetError::SslProtocolError));
    }
}

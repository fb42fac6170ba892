use crate::base::neterror::NetError;
use crate::socket::authority::{Authority, Target};
use crate::socket::client::ConnectedSocket;
use crate::socket::events::{SessionListener, SocketEvent, SocketEvents};
use crate::socket::stream::{SocketType, Transport};
use crate::socket::tls::{SessionCache, TlsConfig, TlsConnector, TlsPlan, TlsSession};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use tokio::task::JoinHandle;

/// Per-call connection options.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Present this server name instead of the connector's own.
    ///
    /// An override names a different peer, so the handshake starts cold and
    /// sessions it yields are not cached.
    pub server_name: Option<String>,
}

impl ConnectOptions {
    pub fn with_server_name(name: impl Into<String>) -> Self {
        Self {
            server_name: Some(name.into()),
        }
    }
}

/// Everything `connect` decided before touching the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPlan {
    pub target: Target,
    /// TLS parameters; `None` for plaintext.
    pub tls: Option<TlsPlan>,
    /// Whether the new socket feeds the connector's session cache.
    pub learn_sessions: bool,
}

/// A pending connection. Resolves once the transport is connected (and,
/// for TLS, once the handshake completes).
#[must_use = "futures do nothing unless polled"]
pub struct Connecting {
    inner: BoxFuture<'static, Result<ConnectedSocket, NetError>>,
}

impl Future for Connecting {
    type Output = Result<ConnectedSocket, NetError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

/// Produces connected sockets for one authority under one TLS policy, and
/// carries the most recent TLS session across reconnects.
///
/// Roughly equivalent to a Chromium ConnectJob factory bound to a group.
#[derive(Debug)]
pub struct Connector {
    authority: Authority,
    socket_path: Option<PathBuf>,
    tls: Arc<TlsConfig>,
    tls_connector: OnceLock<Arc<TlsConnector>>,
    server_name: Option<String>,
    sessions: Arc<SessionCache>,
}

/// Builder for `Connector`.
#[must_use]
#[derive(Debug, Clone)]
pub struct ConnectorBuilder {
    authority: Authority,
    socket_path: Option<PathBuf>,
    tls: Option<TlsConfig>,
}

impl ConnectorBuilder {
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Connect through a Unix domain socket instead of resolving host/port.
    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    pub fn build(self) -> Connector {
        Connector::new(self.tls, self.authority, self.socket_path)
    }
}

impl Connector {
    /// `tls = None` uses the default TLS policy.
    ///
    /// The server name is the configured one, else the authority host; empty
    /// names count as absent. The session cache starts from the configured
    /// session, if any.
    pub fn new(tls: Option<TlsConfig>, authority: Authority, socket_path: Option<PathBuf>) -> Self {
        let tls = tls.unwrap_or_default();
        let server_name = tls
            .server_name
            .clone()
            .or_else(|| Some(authority.host().to_string()))
            .filter(|name| !name.is_empty());
        let sessions = Arc::new(SessionCache::new(tls.session.clone()));
        Self {
            authority,
            socket_path,
            tls: Arc::new(tls),
            tls_connector: OnceLock::new(),
            server_name,
            sessions,
        }
    }

    pub fn builder(authority: Authority) -> ConnectorBuilder {
        ConnectorBuilder {
            authority,
            socket_path: None,
            tls: None,
        }
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn socket_path(&self) -> Option<&Path> {
        self.socket_path.as_deref()
    }

    pub fn tls_config(&self) -> &TlsConfig {
        &self.tls
    }

    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// The session the next non-overridden TLS handshake will offer.
    pub fn cached_session(&self) -> Option<TlsSession> {
        self.sessions.get()
    }

    /// Forget the cached session; the next handshake is a full one.
    pub fn clear_session(&self) {
        self.sessions.clear();
    }

    /// Decide target, TLS parameters and session learning for one connection.
    ///
    /// Fails with `AddressInvalid` on a malformed bracketed IPv6 host, even
    /// when a socket path makes the host irrelevant, and when peer
    /// verification is on but there is no server name to verify against.
    pub fn plan(&self, options: &ConnectOptions) -> Result<ConnectPlan, NetError> {
        let host = self.authority.resolve_host()?;

        let target = match &self.socket_path {
            Some(path) => Target::Unix(path.clone()),
            None => Target::Tcp {
                host: host.to_string(),
                port: self.authority.port_or_default(),
            },
        };

        if !self.authority.scheme().is_secure() {
            return Ok(ConnectPlan {
                target,
                tls: None,
                learn_sessions: false,
            });
        }

        let plan = match &options.server_name {
            Some(name) => ConnectPlan {
                target,
                tls: Some(TlsPlan {
                    server_name: Some(name.clone()),
                    session: None,
                }),
                learn_sessions: false,
            },
            None => ConnectPlan {
                target,
                tls: Some(TlsPlan {
                    server_name: self.server_name.clone(),
                    session: self.sessions.get(),
                }),
                learn_sessions: self.tls.reuse_sessions,
            },
        };

        let unnamed = plan.tls.as_ref().map_or(false, |t| t.handshake_name().is_none());
        if self.tls.verify_peer && unnamed {
            return Err(NetError::AddressInvalid);
        }
        Ok(plan)
    }

    /// Start a connection.
    ///
    /// Configuration errors are returned immediately and no socket is opened.
    /// Transport and handshake failures resolve the returned future with an
    /// error and are also delivered to the session cache, which drops its
    /// session. Nothing is retried.
    pub fn connect(&self, options: ConnectOptions) -> Result<Connecting, NetError> {
        let plan = self.plan(&options)?;
        let tls = match plan.tls {
            Some(_) => Some(self.tls_connector()?),
            None => None,
        };

        let events = SocketEvents::new();
        if plan.learn_sessions {
            events.attach(SessionListener::new(self.sessions.clone()));
        }

        tracing::debug!(
            authority = %self.authority,
            dest = %plan.target,
            encrypted = plan.tls.is_some(),
            resuming = plan.tls.as_ref().map_or(false, |t| t.session.is_some()),
            "connect"
        );

        Ok(Connecting {
            inner: establish(plan, tls, events).boxed(),
        })
    }

    /// Callback form of [`connect`](Self::connect).
    ///
    /// Spawns the connection on the current tokio runtime and invokes
    /// `on_connect` exactly once, only on success. The handle yields the
    /// transport error, if any.
    pub fn connect_with<F>(
        &self,
        options: ConnectOptions,
        on_connect: F,
    ) -> Result<JoinHandle<Result<(), NetError>>, NetError>
    where
        F: FnOnce(ConnectedSocket) + Send + 'static,
    {
        let connecting = self.connect(options)?;
        Ok(tokio::spawn(async move {
            let socket = connecting.await?;
            on_connect(socket);
            Ok(())
        }))
    }

    /// The BoringSSL context for this connector, built on first use.
    ///
    /// Invalid handshake options surface here, synchronously from `connect`.
    fn tls_connector(&self) -> Result<Arc<TlsConnector>, NetError> {
        if let Some(connector) = self.tls_connector.get() {
            return Ok(connector.clone());
        }
        let connector = Arc::new(self.tls.build_connector()?);
        Ok(self.tls_connector.get_or_init(|| connector).clone())
    }

    /// Stop learning sessions from `socket`.
    ///
    /// Call before handing the socket to another owner or dropping it. A
    /// socket this connector is not tracking is left untouched.
    pub fn detach(&self, socket: &ConnectedSocket) {
        if socket.events().detach(&self.sessions) {
            tracing::debug!(dest = %socket.target(), "socket detached from session cache");
        }
    }
}

async fn establish(
    plan: ConnectPlan,
    tls: Option<Arc<TlsConnector>>,
    events: SocketEvents,
) -> Result<ConnectedSocket, NetError> {
    let transport = match Transport::open(&plan.target).await {
        Ok(transport) => transport,
        Err(e) => {
            events.emit(SocketEvent::Error(e));
            return Err(e);
        }
    };

    let (Some(tls_plan), Some(tls)) = (plan.tls, tls) else {
        return Ok(ConnectedSocket::new(
            SocketType::Plain(transport),
            events,
            plan.target,
        ));
    };

    let learner = plan.learn_sessions.then_some(&events);
    let config = match tls.configure(&tls_plan, learner) {
        Ok(config) => config,
        Err(e) => {
            events.emit(SocketEvent::Error(e));
            return Err(e);
        }
    };

    let domain = tls_plan.handshake_name().unwrap_or("");
    match tokio_boring::connect(config, domain, transport).await {
        Ok(stream) => {
            tracing::debug!(
                dest = %plan.target,
                session_reused = stream.ssl().session_reused(),
                "TLS handshake complete"
            );
            Ok(ConnectedSocket::new(SocketType::Ssl(stream), events, plan.target))
        }
        Err(e) => {
            tracing::debug!(dest = %plan.target, error = ?e, "TLS handshake failed");
            let err = e
                .as_io_error()
                .map(NetError::from)
                .unwrap_or(NetError::SslProtocolError);
            events.emit(SocketEvent::Error(err));
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::authority::Scheme;

    fn session(tag: &[u8]) -> TlsSession {
        TlsSession::from(tag.to_vec())
    }

    fn https(host: &str, port: Option<u16>) -> Connector {
        Connector::new(None, Authority::new(Scheme::Https, host, port), None)
    }

    #[test]
    fn test_server_name_derivation() {
        let c = https("example.com", None);
        assert_eq!(c.server_name(), Some("example.com"));

        let tls = TlsConfig::builder().server_name("sni.example.com").build();
        let c = Connector::new(Some(tls), Authority::new(Scheme::Https, "example.com", None), None);
        assert_eq!(c.server_name(), Some("sni.example.com"));

        let c = https("", None);
        assert_eq!(c.server_name(), None);
    }

    #[test]
    fn test_initial_session_seeded() {
        let tls = TlsConfig::builder().session(session(b"seed")).build();
        let c = Connector::new(Some(tls), Authority::new(Scheme::Https, "a.test", None), None);
        assert_eq!(c.cached_session(), Some(session(b"seed")));

        let plan = c.plan(&ConnectOptions::default()).unwrap();
        assert_eq!(plan.tls.unwrap().session, Some(session(b"seed")));
    }

    #[test]
    fn test_default_ports() {
        let plan = https("a.test", None).plan(&ConnectOptions::default()).unwrap();
        assert_eq!(plan.target, Target::Tcp { host: "a.test".into(), port: 443 });

        let http = Connector::new(None, Authority::new(Scheme::Http, "a.test", None), None);
        let plan = http.plan(&ConnectOptions::default()).unwrap();
        assert_eq!(plan.target, Target::Tcp { host: "a.test".into(), port: 80 });
        assert!(plan.tls.is_none());
        assert!(!plan.learn_sessions);

        let plan = https("a.test", Some(8443)).plan(&ConnectOptions::default()).unwrap();
        assert_eq!(plan.target, Target::Tcp { host: "a.test".into(), port: 8443 });
    }

    #[test]
    fn test_ipv6_host_unwrapped() {
        let plan = https("[::1]", Some(8443)).plan(&ConnectOptions::default()).unwrap();
        assert_eq!(plan.target, Target::Tcp { host: "::1".into(), port: 8443 });
    }

    #[test]
    fn test_malformed_ipv6_fails_before_connect() {
        let c = https("[::1", None);
        assert_eq!(c.plan(&ConnectOptions::default()), Err(NetError::AddressInvalid));
        assert!(matches!(c.connect(ConnectOptions::default()), Err(NetError::AddressInvalid)));

        let c = https("[not-an-ip]", None);
        assert!(matches!(c.connect(ConnectOptions::default()), Err(NetError::AddressInvalid)));
    }

    #[test]
    fn test_socket_path_bypasses_host() {
        let c = Connector::builder(Authority::new(Scheme::Https, "example.com", Some(1)))
            .socket_path("/tmp/app.sock")
            .build();
        let plan = c.plan(&ConnectOptions::default()).unwrap();
        assert_eq!(plan.target, Target::Unix(PathBuf::from("/tmp/app.sock")));
        // The authority host still names the peer.
        assert_eq!(plan.tls.unwrap().server_name.as_deref(), Some("example.com"));

        // A malformed host is still rejected.
        let c = Connector::builder(Authority::new(Scheme::Http, "[::1", None))
            .socket_path("/tmp/app.sock")
            .build();
        assert_eq!(c.plan(&ConnectOptions::default()), Err(NetError::AddressInvalid));
    }

    #[test]
    fn test_override_starts_cold() {
        let tls = TlsConfig::builder().session(session(b"s1")).build();
        let c = Connector::new(Some(tls), Authority::new(Scheme::Https, "a.test", None), None);

        let plan = c.plan(&ConnectOptions::with_server_name("b.test")).unwrap();
        let tls = plan.tls.unwrap();
        assert_eq!(tls.server_name.as_deref(), Some("b.test"));
        assert_eq!(tls.session, None);
        assert!(!plan.learn_sessions);

        // The cache itself is untouched.
        assert_eq!(c.cached_session(), Some(session(b"s1")));
    }

    #[test]
    fn test_reuse_disabled_does_not_learn() {
        let tls = TlsConfig::builder().reuse_sessions(false).build();
        let c = Connector::new(Some(tls), Authority::new(Scheme::Https, "a.test", None), None);
        let plan = c.plan(&ConnectOptions::default()).unwrap();
        assert!(!plan.learn_sessions);
        assert!(plan.tls.is_some());
    }

    #[test]
    fn test_learned_sessions_flow_into_next_plan() {
        let c = https("a.test", None);
        let plan = c.plan(&ConnectOptions::default()).unwrap();
        assert!(plan.learn_sessions);

        let events = SocketEvents::new();
        events.attach(SessionListener::new(c.sessions.clone()));

        events.emit(SocketEvent::NewSession(session(b"s1")));
        let next = c.plan(&ConnectOptions::default()).unwrap();
        assert_eq!(next.tls.unwrap().session, Some(session(b"s1")));

        events.emit(SocketEvent::NewSession(session(b"s2")));
        let next = c.plan(&ConnectOptions::default()).unwrap();
        assert_eq!(next.tls.unwrap().session, Some(session(b"s2")));

        events.emit(SocketEvent::Error(NetError::Informational));
        assert_eq!(c.cached_session(), Some(session(b"s2")));

        events.emit(SocketEvent::Error(NetError::ConnectionReset));
        let next = c.plan(&ConnectOptions::default()).unwrap();
        assert_eq!(next.tls.unwrap().session, None);
    }

    #[test]
    fn test_clear_session() {
        let tls = TlsConfig::builder().session(session(b"s1")).build();
        let c = Connector::new(Some(tls), Authority::new(Scheme::Https, "a.test", None), None);
        c.clear_session();
        assert!(c.cached_session().is_none());
    }

    #[test]
    fn test_empty_configured_server_name_falls_back_to_host() {
        let tls = TlsConfig::builder().server_name("").build();
        let c = Connector::new(Some(tls), Authority::new(Scheme::Https, "a.test", None), None);
        assert_eq!(c.server_name(), Some("a.test"));

        let plan = c.plan(&ConnectOptions::default()).unwrap();
        assert_eq!(plan.tls.unwrap().handshake_name(), Some("a.test"));
    }

    #[test]
    fn test_verification_requires_a_server_name() {
        let c = https("", Some(443));
        assert_eq!(c.plan(&ConnectOptions::default()), Err(NetError::AddressInvalid));
        assert!(matches!(c.connect(ConnectOptions::default()), Err(NetError::AddressInvalid)));

        // An empty override leaves nothing to verify either.
        let c = https("a.test", None);
        assert_eq!(
            c.plan(&ConnectOptions::with_server_name("")),
            Err(NetError::AddressInvalid)
        );

        // Without verification an unnamed handshake is allowed.
        let tls = TlsConfig::builder().verify_peer(false).build();
        let c = Connector::new(Some(tls), Authority::new(Scheme::Https, "", Some(443)), None);
        let plan = c.plan(&ConnectOptions::default()).unwrap();
        assert_eq!(plan.tls.unwrap().handshake_name(), None);
    }

    #[test]
    fn test_invalid_tls_options_fail_synchronously() {
        let tls = TlsConfig::builder()
            .options(crate::socket::tls::TlsOptions::builder().cipher_list("NOT-A-CIPHER").build())
            .build();
        let c = Connector::new(Some(tls), Authority::new(Scheme::Https, "a.test", None), None);
        assert!(matches!(
            c.connect(ConnectOptions::default()),
            Err(NetError::SslVersionOrCipherMismatch)
        ));
    }

    #[test]
    fn test_tls_context_built_once() {
        let c = https("a.test", None);
        let first = c.tls_connector().unwrap();
        let second = c.tls_connector().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}

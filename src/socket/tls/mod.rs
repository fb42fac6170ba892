//! TLS policy for a connector.
//!
//! [`TlsConfig`] is fixed for the lifetime of a connector. Per-connection
//! parameters (server name, starting session) arrive as a [`TlsPlan`] and are
//! turned into a `ConnectConfiguration` by the connector's single
//! [`TlsConnector`], so every handshake and every cached session shares one
//! BoringSSL context.

use crate::base::neterror::NetError;
use crate::socket::events::{SocketEvent, SocketEvents};
use boring::ex_data::Index;
use boring::ssl::{
    ConnectConfiguration, Ssl, SslConnector, SslMethod, SslSessionCacheMode, SslVerifyMode,
};
use std::fmt;
use std::sync::OnceLock;

pub mod options;
pub mod session;

pub use self::options::{TlsOptions, TlsOptionsBuilder, TlsVersion};
pub use self::session::{SessionCache, TlsSession};

/// Connector-level TLS configuration.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Verify the peer certificate chain and host name.
    pub verify_peer: bool,
    /// Remember session tickets and offer them on the next handshake.
    pub reuse_sessions: bool,
    /// Server name presented via SNI, overriding the authority host.
    pub server_name: Option<String>,
    /// Session to offer on the first handshake.
    pub session: Option<TlsSession>,
    /// Handshake parameters.
    pub options: TlsOptions,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            verify_peer: true,
            reuse_sessions: true,
            server_name: None,
            session: None,
            options: TlsOptions::default(),
        }
    }
}

/// Builder for `TlsConfig`.
#[must_use]
#[derive(Debug, Clone, Default)]
pub struct TlsConfigBuilder {
    config: TlsConfig,
}

impl TlsConfigBuilder {
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.config.verify_peer = verify;
        self
    }

    pub fn reuse_sessions(mut self, reuse: bool) -> Self {
        self.config.reuse_sessions = reuse;
        self
    }

    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = Some(name.into());
        self
    }

    pub fn session(mut self, session: TlsSession) -> Self {
        self.config.session = Some(session);
        self
    }

    pub fn options(mut self, options: TlsOptions) -> Self {
        self.config.options = options;
        self
    }

    pub fn build(self) -> TlsConfig {
        self.config
    }
}

/// Per-connection TLS parameters chosen by the connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPlan {
    /// Name for SNI and host name verification.
    pub server_name: Option<String>,
    /// Session offered for resumption. Always `None` under a server name override.
    pub session: Option<TlsSession>,
}

impl TlsPlan {
    /// Server name with IPv6 brackets removed, as BoringSSL expects it.
    pub fn handshake_name(&self) -> Option<&str> {
        self.server_name
            .as_deref()
            .map(|name| name.trim_start_matches('[').trim_end_matches(']'))
            .filter(|name| !name.is_empty())
    }
}

impl TlsConfig {
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// Build the BoringSSL context shared by every connection of a connector.
    ///
    /// Sessions offered on later handshakes are always ones issued under this
    /// context. Fails on invalid handshake options (cipher list, curves, ALPN).
    pub fn build_connector(&self) -> Result<TlsConnector, NetError> {
        let events_index = events_index()?;

        let mut builder =
            SslConnector::builder(SslMethod::tls()).map_err(|_| NetError::SslProtocolError)?;
        self.options.apply_to_builder(&mut builder)?;

        builder.set_verify(if self.verify_peer {
            SslVerifyMode::PEER
        } else {
            SslVerifyMode::NONE
        });

        // Tickets go to whichever socket the Ssl belongs to; sockets without
        // an events hub attached are not learning.
        builder.set_session_cache_mode(SslSessionCacheMode::CLIENT);
        builder.set_new_session_callback(move |ssl, session| {
            let Some(events) = ssl.ex_data(events_index) else {
                return;
            };
            match session.to_der() {
                Ok(der) => events.emit(SocketEvent::NewSession(TlsSession::from(der))),
                Err(e) => tracing::debug!(error = %e, "failed to encode TLS session"),
            }
        });

        Ok(TlsConnector {
            connector: builder.build(),
            events_index,
            verify_peer: self.verify_peer,
        })
    }

    /// Check if SNI should be set for this host.
    /// Per RFC 6066, SNI MUST NOT be set for raw IP addresses.
    pub fn should_set_sni(host: &str) -> bool {
        host.parse::<std::net::IpAddr>().is_err()
    }
}

/// Process-wide ex_data slot carrying a socket's events hub on its `Ssl`.
fn events_index() -> Result<Index<Ssl, SocketEvents>, NetError> {
    static INDEX: OnceLock<Index<Ssl, SocketEvents>> = OnceLock::new();
    if let Some(index) = INDEX.get() {
        return Ok(*index);
    }
    let index = Ssl::new_ex_index::<SocketEvents>().map_err(|_| NetError::SslProtocolError)?;
    Ok(*INDEX.get_or_init(|| index))
}

/// A connector's BoringSSL context, built once and reused for every handshake.
pub struct TlsConnector {
    connector: SslConnector,
    events_index: Index<Ssl, SocketEvents>,
    verify_peer: bool,
}

impl TlsConnector {
    /// Per-connection handshake configuration.
    ///
    /// When `events` is given, session tickets the peer issues on this
    /// connection are reported on it as [`SocketEvent::NewSession`].
    pub fn configure(
        &self,
        plan: &TlsPlan,
        events: Option<&SocketEvents>,
    ) -> Result<ConnectConfiguration, NetError> {
        let mut config = self
            .connector
            .configure()
            .map_err(|_| NetError::SslProtocolError)?;

        let name = plan.handshake_name();
        config.set_use_server_name_indication(name.map_or(false, TlsConfig::should_set_sni));
        config.set_verify_hostname(self.verify_peer && name.is_some());

        if let Some(events) = events {
            config.set_ex_data(self.events_index, events.clone());
        }

        if let Some(session) = &plan.session {
            match session.to_ssl_session() {
                // SAFETY: every context-bound field of a client session is
                // checked by BoringSSL when the ClientHello is built; a
                // mismatched session is simply not offered. Cached sessions
                // were issued to sockets of this same context, and a seeded
                // session is the caller's claim for this authority.
                Ok(ssl_session) => unsafe {
                    config
                        .set_session(&ssl_session)
                        .map_err(|_| NetError::SslProtocolError)?;
                },
                Err(e) => tracing::warn!(error = %e, "cached TLS session unusable, full handshake"),
            }
        }

        Ok(config)
    }
}

impl fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConnector")
            .field("verify_peer", &self.verify_peer)
            .finish()
    }
}

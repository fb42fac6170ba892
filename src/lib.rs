//! # netconnector
//!
//! Transport connection establishment for a Chromium-inspired HTTP client.
//!
//! A [`Connector`](socket::Connector) is bound to one destination authority
//! and one TLS policy. Each call to `connect` produces a fresh socket: plain
//! TCP, a Unix domain socket, or TLS over either. Successive TLS handshakes
//! offer the most recent session ticket the peer issued, so reconnects to the
//! same authority resume instead of paying for a full handshake.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use netconnector::socket::{Authority, ConnectOptions, Connector};
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() {
//!     let url = Url::parse("https://example.com").unwrap();
//!     let connector = Connector::new(None, Authority::from_url(&url).unwrap(), None);
//!
//!     let socket = connector.connect(ConnectOptions::default()).unwrap().await.unwrap();
//!     // ... hand the socket to the HTTP layer ...
//!     connector.detach(&socket);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error definitions
//! - [`socket`] - Authorities, connectors, sockets and TLS session reuse
//!
//! ## Session reuse
//!
//! Sessions are only learned for encrypted connections that use the
//! connector's own server name with `reuse_sessions` enabled. Any
//! non-informational error on a tracked socket drops the cached session.

pub mod base;
pub mod socket;

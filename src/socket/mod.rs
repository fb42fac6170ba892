//! Socket and connection establishment.
//!
//! Mirrors the connect half of Chromium's `net/socket/`:
//! - [`authority`]: destination (scheme, host, port) and connection targets
//! - [`connector`]: TCP / Unix → optional TLS connection flow, session reuse
//! - [`events`]: per-socket event channel feeding the session cache
//! - [`stream`]: plain and TLS transports
//! - [`tls`]: TLS configuration and session resumption with BoringSSL

pub mod authority;
pub mod client;
pub mod connector;
pub mod events;
pub mod stream;
pub mod tls;

pub use self::authority::{Authority, Scheme, Target};
pub use self::client::ConnectedSocket;
pub use self::connector::{ConnectOptions, ConnectPlan, Connecting, Connector, ConnectorBuilder};
pub use self::events::{SocketEvent, SocketEvents};

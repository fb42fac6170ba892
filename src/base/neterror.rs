use std::io;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum NetError {
    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("Socket not connected")]
    SocketNotConnected,
    #[error("SSL protocol error")]
    SslProtocolError,
    #[error("Address invalid")]
    AddressInvalid,
    #[error("Address unreachable")]
    AddressUnreachable,
    #[error("SSL version or cipher mismatch")]
    SslVersionOrCipherMismatch,
    #[error("Connection timed out")]
    ConnectionTimedOut,
    #[error("Network access denied")]
    NetworkAccessDenied,
    #[error("Address in use")]
    AddressInUse,

    // URL Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Unknown URL scheme")]
    UnknownUrlScheme,

    // Socket was closed or signalled in-band by its consumer (keep-alive reset,
    // idle close, protocol upgrade). Never a fault of the connection itself.
    #[error("Informational: socket closed by its owner")]
    Informational,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed => -104,
            NetError::NameNotResolved => -105,
            NetError::SslProtocolError => -107,
            NetError::AddressInvalid => -108,
            NetError::AddressUnreachable => -109,
            NetError::SocketNotConnected => -112,
            NetError::SslVersionOrCipherMismatch => -113,
            NetError::ConnectionTimedOut => -118,
            NetError::NetworkAccessDenied => -138,
            NetError::AddressInUse => -147,
            NetError::InvalidUrl => -300,
            NetError::UnknownUrlScheme => -302,
            // Custom codes (outside Chromium's net_error_list.h)
            NetError::Informational => -10001,
            NetError::Unknown(code) => *code,
        }
    }

    /// Whether this error is benign in-band signalling rather than a
    /// connection or handshake failure.
    ///
    /// Only informational errors leave a cached TLS session in place.
    pub fn is_informational(&self) -> bool {
        matches!(self, NetError::Informational)
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -100 => NetError::ConnectionClosed,
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -103 => NetError::ConnectionAborted,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -107 => NetError::SslProtocolError,
            -108 => NetError::AddressInvalid,
            -109 => NetError::AddressUnreachable,
            -112 => NetError::SocketNotConnected,
            -113 => NetError::SslVersionOrCipherMismatch,
            -118 => NetError::ConnectionTimedOut,
            -138 => NetError::NetworkAccessDenied,
            -147 => NetError::AddressInUse,
            -300 => NetError::InvalidUrl,
            -302 => NetError::UnknownUrlScheme,
            -10001 => NetError::Informational,
            _ => NetError::Unknown(code),
        }
    }
}

/// Maps OS-level socket failures onto net error codes.
/// Mirrors Chromium's MapSystemError().
impl From<&io::Error> for NetError {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
            io::ErrorKind::ConnectionReset => NetError::ConnectionReset,
            io::ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
            io::ErrorKind::NotConnected => NetError::SocketNotConnected,
            io::ErrorKind::AddrInUse => NetError::AddressInUse,
            io::ErrorKind::AddrNotAvailable => NetError::AddressUnreachable,
            io::ErrorKind::InvalidInput => NetError::AddressInvalid,
            io::ErrorKind::TimedOut => NetError::ConnectionTimedOut,
            io::ErrorKind::PermissionDenied => NetError::NetworkAccessDenied,
            io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => NetError::ConnectionClosed,
            io::ErrorKind::NotFound => NetError::AddressUnreachable,
            _ => NetError::ConnectionFailed,
        }
    }
}

impl From<io::Error> for NetError {
    fn from(err: io::Error) -> Self {
        NetError::from(&err)
    }
}

//! Connection targets.
//!
//! An [`Authority`] is the scheme/host/port triple a connector is bound to.
//! It is turned into a concrete [`Target`] (TCP host/port or Unix socket path)
//! each time a connection is opened.

use crate::base::neterror::NetError;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

/// URL scheme of the destination. Decides plaintext vs TLS transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// Whether connections for this scheme run TLS over the transport.
    pub fn is_secure(&self) -> bool {
        matches!(self, Scheme::Https)
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl FromStr for Scheme {
    type Err = NetError;

    /// Accepts both `https` and the `https:` protocol form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_end_matches(':').to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            _ => Err(NetError::UnknownUrlScheme),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a connection target (scheme, host, port).
///
/// IPv6 hosts are kept in their bracketed URL form (`[::1]`) and are only
/// unwrapped by [`Authority::resolve_host`] when a connection is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Authority {
    scheme: Scheme,
    host: String,
    port: Option<u16>,
}

impl Authority {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Build an authority from a parsed URL.
    ///
    /// A port equal to the scheme's default is reported as absent by `url`,
    /// which is equivalent here since the default is applied at connect time.
    pub fn from_url(url: &Url) -> Result<Self, NetError> {
        let scheme = url.scheme().parse::<Scheme>()?;
        let host = url.host_str().ok_or(NetError::InvalidUrl)?;
        Ok(Self::new(scheme, host, url.port()))
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Host exactly as configured, brackets included.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Explicit port, else the scheme default (443 for https, 80 for http).
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or_else(|| self.scheme.default_port())
    }

    /// Host to hand to the resolver.
    ///
    /// A bracketed host must be a well-formed IP literal: a missing `]` or
    /// non-IP text between the brackets is a configuration error and yields
    /// `AddressInvalid` before any socket is opened.
    pub fn resolve_host(&self) -> Result<&str, NetError> {
        let Some(rest) = self.host.strip_prefix('[') else {
            return Ok(&self.host);
        };
        let end = rest.find(']').ok_or(NetError::AddressInvalid)?;
        let ip = &rest[..end];
        ip.parse::<IpAddr>().map_err(|_| NetError::AddressInvalid)?;
        Ok(ip)
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}://{}:{}", self.scheme, self.host, port),
            None => write!(f, "{}://{}", self.scheme, self.host),
        }
    }
}

/// Where a single connection attempt goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Tcp { host, port } if host.contains(':') => write!(f, "[{}]:{}", host, port),
            Target::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Target::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

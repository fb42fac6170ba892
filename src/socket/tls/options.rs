use crate::base::neterror::NetError;
use boring::ssl::{SslConnectorBuilder, SslOptions, SslVersion};
use std::fmt;

/// TLS protocol version bound.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TlsVersion(pub SslVersion);

impl TlsVersion {
    pub const TLS_1_2: TlsVersion = TlsVersion(SslVersion::TLS1_2);
    pub const TLS_1_3: TlsVersion = TlsVersion(SslVersion::TLS1_3);
}

impl fmt::Debug for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if *self == Self::TLS_1_2 {
            "TLSv1.2"
        } else if *self == Self::TLS_1_3 {
            "TLSv1.3"
        } else {
            "unknown"
        };
        f.write_str(name)
    }
}

/// Builder for `TlsOptions`.
#[must_use]
#[derive(Debug, Clone)]
pub struct TlsOptionsBuilder {
    config: TlsOptions,
}

/// Handshake parameters fed into BoringSSL for every TLS connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsOptions {
    /// ALPN protocols.
    pub alpn_protocols: Option<Vec<String>>,

    /// Minimum TLS version.
    pub min_tls_version: Option<TlsVersion>,

    /// Maximum TLS version.
    pub max_tls_version: Option<TlsVersion>,

    /// Accept session tickets from the server.
    pub session_ticket: bool,

    /// Cipher suite configuration string.
    pub cipher_list: Option<String>,

    /// Supported curves list.
    pub curves_list: Option<String>,

    /// Supported signature algorithms.
    pub sigalgs_list: Option<String>,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            alpn_protocols: Some(vec!["h2".to_string(), "http/1.1".to_string()]),
            min_tls_version: Some(TlsVersion::TLS_1_2),
            max_tls_version: Some(TlsVersion::TLS_1_3),
            session_ticket: true,
            cipher_list: None,
            curves_list: None,
            sigalgs_list: None,
        }
    }
}

impl Default for TlsOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TlsOptionsBuilder {
    pub fn new() -> Self {
        Self {
            config: TlsOptions::default(),
        }
    }

    pub fn alpn_protocols(mut self, alpn: &[&str]) -> Self {
        self.config.alpn_protocols = Some(alpn.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn min_tls_version(mut self, version: TlsVersion) -> Self {
        self.config.min_tls_version = Some(version);
        self
    }

    pub fn max_tls_version(mut self, version: TlsVersion) -> Self {
        self.config.max_tls_version = Some(version);
        self
    }

    pub fn session_ticket(mut self, enabled: bool) -> Self {
        self.config.session_ticket = enabled;
        self
    }

    pub fn cipher_list(mut self, ciphers: &str) -> Self {
        self.config.cipher_list = Some(ciphers.to_string());
        self
    }

    pub fn curves_list(mut self, curves: &str) -> Self {
        self.config.curves_list = Some(curves.to_string());
        self
    }

    pub fn sigalgs_list(mut self, sigalgs: &str) -> Self {
        self.config.sigalgs_list = Some(sigalgs.to_string());
        self
    }

    pub fn build(self) -> TlsOptions {
        self.config
    }
}

impl TlsOptions {
    pub fn builder() -> TlsOptionsBuilder {
        TlsOptionsBuilder::new()
    }

    /// Encode the ALPN list in wire format (length-prefixed protocol names).
    pub fn alpn_wire(&self) -> Result<Option<Vec<u8>>, NetError> {
        let Some(protos) = self.alpn_protocols.as_ref().filter(|p| !p.is_empty()) else {
            return Ok(None);
        };
        let mut alpn_wire = Vec::new();
        for proto in protos {
            if proto.is_empty() || proto.len() > 255 {
                return Err(NetError::SslProtocolError);
            }
            alpn_wire.push(proto.len() as u8);
            alpn_wire.extend_from_slice(proto.as_bytes());
        }
        Ok(Some(alpn_wire))
    }

    /// Apply this configuration to an SSL connector builder.
    ///
    /// Peer verification is decided by the owning `TlsConfig`, not here.
    pub fn apply_to_builder(&self, builder: &mut SslConnectorBuilder) -> Result<(), NetError> {
        if let Some(min) = self.min_tls_version {
            builder
                .set_min_proto_version(Some(min.0))
                .map_err(|_| NetError::SslProtocolError)?;
        }
        if let Some(max) = self.max_tls_version {
            builder
                .set_max_proto_version(Some(max.0))
                .map_err(|_| NetError::SslProtocolError)?;
        }

        if let Some(ciphers) = &self.cipher_list {
            builder
                .set_cipher_list(ciphers)
                .map_err(|_| NetError::SslVersionOrCipherMismatch)?;
        }

        if let Some(alpn_wire) = self.alpn_wire()? {
            builder
                .set_alpn_protos(&alpn_wire)
                .map_err(|_| NetError::SslProtocolError)?;
        }

        if let Some(sigalgs) = &self.sigalgs_list {
            builder
                .set_sigalgs_list(sigalgs)
                .map_err(|_| NetError::SslProtocolError)?;
        }

        if let Some(curves) = &self.curves_list {
            builder
                .set_curves_list(curves)
                .map_err(|_| NetError::SslProtocolError)?;
        }

        if !self.session_ticket {
            builder.set_options(SslOptions::NO_TICKET);
        }

        Ok(())
    }
}

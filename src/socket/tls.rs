use crate::base::neterror::NetError;
use boring::ssl::{SslConnector, SslConnectorBuilder, SslMethod, SslVerifyMode, SslVersion};
use std::path::PathBuf;

/// ALPN wire encoding of `http/1.1`. The Upgrade handshake is HTTP/1.1 only.
const ALPN_HTTP_1_1: &[u8] = b"\x08http/1.1";

/// TLS configuration for `wss://` connections.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub min_version: Option<SslVersion>,
    pub max_version: Option<SslVersion>,
    pub cipher_list: Option<String>,
    /// Extra PEM trust anchors, added on top of the system store.
    pub ca_file: Option<PathBuf>,
    /// Name used for SNI and certificate hostname checks instead of the URL host.
    pub server_name: Option<String>,
    pub verify_certificates: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            min_version: Some(SslVersion::TLS1_2),
            max_version: Some(SslVersion::TLS1_3),
            cipher_list: None,
            ca_file: None,
            server_name: None,
            verify_certificates: true,
        }
    }
}

impl TlsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Disable certificate and hostname verification.
    ///
    /// Only for talking to test servers with throwaway certificates.
    pub fn danger_disable_verification(mut self) -> Self {
        self.verify_certificates = false;
        self
    }

    pub fn min_version(mut self, version: SslVersion) -> Self {
        self.min_version = Some(version);
        self
    }

    pub fn max_version(mut self, version: SslVersion) -> Self {
        self.max_version = Some(version);
        self
    }

    pub fn cipher_list(mut self, ciphers: impl Into<String>) -> Self {
        self.cipher_list = Some(ciphers.into());
        self
    }

    /// The name to present in SNI and verify against.
    pub fn effective_server_name<'a>(&'a self, url_host: &'a str) -> &'a str {
        self.server_name.as_deref().unwrap_or(url_host)
    }

    /// Apply this configuration to an SSL connector builder.
    pub fn apply_to_builder(&self, builder: &mut SslConnectorBuilder) -> Result<(), NetError> {
        if let Some(min) = self.min_version {
            builder
                .set_min_proto_version(Some(min))
                .map_err(|_| NetError::SslProtocolError)?;
        }
        if let Some(max) = self.max_version {
            builder
                .set_max_proto_version(Some(max))
                .map_err(|_| NetError::SslProtocolError)?;
        }

        if let Some(ciphers) = &self.cipher_list {
            builder
                .set_cipher_list(ciphers)
                .map_err(|_| NetError::SslProtocolError)?;
        }

        builder
            .set_alpn_protos(ALPN_HTTP_1_1)
            .map_err(|_| NetError::SslProtocolError)?;

        if let Some(path) = &self.ca_file {
            builder.set_ca_file(path).map_err(|e| {
                tracing::warn!(path = %path.display(), error = %e, "failed to load CA file");
                NetError::SslProtocolError
            })?;
        }

        if self.verify_certificates {
            builder.set_verify(SslVerifyMode::PEER);
        } else {
            tracing::warn!("TLS certificate verification disabled");
            builder.set_verify(SslVerifyMode::NONE);
        }

        Ok(())
    }

    /// Build a connector with this configuration applied.
    pub fn connector(&self) -> Result<SslConnector, NetError> {
        let mut builder =
            SslConnector::builder(SslMethod::tls()).map_err(|_| NetError::SslProtocolError)?;
        self.apply_to_builder(&mut builder)?;
        Ok(builder.build())
    }

    /// Check if SNI should be set for this host.
    /// Per RFC 6066, SNI MUST NOT be set for raw IP addresses.
    pub fn should_set_sni(host: &str) -> bool {
        host.trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<std::net::IpAddr>()
            .is_err()
    }
}

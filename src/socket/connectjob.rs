use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::dns::{resolve_host, Resolve};
use crate::socket::stream::MaybeTlsStream;
use crate::socket::tls::TlsConfig;
use crate::socket::transport::Transport;
use boring::x509::X509VerifyResult;
use std::time::Duration;
use tokio::net::TcpStream;

/// Manages the connection process: DNS -> TCP -> SSL.
/// Roughly equivalent to net::ConnectJob.
pub struct ConnectJob<'a> {
    host: &'a str,
    port: u16,
    resolver: &'a dyn Resolve,
    tls: Option<&'a TlsConfig>,
    timeout: Option<Duration>,
}

impl<'a> ConnectJob<'a> {
    pub fn new(host: &'a str, port: u16, resolver: &'a dyn Resolve) -> Self {
        Self {
            host,
            port,
            resolver,
            tls: None,
            timeout: None,
        }
    }

    /// Wrap the TCP connection in TLS with this configuration.
    pub fn tls(mut self, config: Option<&'a TlsConfig>) -> Self {
        self.tls = config;
        self
    }

    /// Upper bound on resolution, TCP connect and TLS handshake combined.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn connect(self) -> Result<Transport, NetError> {
        let host = self.host;
        let port = self.port;
        let stream = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run())
                .await
                .map_err(|_| {
                    tracing::debug!(host = %host, port, ?limit, "connect timed out");
                    NetError::ConnectionTimedOut
                })??,
            None => self.run().await?,
        };
        Ok(Transport::new(stream))
    }

    async fn run(self) -> Result<MaybeTlsStream, NetError> {
        // 1. DNS Resolution
        let addrs = resolve_host(self.resolver, self.host, self.port).await?;

        // 2. TCP Connect, first address that answers wins
        let mut last_err = None;
        let mut stream = None;
        for addr in addrs {
            tracing::trace!(%addr, "attempting TCP connect");
            match TcpStream::connect(addr).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }
        let stream = match (stream, last_err) {
            (Some(s), _) => s,
            (None, Some(e)) => return Err(e).connection_context(self.host, self.port),
            (None, None) => return Err(NetError::ConnectionFailed),
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }
        tracing::debug!(host = %self.host, port = self.port, "TCP connected");

        // 3. SSL Handshake (if wss)
        let Some(tls) = self.tls else {
            return Ok(MaybeTlsStream::Plain(stream));
        };

        let server_name = tls.effective_server_name(self.host);
        let connector = tls.connector()?;
        let mut config = connector
            .configure()
            .map_err(|_| NetError::SslProtocolError)?;
        config.set_use_server_name_indication(TlsConfig::should_set_sni(server_name));
        config.set_verify_hostname(tls.verify_certificates);

        let tls_stream = tokio_boring::connect(config, server_name, stream)
            .await
            .map_err(|e| {
                let verify = e.ssl().map(|ssl| ssl.verify_result());
                match verify {
                    Some(result) if result != X509VerifyResult::OK => {
                        tracing::debug!(host = %server_name, reason = result.error_string(), "certificate rejected");
                        NetError::CertificateInvalid {
                            host: server_name.to_string(),
                            reason: result.error_string().to_string(),
                        }
                    }
                    _ => {
                        tracing::debug!(host = %server_name, error = %e, "SSL handshake failed");
                        NetError::SslHandshakeFailed {
                            host: server_name.to_string(),
                            reason: e.to_string(),
                        }
                    }
                }
            })?;

        tracing::debug!(host = %server_name, "TLS established");
        Ok(MaybeTlsStream::Tls(tls_stream))
    }
}

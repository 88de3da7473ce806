//! Dialing secured gRPC channels.
//!
//! Credential choice:
//! - `mutual` → client certificate + key + CA, server verified
//! - CA only → one-way TLS
//! - nothing → plaintext
//!
//! Certificate files are read on every dial so rotated files are picked up
//! the next time a channel is replaced.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};

use crate::config::schema::{PoolConfig, SecurityConfig};
use crate::error::GatewayError;

/// TLS material used when dialing backends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    pub ca_path: Option<PathBuf>,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub mutual: bool,
}

impl TlsSettings {
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            ca_path: config.ca_path.clone(),
            cert_path: config.cert_path.clone(),
            key_path: config.key_path.clone(),
            mutual: config.dials_mutual_tls(),
        }
    }

    pub fn plaintext() -> Self {
        Self::default()
    }

    pub fn uses_tls(&self) -> bool {
        self.mutual || self.ca_path.is_some()
    }
}

/// Something that can open a channel to `host:port`.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Channel: Clone + Send + Sync + 'static;

    async fn dial(&self, host: &str, port: &str, tls: &TlsSettings) -> Result<Self::Channel, GatewayError>;
}

/// Dials tonic channels with keepalive and the configured credentials.
#[derive(Debug, Clone)]
pub struct GrpcDialer {
    pub connect_timeout: Duration,
    pub keepalive_interval: Duration,
    pub keepalive_timeout: Duration,
}

impl Default for GrpcDialer {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(10),
        }
    }
}

impl GrpcDialer {
    pub fn from_config(pool: &PoolConfig, connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            keepalive_interval: Duration::from_secs(pool.keepalive_interval_secs),
            keepalive_timeout: Duration::from_secs(pool.keepalive_timeout_secs),
        }
    }

    fn endpoint(&self, host: &str, port: &str, tls: &TlsSettings) -> Result<Endpoint, GatewayError> {
        let scheme = if tls.uses_tls() { "https" } else { "http" };
        let uri = format!("{scheme}://{host}:{port}");
        let endpoint = Endpoint::from_shared(uri)
            .map_err(|e| GatewayError::connection(format!("{host}:{port}"), e))?
            .connect_timeout(self.connect_timeout)
            .tcp_keepalive(Some(self.keepalive_interval))
            .http2_keep_alive_interval(self.keepalive_interval)
            .keep_alive_timeout(self.keepalive_timeout)
            .keep_alive_while_idle(true);
        Ok(endpoint)
    }
}

#[async_trait]
impl Dialer for GrpcDialer {
    type Channel = Channel;

    async fn dial(&self, host: &str, port: &str, tls: &TlsSettings) -> Result<Channel, GatewayError> {
        let addr = format!("{host}:{port}");
        let mut endpoint = self.endpoint(host, port, tls)?;

        if let Some(tls_config) = client_tls_config(host, tls).await? {
            endpoint = endpoint
                .tls_config(tls_config)
                .map_err(|e| GatewayError::connection(&addr, e))?;
        }

        endpoint
            .connect()
            .await
            .map_err(|e| GatewayError::connection(&addr, e))
    }
}

/// Build the client TLS config, or `None` for plaintext.
pub async fn client_tls_config(
    host: &str,
    tls: &TlsSettings,
) -> Result<Option<ClientTlsConfig>, GatewayError> {
    if !tls.uses_tls() {
        return Ok(None);
    }

    let mut config = ClientTlsConfig::new().domain_name(host.to_string());

    match &tls.ca_path {
        Some(ca) => {
            let pem = read_pem(host, ca).await?;
            config = config.ca_certificate(Certificate::from_pem(pem));
        }
        None if tls.mutual => {
            return Err(GatewayError::connection(host, "mutual TLS requires a CA certificate"));
        }
        None => {}
    }

    if tls.mutual {
        let (Some(cert_path), Some(key_path)) = (&tls.cert_path, &tls.key_path) else {
            return Err(GatewayError::connection(host, "mutual TLS requires a client certificate and key"));
        };
        let cert = read_pem(host, cert_path).await?;
        let key = read_pem(host, key_path).await?;
        config = config.identity(Identity::from_pem(cert, key));
    }

    Ok(Some(config))
}

async fn read_pem(host: &str, path: &Path) -> Result<Vec<u8>, GatewayError> {
    tokio::fs::read(path).await.map_err(|e| {
        GatewayError::connection(host, format!("reading {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mtls_mode_implies_mutual_dialing() {
        let config = SecurityConfig {
            mode: Some("mtls".into()),
            ca_path: Some("ca.pem".into()),
            cert_path: Some("client.pem".into()),
            key_path: Some("client.key".into()),
            ..Default::default()
        };
        let tls = TlsSettings::from_config(&config);
        assert!(tls.mutual);
        assert!(tls.uses_tls());

        let sign_mode = SecurityConfig {
            mode: Some("sign".into()),
            ..Default::default()
        };
        assert!(!TlsSettings::from_config(&sign_mode).uses_tls());
    }

    #[tokio::test]
    async fn plaintext_needs_no_tls_config() {
        assert!(client_tls_config("reports", &TlsSettings::plaintext())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn mutual_without_ca_is_rejected() {
        let tls = TlsSettings {
            mutual: true,
            ..Default::default()
        };
        let err = client_tls_config("reports", &tls).await.unwrap_err();
        assert_eq!(err.code(), "connection_failed");
    }

    #[tokio::test]
    async fn missing_ca_file_fails_the_dial() {
        let dir = tempfile::tempdir().unwrap();
        let tls = TlsSettings {
            ca_path: Some(dir.path().join("missing-ca.pem")),
            ..Default::default()
        };
        let err = client_tls_config("reports", &tls).await.unwrap_err();
        assert!(err.to_string().contains("missing-ca.pem"));
    }

    #[tokio::test]
    async fn one_way_tls_reads_ca() {
        let dir = tempfile::tempdir().unwrap();
        let ca = dir.path().join("ca.pem");
        std::fs::write(&ca, b"-----BEGIN CERTIFICATE-----\n-----END CERTIFICATE-----\n").unwrap();
        let tls = TlsSettings {
            ca_path: Some(ca),
            ..Default::default()
        };
        assert!(client_tls_config("reports", &tls).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn refused_connection_is_a_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let dialer = GrpcDialer {
            connect_timeout: Duration::from_millis(500),
            ..Default::default()
        };
        let err = dialer
            .dial("127.0.0.1", &port.to_string(), &TlsSettings::plaintext())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Connection { .. }));
    }
}

//! Inbound TLS: certificate loading and client-certificate capture.
//!
//! With a client CA configured the listener requires and verifies client
//! certificates. [`PeerIdentityAcceptor`] runs after the handshake and
//! attaches a [`PeerIdentity`] to every request on that connection, which the
//! `mtls` gate mode checks.

use std::io::{self, BufReader};
use std::path::Path;
use std::sync::Arc;

use axum_server::accept::Accept;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use futures_util::future::BoxFuture;
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;
use tower_http::add_extension::AddExtension;

use crate::config::schema::TlsConfig;

/// Verified client certificate chain, as seen by the TLS listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerIdentity {
    /// Length of the verified chain; zero means no client certificate.
    pub certificates: usize,
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

fn ensure_exists(path: &Path, what: &str) -> io::Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{what} not found: {}", path.display()),
        ))
    }
}

/// Load the listener's TLS configuration.
pub async fn load_tls_config(config: &TlsConfig) -> io::Result<RustlsConfig> {
    let cert_path = Path::new(&config.cert_path);
    let key_path = Path::new(&config.key_path);
    ensure_exists(cert_path, "certificate file")?;
    ensure_exists(key_path, "private key file")?;

    let Some(ca_path) = config.client_ca_path.as_deref().map(Path::new) else {
        return RustlsConfig::from_pem_file(cert_path, key_path).await;
    };
    ensure_exists(ca_path, "client CA file")?;

    let cert_pem = tokio::fs::read(cert_path).await?;
    let key_pem = tokio::fs::read(key_path).await?;
    let ca_pem = tokio::fs::read(ca_path).await?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_pem.as_slice()))
        .collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_pem.as_slice()))?
        .ok_or_else(|| invalid(format!("no private key in {}", key_path.display())))?;

    let mut roots = RootCertStore::empty();
    for ca in rustls_pemfile::certs(&mut BufReader::new(ca_pem.as_slice())) {
        roots.add(ca?).map_err(|e| invalid(e.to_string()))?;
    }

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| invalid(e.to_string()))?;
    let mut server_config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| invalid(e.to_string()))?;
    server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    tracing::info!(client_ca = %ca_path.display(), "listener requires client certificates");
    Ok(RustlsConfig::from_config(Arc::new(server_config)))
}

/// TLS acceptor that records the peer's certificate chain on each request.
#[derive(Clone)]
pub struct PeerIdentityAcceptor {
    inner: RustlsAcceptor,
}

impl PeerIdentityAcceptor {
    pub fn new(config: RustlsConfig) -> Self {
        Self {
            inner: RustlsAcceptor::new(config),
        }
    }
}

impl<I, S> Accept<I, S> for PeerIdentityAcceptor
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: Send + 'static,
{
    type Stream = TlsStream<I>;
    type Service = AddExtension<S, PeerIdentity>;
    type Future = BoxFuture<'static, io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let acceptor = self.inner.clone();
        Box::pin(async move {
            let (stream, service) = acceptor.accept(stream, service).await?;
            let certificates = stream
                .get_ref()
                .1
                .peer_certificates()
                .map_or(0, |chain| chain.len());
            Ok((stream, AddExtension::new(service, PeerIdentity { certificates })))
        })
    }
}

//! Opening the byte stream a session runs over.
//!
//! The session does not care whether bytes travel over plain TCP, TLS, or an
//! in-memory pipe; it asks a [`Connector`] for a boxed stream.
//! [`SocketConnector`] is the production implementation:
//!
//! - `ClientConfig::tls == None` → `tokio::net::TcpStream`
//! - `ClientConfig::tls == Some(_)` → the same TCP stream wrapped by
//!   `tokio-rustls`, verified against the configured CA file or the bundled
//!   web PKI roots.

use std::sync::Arc;

use async_trait::async_trait;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::RootCertStore;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::domain::{ClientConfig, TlsOptions};
use crate::error::ClientError;

/// Any bidirectional byte stream a session can own.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// A type-erased stream.
pub type BoxedStream = Box<dyn AsyncStream>;

/// Opens the transport for a session.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a stream to the device described by `config`.
    async fn connect(&self, config: &ClientConfig) -> Result<BoxedStream, ClientError>;
}

/// Connects with TCP, adding TLS when the configuration asks for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketConnector;

#[async_trait]
impl Connector for SocketConnector {
    async fn connect(&self, config: &ClientConfig) -> Result<BoxedStream, ClientError> {
        let addr = config.address();
        let tcp = TcpStream::connect((config.host.as_str(), config.effective_port()))
            .await
            .map_err(|source| ClientError::ConnectFailed {
                addr: addr.clone(),
                source,
            })?;
        if let Err(e) = tcp.set_nodelay(true) {
            warn!("could not disable Nagle on {addr}: {e}");
        }

        let Some(options) = &config.tls else {
            debug!("plain TCP connection to {addr} established");
            return Ok(Box::new(tcp));
        };

        let name = options
            .server_name
            .clone()
            .unwrap_or_else(|| config.host.clone());
        let server_name = ServerName::try_from(name)
            .map_err(|e| ClientError::Tls(format!("invalid server name: {e}")))?;
        let stream = tls_connector(options)?
            .connect(server_name, tcp)
            .await
            .map_err(|e| ClientError::Tls(format!("TLS handshake with {addr} failed: {e}")))?;
        debug!("TLS connection to {addr} established");
        Ok(Box::new(stream))
    }
}

/// Builds a rustls connector trusting either the configured CA file or the
/// web PKI roots.
fn tls_connector(options: &TlsOptions) -> Result<TlsConnector, ClientError> {
    let mut roots = RootCertStore::empty();
    match &options.ca_file {
        Some(path) => {
            let certs = CertificateDer::pem_file_iter(path).map_err(|e| {
                ClientError::Tls(format!("cannot read CA file {}: {e}", path.display()))
            })?;
            for cert in certs {
                let cert = cert.map_err(|e| {
                    ClientError::Tls(format!("bad certificate in {}: {e}", path.display()))
                })?;
                roots
                    .add(cert)
                    .map_err(|e| ClientError::Tls(format!("unusable CA certificate: {e}")))?;
            }
            if roots.is_empty() {
                return Err(ClientError::Tls(format!(
                    "no certificates found in {}",
                    path.display()
                )));
            }
        }
        None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

//! TLS utilities for loading the server certificate and building the
//! listener's rustls configuration.

use std::path::PathBuf;
use std::sync::Arc;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use tokio::fs;
use tokio_rustls::TlsAcceptor;

use crate::config::TlsConfig;

/// Error type for TLS configuration issues.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Server certificate path not configured")]
    MissingCert,

    #[error("Private key path not configured")]
    MissingKey,

    #[error("Server certificate not found: {0}")]
    CertNotFound(PathBuf),

    #[error("Private key not found: {0}")]
    KeyNotFound(PathBuf),

    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid certificate: {0}")]
    Certificate(String),

    #[error("Invalid private key: {0}")]
    PrivateKey(String),

    #[error("TLS configuration error: {0}")]
    Config(#[from] rustls::Error),
}

/// Loaded server TLS material, restricted to TLS 1.3.
#[derive(Clone)]
pub struct TlsIdentity {
    server_config: Arc<ServerConfig>,
}

impl TlsIdentity {
    /// Load the certificate chain and private key from the paths in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Either path is not configured
    /// - Either file does not exist or cannot be read
    /// - The PEM contents are not a usable certificate/key pair
    pub async fn load(config: &TlsConfig) -> Result<Self, TlsError> {
        let cert_path = config.cert_path.as_ref().ok_or(TlsError::MissingCert)?;
        let key_path = config.key_path.as_ref().ok_or(TlsError::MissingKey)?;

        // Validate paths exist before reading
        if !cert_path.exists() {
            return Err(TlsError::CertNotFound(cert_path.clone()));
        }
        if !key_path.exists() {
            return Err(TlsError::KeyNotFound(key_path.clone()));
        }

        let cert_pem = fs::read(cert_path).await?;
        let key_pem = fs::read(key_path).await?;

        Self::from_pem(&cert_pem, &key_pem)
    }

    /// Build the server configuration from PEM-encoded material.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, TlsError> {
        let certs = CertificateDer::pem_slice_iter(cert_pem)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TlsError::Certificate(format!("failed to parse certificates: {e}")))?;
        if certs.is_empty() {
            return Err(TlsError::Certificate("no certificates found".into()));
        }

        let key = PrivateKeyDer::from_pem_slice(key_pem)
            .map_err(|e| TlsError::PrivateKey(format!("failed to parse private key: {e}")))?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut server_config = ServerConfig::builder_with_provider(provider)
            .with_protocol_versions(&[&rustls::version::TLS13])?
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        Ok(Self {
            server_config: Arc::new(server_config),
        })
    }

    /// Acceptor that performs the TLS handshake on accepted connections.
    pub fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(self.server_config.clone())
    }
}

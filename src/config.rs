use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8443";

/// Whether output can be read before a job has finished.
///
/// Fixed for the lifetime of a manager so every caller sees the same rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputPolicy {
    /// Return whatever has been captured so far, including from running jobs.
    #[default]
    Partial,
    /// Refuse with `JobNotCompleted` until the job is in a terminal state.
    RequireCompletion,
}

/// Tunables for the job manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub output_policy: OutputPolicy,
    /// How long finalize waits for the output pipes to close after the
    /// process has exited.
    pub output_drain_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            output_policy: OutputPolicy::Partial,
            output_drain_timeout: Duration::from_secs(2),
        }
    }
}

impl ManagerConfig {
    pub fn with_output_policy(mut self, policy: OutputPolicy) -> Self {
        self.output_policy = policy;
        self
    }
}

/// TLS configuration for the API listener.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Path to the server certificate chain (PEM format).
    pub cert_path: Option<PathBuf>,

    /// Path to the server private key (PEM format).
    /// Must match the certificate.
    pub key_path: Option<PathBuf>,

    /// Serve plain HTTP when the certificate or key is missing instead of
    /// refusing to start. For development only.
    pub allow_insecure: bool,
}

impl TlsConfig {
    /// Check if both the certificate and the key are configured.
    pub fn is_complete(&self) -> bool {
        self.cert_path.is_some() && self.key_path.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen_addr: SocketAddr,
    pub tls: TlsConfig,
    /// JSON token table; built-in development tokens are used when unset.
    pub tokens_path: Option<PathBuf>,
    pub manager: ManagerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: DEFAULT_LISTEN_ADDR
                .parse()
                .expect("default listen address is valid"),
            tls: TlsConfig::default(),
            tokens_path: None,
            manager: ManagerConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_tls(mut self, cert_path: PathBuf, key_path: PathBuf) -> Self {
        self.tls.cert_path = Some(cert_path);
        self.tls.key_path = Some(key_path);
        self
    }
}

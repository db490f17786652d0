//! TLS plumbing for both sides of the proxy
//!
//! - client-facing termination: [`Certificate::load`] + [`build_acceptor`]
//! - target-facing origination: [`insecure_connector`] + [`server_name`]

pub mod acceptor;
pub mod connector;
pub mod pem;

pub use acceptor::build_acceptor;
pub use connector::{insecure_connector, server_name, SkipVerification};
pub use pem::{load_certs, load_private_key, Certificate};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("Failed to open {kind} file {path}: {reason}")]
    Open {
        kind: &'static str,
        path: String,
        reason: String,
    },

    #[error("Failed to parse {kind} file {path}: {reason}")]
    Parse {
        kind: &'static str,
        path: String,
        reason: String,
    },

    #[error("No certificate found in {0}")]
    NoCertificate(String),

    #[error("No private key found in {0}")]
    NoPrivateKey(String),

    #[error("Invalid cert/key: {0}")]
    InvalidCertificate(#[from] rustls::Error),

    #[error("Invalid server name: {0}")]
    InvalidServerName(String),
}

static CRYPTO_PROVIDER_INIT: std::sync::Once = std::sync::Once::new();

/// Install the ring crypto provider as process default (idempotent)
pub fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            tracing::debug!("Rustls crypto provider already installed");
        }
    });
}

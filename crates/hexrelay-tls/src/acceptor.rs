//! Client-facing TLS termination

use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

use crate::{ensure_crypto_provider, Certificate, TlsError};

/// Build a TLS acceptor serving `cert` to every client (no client auth)
pub fn build_acceptor(cert: Certificate) -> Result<TlsAcceptor, TlsError> {
    ensure_crypto_provider();

    let server_crypto = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert.cert_chain, cert.private_key)?;

    Ok(TlsAcceptor::from(Arc::new(server_crypto)))
}

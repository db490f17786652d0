//! PEM certificate/key loading

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::TlsError;

/// Certificate chain with its private key
#[derive(Debug)]
pub struct Certificate {
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub private_key: PrivateKeyDer<'static>,
}

impl Certificate {
    pub fn new(
        cert_chain: Vec<CertificateDer<'static>>,
        private_key: PrivateKeyDer<'static>,
    ) -> Self {
        Self {
            cert_chain,
            private_key,
        }
    }

    /// Load a PEM certificate chain and a PEM private key (PKCS#8, PKCS#1 or SEC1)
    pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self, TlsError> {
        let cert_chain = load_certs(cert_path)?;
        let private_key = load_private_key(key_path)?;
        Ok(Self::new(cert_chain, private_key))
    }
}

pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path, "certificate")?;

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::Parse {
            kind: "certificate",
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificate(path.display().to_string()));
    }
    Ok(certs)
}

pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path, "key")?;

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TlsError::Parse {
            kind: "key",
            path: path.display().to_string(),
            reason: e.to_string(),
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.display().to_string()))
}

fn open(path: &Path, kind: &'static str) -> Result<BufReader<File>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::Open {
        kind,
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(BufReader::new(file))
}

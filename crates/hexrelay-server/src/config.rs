//! Proxy configuration
//!
//! Built once at startup and shared read-only by every session.

use hexrelay_relay::RelaySettings;
use hexrelay_tls::{insecure_connector, server_name, TlsError};
use rustls::pki_types::ServerName;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// Host used for a listen address given as a bare `:port`
const ANY_HOST: &str = "0.0.0.0";

/// Host used for a target address given as a bare `:port`
const LOCAL_HOST: &str = "127.0.0.1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Address {0} did not resolve to any socket address")]
    Unresolved(String),

    #[error("Certificate and key file required")]
    IncompleteTlsMaterial,

    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),
}

/// TLS settings for the target leg
#[derive(Clone)]
pub struct TargetTls {
    pub connector: TlsConnector,
    pub server_name: ServerName<'static>,
}

impl TargetTls {
    /// Originate TLS to `host` without verifying its certificate
    pub fn insecure(host: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            connector: insecure_connector(),
            server_name: server_name(host)?,
        })
    }
}

impl std::fmt::Debug for TargetTls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetTls")
            .field("server_name", &self.server_name)
            .finish()
    }
}

pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    pub target_addr: SocketAddr,
    /// Originate TLS toward the target
    pub target_tls: Option<TargetTls>,
    /// Terminate TLS from clients
    pub client_tls: Option<TlsAcceptor>,
    pub relay: RelaySettings,
}

impl ProxyConfig {
    pub fn new(listen_addr: SocketAddr, target_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            target_addr,
            target_tls: None,
            client_tls: None,
            relay: RelaySettings::default(),
        }
    }

    pub fn with_target_tls(mut self, tls: TargetTls) -> Self {
        self.target_tls = Some(tls);
        self
    }

    pub fn with_client_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.client_tls = Some(acceptor);
        self
    }

    pub fn with_relay_settings(mut self, settings: RelaySettings) -> Self {
        self.relay = settings;
        self
    }

    /// Close sessions after `secs` seconds without traffic; `0` disables it
    pub fn with_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.relay.idle_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("listen_addr", &self.listen_addr)
            .field("target_addr", &self.target_addr)
            .field("target_tls", &self.target_tls)
            .field("client_tls", &self.client_tls.is_some())
            .field("relay", &self.relay)
            .finish()
    }
}

/// Resolve a listen address; `:port` binds every interface
pub async fn resolve_listen_addr(address: &str) -> Result<SocketAddr, ConfigError> {
    let (host, port) = split_host_port(address)?;
    let host = if host.is_empty() { ANY_HOST } else { host };
    lookup(address, host, port).await
}

/// Resolve a target address; `:port` means the local host.
///
/// Returns the first resolved address and the host name (for SNI).
pub async fn resolve_target(address: &str) -> Result<(SocketAddr, String), ConfigError> {
    let (host, port) = split_host_port(address)?;
    let host = if host.is_empty() { LOCAL_HOST } else { host };
    let addr = lookup(address, host, port).await?;
    Ok((addr, host.to_string()))
}

fn split_host_port(address: &str) -> Result<(&str, u16), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| invalid("missing port"))?;
    let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;

    let host = match host.strip_prefix('[') {
        Some(rest) => rest
            .strip_suffix(']')
            .ok_or_else(|| invalid("unterminated IPv6 literal"))?,
        None if host.contains(':') => return Err(invalid("IPv6 literals need brackets")),
        None => host,
    };

    Ok((host, port))
}

async fn lookup(address: &str, host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ConfigError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })?
        .next()
        .ok_or_else(|| ConfigError::Unresolved(address.to_string()))
}

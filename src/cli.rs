//! Command-line surface and startup configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hexrelay_capture::{CaptureSink, ConsoleSink, TracingSink};
use hexrelay_relay::RelaySettings;
use hexrelay_server::{
    resolve_listen_addr, resolve_target, ConfigError, ProxyConfig, TargetTls,
};
use hexrelay_tls::{build_acceptor, Certificate};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Hexrelay - TCP/TLS interception proxy with hex dump capture
#[derive(Parser, Debug)]
#[command(name = "hexrelay")]
#[command(about = "Relay TCP (or TLS) connections to a target and hex dump the traffic")]
#[command(disable_version_flag = true)]
#[command(long_about = r#"
Accept connections on a local address, relay each one to a target address and
print every burst of traffic as a timestamped hex dump.

EXAMPLES:
  # Watch plain HTTP traffic to a local server
  hexrelay -l :4444 -r :8080

  # Terminate TLS from clients and re-encrypt toward the target
  hexrelay -l :8443 -r example.com:443 -c proxy.crt -k proxy.key -t

ENVIRONMENT VARIABLES:
  HEXRELAY_LADDR    Listen address
  HEXRELAY_RADDR    Target address
  HEXRELAY_LCERT    Client-facing certificate (PEM)
  HEXRELAY_LKEY     Client-facing private key (PEM)
    "#)]
pub struct Cli {
    /// Local address to listen on (`:port` listens on every interface)
    #[arg(short = 'l', long = "laddr", env = "HEXRELAY_LADDR", default_value = ":4444")]
    pub laddr: String,

    /// Target address to relay to (`:port` means the local host)
    #[arg(short = 'r', long = "raddr", env = "HEXRELAY_RADDR", default_value = ":80")]
    pub raddr: String,

    /// Certificate (PEM) presented to clients; enables TLS on the listener
    #[arg(short = 'c', long = "lcert", env = "HEXRELAY_LCERT")]
    pub lcert: Option<PathBuf>,

    /// Private key (PEM) for the client-facing certificate
    #[arg(short = 'k', long = "lkey", env = "HEXRELAY_LKEY")]
    pub lkey: Option<PathBuf>,

    /// Speak TLS to the target (certificate is NOT verified)
    #[arg(short = 't', long = "rtls")]
    pub rtls: bool,

    /// Close sessions idle for this many seconds (0 = never)
    #[arg(short = 'u', long = "timeout", default_value = "0")]
    pub timeout: u64,

    /// Flush buffered traffic after this many idle milliseconds
    #[arg(long, default_value = "500", value_parser = clap::value_parser!(u64).range(1..))]
    pub flush_interval_ms: u64,

    /// Where hex dumps go
    #[arg(long, value_enum, default_value_t = CaptureOutput::Stdout)]
    pub capture_output: CaptureOutput,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Print version information
    #[arg(short = 'v', long = "version")]
    pub version: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Print version information
    Version,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutput {
    /// Plain hex dumps on stdout
    Stdout,
    /// Hex dumps as log events
    Log,
}

impl Cli {
    pub fn wants_version(&self) -> bool {
        self.version || self.command == Some(Commands::Version)
    }

    /// Certificate and key paths, when client-facing TLS is requested
    pub fn tls_material(&self) -> Result<Option<(&Path, &Path)>, ConfigError> {
        match (&self.lcert, &self.lkey) {
            (None, None) => Ok(None),
            (Some(cert), Some(key)) => Ok(Some((cert.as_path(), key.as_path()))),
            _ => Err(ConfigError::IncompleteTlsMaterial),
        }
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            ..RelaySettings::default()
        }
    }

    /// Resolve addresses and load TLS material
    pub async fn build_config(&self) -> Result<ProxyConfig> {
        let listen_addr = resolve_listen_addr(&self.laddr)
            .await
            .context("Invalid listen address")?;
        let (target_addr, target_host) = resolve_target(&self.raddr)
            .await
            .context("Invalid target address")?;

        let mut config = ProxyConfig::new(listen_addr, target_addr)
            .with_relay_settings(self.relay_settings())
            .with_idle_timeout_secs(self.timeout);

        if let Some((cert_path, key_path)) = self.tls_material()? {
            let cert = Certificate::load(cert_path, key_path)
                .context("Failed to load client-facing certificate")?;
            let acceptor = build_acceptor(cert).context("Failed to configure TLS listener")?;
            info!("TLS termination enabled ({})", cert_path.display());
            config = config.with_client_tls(acceptor);
        }

        if self.rtls {
            warn!("⚠️  Target certificate verification disabled");
            config = config.with_target_tls(
                TargetTls::insecure(&target_host).context("Invalid target host for TLS")?,
            );
        }

        Ok(config)
    }

    pub fn capture_sink(&self) -> Arc<dyn CaptureSink> {
        match self.capture_output {
            CaptureOutput::Stdout => Arc::new(ConsoleSink::stdout()),
            CaptureOutput::Log => Arc::new(TracingSink),
        }
    }
}

/// `hexrelay <version> (<git hash>) <os>/<arch> <build time>`
pub fn version_string() -> String {
    format!(
        "hexrelay {} ({}) {}/{} {}",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        std::env::consts::OS,
        std::env::consts::ARCH,
        env!("BUILD_TIME")
    )
}

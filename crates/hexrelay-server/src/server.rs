//! Listener front-end
//!
//! Binds the configured address and spawns one independent handler task per
//! accepted connection. A failed accept (or a failed client TLS handshake) is
//! logged and the loop keeps going.

use hexrelay_capture::{CaptureSink, LifecycleEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

use crate::config::ProxyConfig;
use crate::handler::ConnectionHandler;

#[derive(Debug, Error)]
pub enum ProxyServerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to bind to {address}: {reason}\n\nTroubleshooting:\n  • Check if another process is using this port: lsof -i :{port}\n  • Try using a different address or port")]
    BindError {
        address: String,
        port: u16,
        reason: String,
    },

    #[error("Failed to connect to target {target}: {reason}")]
    Dial { target: SocketAddr, reason: String },

    #[error("TLS handshake with target {target} failed: {reason}")]
    TargetHandshake { target: SocketAddr, reason: String },

    #[error("TLS handshake with client {peer} failed: {reason}")]
    ClientHandshake { peer: SocketAddr, reason: String },
}

pub struct ProxyServer {
    listener: TcpListener,
    config: Arc<ProxyConfig>,
    sink: Arc<dyn CaptureSink>,
}

impl ProxyServer {
    /// Bind the listen address from `config`
    pub async fn bind(
        config: ProxyConfig,
        sink: Arc<dyn CaptureSink>,
    ) -> Result<Self, ProxyServerError> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|e| ProxyServerError::BindError {
                address: config.listen_addr.ip().to_string(),
                port: config.listen_addr.port(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            listener,
            config: Arc::new(config),
            sink,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ProxyServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Accept connections forever
    pub async fn run(self) -> Result<(), ProxyServerError> {
        let local_addr = self.local_addr()?;
        info!(
            "Proxy listening on {} ({}), target {}{}",
            local_addr,
            if self.config.client_tls.is_some() {
                "TLS"
            } else {
                "plain TCP"
            },
            self.config.target_addr,
            if self.config.target_tls.is_some() {
                " over TLS"
            } else {
                ""
            }
        );

        let handler = Arc::new(ConnectionHandler::new(
            self.config.clone(),
            self.sink.clone(),
        ));

        loop {
            match self.listener.accept().await {
                Ok((socket, peer_addr)) => {
                    debug!("Accepted TCP connection from {}", peer_addr);
                    self.sink
                        .on_lifecycle(&LifecycleEvent::Accepted { client: peer_addr });

                    let handler = handler.clone();
                    let acceptor = self.config.client_tls.clone();

                    tokio::spawn(async move {
                        if let Err(e) =
                            Self::handle_client(handler, acceptor, socket, peer_addr).await
                        {
                            error!("Error handling connection from {}: {}", peer_addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    async fn handle_client(
        handler: Arc<ConnectionHandler>,
        acceptor: Option<TlsAcceptor>,
        socket: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), ProxyServerError> {
        if let Err(e) = socket.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
        }

        match acceptor {
            Some(acceptor) => {
                let tls = acceptor.accept(socket).await.map_err(|e| {
                    ProxyServerError::ClientHandshake {
                        peer: peer_addr,
                        reason: e.to_string(),
                    }
                })?;
                handler.handle(tls, peer_addr).await?;
            }
            None => {
                handler.handle(socket, peer_addr).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexrelay_capture::MemorySink;
    use std::io;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    #[derive(Clone, Default)]
    struct LogBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuf {
        fn count(&self, needle: &str) -> usize {
            String::from_utf8_lossy(&self.0.lock().unwrap()).matches(needle).count()
        }
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let config = ProxyConfig::new(
            "127.0.0.1:0".parse().unwrap(),
            "127.0.0.1:80".parse().unwrap(),
        );
        let server = ProxyServer::bind(config, Arc::new(MemorySink::new()))
            .await
            .unwrap();

        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.config().target_addr.port(), 80);
    }

    #[tokio::test]
    async fn test_dial_failure_is_logged_once() {
        let logs = LogBuf::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        // current-thread runtime: spawned connection tasks log through this too
        let _guard = tracing::subscriber::set_default(subscriber);

        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target_addr = unused.local_addr().unwrap();
        drop(unused);

        let config = ProxyConfig::new("127.0.0.1:0".parse().unwrap(), target_addr);
        let server = ProxyServer::bind(config, Arc::new(MemorySink::new()))
            .await
            .unwrap();
        let proxy_addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let mut client = TcpStream::connect(proxy_addr).await.unwrap();
        let mut buf = Vec::new();
        let _ = client.read_to_end(&mut buf).await;

        let needle = format!("Failed to connect to target {}", target_addr);
        tokio::time::timeout(Duration::from_secs(5), async {
            while logs.count(&needle) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("dial failure was never logged");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(logs.count(&needle), 1);
        assert_eq!(logs.count(" WARN "), 0);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ProxyConfig::new(
            taken.local_addr().unwrap(),
            "127.0.0.1:80".parse().unwrap(),
        );

        let err = ProxyServer::bind(config, Arc::new(MemorySink::new()))
            .await
            .err()
            .expect("port is already taken");

        match err {
            ProxyServerError::BindError { address, port, .. } => {
                assert_eq!(address, "127.0.0.1");
                assert_eq!(port, taken.local_addr().unwrap().port());
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}

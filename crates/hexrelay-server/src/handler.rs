//! Per-connection handler: dial the target, then relay

use hexrelay_capture::{CaptureSink, LifecycleEvent};
use hexrelay_relay::{BoxedStream, ProxyStream, Session, SessionOutcome};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::ProxyConfig;
use crate::server::ProxyServerError;

pub struct ConnectionHandler {
    config: Arc<ProxyConfig>,
    sink: Arc<dyn CaptureSink>,
}

impl ConnectionHandler {
    pub fn new(config: Arc<ProxyConfig>, sink: Arc<dyn CaptureSink>) -> Self {
        Self { config, sink }
    }

    /// Dial the target for `client` and relay until the session ends.
    ///
    /// When the target cannot be reached the client connection is dropped
    /// (closed) and no session is created. The error is returned for the
    /// caller to report.
    pub async fn handle<S>(
        &self,
        client: S,
        client_addr: SocketAddr,
    ) -> Result<SessionOutcome, ProxyServerError>
    where
        S: ProxyStream,
    {
        let (target, target_addr) = match self.dial_target().await {
            Ok(dialed) => dialed,
            Err(e) => {
                self.sink.on_lifecycle(&LifecycleEvent::DialFailed {
                    client: client_addr,
                    target: self.config.target_addr,
                    reason: e.to_string(),
                });
                drop(client);
                return Err(e);
            }
        };

        self.sink.on_lifecycle(&LifecycleEvent::Dialed {
            client: client_addr,
            target: target_addr,
        });

        let outcome = Session::new(client, client_addr, target, target_addr, self.sink.clone())
            .with_settings(self.config.relay)
            .run()
            .await;

        debug!(
            "Session {} <-> {} closed ({}, {} records)",
            client_addr, target_addr, outcome.reason, outcome.records
        );
        Ok(outcome)
    }

    async fn dial_target(&self) -> Result<(BoxedStream, SocketAddr), ProxyServerError> {
        let target = self.config.target_addr;

        let socket = TcpStream::connect(target)
            .await
            .map_err(|e| ProxyServerError::Dial {
                target,
                reason: e.to_string(),
            })?;
        if let Err(e) = socket.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY toward {}: {}", target, e);
        }
        let target_addr = socket.peer_addr().unwrap_or(target);

        match &self.config.target_tls {
            None => {
                let stream: BoxedStream = Box::new(socket);
                Ok((stream, target_addr))
            }
            Some(tls) => {
                let stream = tls
                    .connector
                    .connect(tls.server_name.clone(), socket)
                    .await
                    .map_err(|e| ProxyServerError::TargetHandshake {
                        target,
                        reason: e.to_string(),
                    })?;
                debug!("TLS established with target {}", target_addr);
                let stream: BoxedStream = Box::new(stream);
                Ok((stream, target_addr))
            }
        }
    }
}

//! Relay loop for one client/target pair
//!
//! The loop waits on three things at once: a chunk from the client reader, a
//! chunk from the target reader, and the flush timer. Chunks are forwarded to
//! the opposite leg as soon as they arrive and recorded in the capture buffer.
//! The first terminal marker (or failed forward) ends the session: pending
//! capture is flushed, both legs are shut down together and whatever the other
//! reader still has in flight is discarded.

use chrono::Local;
use hexrelay_capture::{CaptureBuffer, CaptureSink, Direction, LifecycleEvent};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::reader::{ReadEvent, StreamReader};
use crate::ProxyStream;

/// Flush a pending burst after this much silence
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// How long to keep discarding in-flight chunks once a session is closing
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_millis(5);

/// Upper bound for a graceful shutdown (TLS close_notify, FIN) of one leg
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Timing knobs of the relay loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    pub flush_interval: Duration,
    pub close_grace: Duration,
    pub shutdown_timeout: Duration,
    /// Close the session after this long without any chunk. `None` never closes.
    pub idle_timeout: Option<Duration>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            close_grace: DEFAULT_CLOSE_GRACE,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            idle_timeout: None,
        }
    }
}

/// Why a session left the running state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientClosed,
    TargetClosed,
    /// Forwarding a chunk to the client failed
    ClientWriteFailed,
    /// Forwarding a chunk to the target failed
    TargetWriteFailed,
    IdleTimeout,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CloseReason::ClientClosed => "client closed",
            CloseReason::TargetClosed => "target closed",
            CloseReason::ClientWriteFailed => "write to client failed",
            CloseReason::TargetWriteFailed => "write to target failed",
            CloseReason::IdleTimeout => "idle timeout",
        };
        f.write_str(reason)
    }
}

/// Summary of a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub reason: CloseReason,
    pub client_to_target: u64,
    pub target_to_client: u64,
    /// Flush records emitted over the session lifetime
    pub records: usize,
}

/// One proxied TCP flow. Owns both legs until [`Session::run`] returns.
pub struct Session<C, T> {
    client: C,
    client_addr: SocketAddr,
    target: T,
    target_addr: SocketAddr,
    settings: RelaySettings,
    sink: Arc<dyn CaptureSink>,
}

impl<C, T> Session<C, T>
where
    C: ProxyStream,
    T: ProxyStream,
{
    pub fn new(
        client: C,
        client_addr: SocketAddr,
        target: T,
        target_addr: SocketAddr,
        sink: Arc<dyn CaptureSink>,
    ) -> Self {
        Self {
            client,
            client_addr,
            target,
            target_addr,
            settings: RelaySettings::default(),
            sink,
        }
    }

    pub fn with_settings(mut self, settings: RelaySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Relay until either leg ends, then close both legs
    pub async fn run(self) -> SessionOutcome {
        let Session {
            client,
            client_addr,
            target,
            target_addr,
            settings,
            sink,
        } = self;

        let (client_read, mut client_write) = tokio::io::split(client);
        let (target_read, mut target_write) = tokio::io::split(target);
        let mut client_reader = StreamReader::spawn(client_read, client_addr);
        let mut target_reader = StreamReader::spawn(target_read, target_addr);

        let mut capture = Capture {
            buffer: CaptureBuffer::new(client_addr, target_addr),
            sink: sink.as_ref(),
            records: 0,
            client_to_target: 0,
            target_to_client: 0,
        };
        let mut last_activity = Instant::now();

        debug!("Relaying {} <-> {}", client_addr, target_addr);

        let reason = loop {
            tokio::select! {
                event = client_reader.next() => match event {
                    ReadEvent::Chunk(chunk) => {
                        last_activity = Instant::now();
                        capture.observe(Direction::ClientToTarget, &chunk);
                        if let Err(e) = forward(&mut target_write, &chunk).await {
                            warn!("Failed to forward {} bytes to {}: {}", chunk.len(), target_addr, e);
                            break CloseReason::TargetWriteFailed;
                        }
                    }
                    ReadEvent::Closed => break CloseReason::ClientClosed,
                },
                event = target_reader.next() => match event {
                    ReadEvent::Chunk(chunk) => {
                        last_activity = Instant::now();
                        capture.observe(Direction::TargetToClient, &chunk);
                        if let Err(e) = forward(&mut client_write, &chunk).await {
                            warn!("Failed to forward {} bytes to {}: {}", chunk.len(), client_addr, e);
                            break CloseReason::ClientWriteFailed;
                        }
                    }
                    ReadEvent::Closed => break CloseReason::TargetClosed,
                },
                _ = tokio::time::sleep(settings.flush_interval) => {
                    capture.idle_flush();
                    if settings
                        .idle_timeout
                        .is_some_and(|timeout| last_activity.elapsed() >= timeout)
                    {
                        break CloseReason::IdleTimeout;
                    }
                }
            }
        };

        debug!(
            "Closing session {} <-> {}: {}",
            client_addr, target_addr, reason
        );

        capture.idle_flush();

        close_leg(&mut client_write, client_addr, settings.shutdown_timeout).await;
        sink.on_lifecycle(&LifecycleEvent::Closed { peer: client_addr });
        close_leg(&mut target_write, target_addr, settings.shutdown_timeout).await;
        sink.on_lifecycle(&LifecycleEvent::Closed { peer: target_addr });

        let (late_client, late_target) = tokio::join!(
            client_reader.drain(settings.close_grace),
            target_reader.drain(settings.close_grace)
        );
        if late_client + late_target > 0 {
            debug!(
                "Discarded {} late bytes from {} and {} from {}",
                late_client, client_addr, late_target, target_addr
            );
        }
        client_reader.stop().await;
        target_reader.stop().await;
        drop(client_write);
        drop(target_write);

        let outcome = SessionOutcome {
            reason,
            client_to_target: capture.client_to_target,
            target_to_client: capture.target_to_client,
            records: capture.records,
        };

        sink.on_lifecycle(&LifecycleEvent::SessionEnded {
            client: client_addr,
            target: target_addr,
            client_to_target: outcome.client_to_target,
            target_to_client: outcome.target_to_client,
        });

        outcome
    }
}

/// Capture buffer plus the sink its records go to
struct Capture<'a> {
    buffer: CaptureBuffer,
    sink: &'a dyn CaptureSink,
    records: usize,
    client_to_target: u64,
    target_to_client: u64,
}

impl Capture<'_> {
    fn observe(&mut self, direction: Direction, chunk: &[u8]) {
        match direction {
            Direction::ClientToTarget => self.client_to_target += chunk.len() as u64,
            Direction::TargetToClient => self.target_to_client += chunk.len() as u64,
            Direction::Unknown => {}
        }
        if let Some(record) = self.buffer.observe(direction, chunk, Local::now()) {
            self.records += 1;
            self.sink.on_flush(&record);
        }
    }

    fn idle_flush(&mut self) {
        if let Some(record) = self.buffer.idle_flush() {
            self.records += 1;
            self.sink.on_flush(&record);
        }
    }
}

async fn forward<W>(writer: &mut W, chunk: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(chunk).await?;
    writer.flush().await
}

async fn close_leg<W>(writer: &mut W, peer: SocketAddr, timeout: Duration)
where
    W: AsyncWrite + Unpin,
{
    match tokio::time::timeout(timeout, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Error shutting down connection with {}: {}", peer, e),
        Err(_) => debug!("Timed out shutting down connection with {}", peer),
    }
}

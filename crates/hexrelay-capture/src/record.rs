//! Values emitted by the capture layer

use bytes::Bytes;
use chrono::{DateTime, Local};
use std::fmt;
use std::net::SocketAddr;

use crate::hexdump::hex_dump;

/// Timestamp layout used when rendering flush records
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Which leg of a session produced the buffered bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Unknown,
    ClientToTarget,
    TargetToClient,
}

impl Direction {
    /// Resolve `(source, destination)` for this direction.
    ///
    /// Returns `None` for [`Direction::Unknown`], which never owns any bytes.
    pub fn endpoints(
        self,
        client: SocketAddr,
        target: SocketAddr,
    ) -> Option<(SocketAddr, SocketAddr)> {
        match self {
            Direction::ClientToTarget => Some((client, target)),
            Direction::TargetToClient => Some((target, client)),
            Direction::Unknown => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Direction::Unknown => "unknown",
            Direction::ClientToTarget => "client->target",
            Direction::TargetToClient => "target->client",
        };
        f.write_str(label)
    }
}

/// One observed one-directional burst of traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushRecord {
    /// Arrival time of the first byte of the burst
    pub timestamp: DateTime<Local>,
    pub direction: Direction,
    pub source: SocketAddr,
    pub destination: SocketAddr,
    pub payload: Bytes,
}

impl FlushRecord {
    /// Address line of the rendered record, e.g. `2024-05-01 10:00:00 : a -> b`
    pub fn header(&self) -> String {
        format!(
            "{} : {} -> {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.source,
            self.destination
        )
    }

    /// Full textual rendering: header line, hex dump, trailing blank line
    pub fn render(&self) -> String {
        format!("{}\n{}\n", self.header(), hex_dump(&self.payload))
    }
}

impl fmt::Display for FlushRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Connection lifecycle notices
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Accepted {
        client: SocketAddr,
    },
    Dialed {
        client: SocketAddr,
        target: SocketAddr,
    },
    DialFailed {
        client: SocketAddr,
        target: SocketAddr,
        reason: String,
    },
    /// One leg of a session was closed
    Closed {
        peer: SocketAddr,
    },
    SessionEnded {
        client: SocketAddr,
        target: SocketAddr,
        client_to_target: u64,
        target_to_client: u64,
    },
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::Accepted { client } => write!(f, "Accepted connection from {}", client),
            LifecycleEvent::Dialed { client, target } => {
                write!(f, "Connected {} to target {}", client, target)
            }
            LifecycleEvent::DialFailed {
                client,
                target,
                reason,
            } => write!(
                f,
                "Failed to connect {} to target {}: {}",
                client, target, reason
            ),
            LifecycleEvent::Closed { peer } => write!(f, "Close connection with {}", peer),
            LifecycleEvent::SessionEnded {
                client,
                target,
                client_to_target,
                target_to_client,
            } => write!(
                f,
                "Session {} <-> {} ended (↑{}B ↓{}B)",
                client, target, client_to_target, target_to_client
            ),
        }
    }
}

//! Direction-tracking capture buffer
//!
//! Holds the bytes of the current burst. Every byte in the buffer belongs to
//! the tracked direction; a change of direction or an idle flush turns the
//! buffered burst into a [`FlushRecord`] and empties the buffer.

use bytes::BytesMut;
use chrono::{DateTime, Local};
use std::net::SocketAddr;
use tracing::warn;

use crate::record::{Direction, FlushRecord};

#[derive(Debug)]
pub struct CaptureBuffer {
    client: SocketAddr,
    target: SocketAddr,
    direction: Direction,
    started_at: Option<DateTime<Local>>,
    data: BytesMut,
}

impl CaptureBuffer {
    pub fn new(client: SocketAddr, target: SocketAddr) -> Self {
        Self {
            client,
            target,
            direction: Direction::Unknown,
            started_at: None,
            data: BytesMut::new(),
        }
    }

    /// Direction of the most recently observed chunk
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Record a chunk travelling in `direction`, observed at `now`.
    ///
    /// If the chunk switches direction while bytes from the previous direction
    /// are still buffered, those bytes are returned as a record first.
    /// Chunks tagged [`Direction::Unknown`] have no endpoints and are ignored.
    pub fn observe(
        &mut self,
        direction: Direction,
        bytes: &[u8],
        now: DateTime<Local>,
    ) -> Option<FlushRecord> {
        if direction == Direction::Unknown {
            warn!("Ignoring {} captured bytes without a direction", bytes.len());
            return None;
        }

        let flushed = if direction != self.direction {
            self.take()
        } else {
            None
        };

        if self.data.is_empty() {
            self.started_at = Some(now);
        }
        self.data.extend_from_slice(bytes);
        self.direction = direction;

        flushed
    }

    /// Surface the pending burst, if any, without waiting for a direction change
    pub fn idle_flush(&mut self) -> Option<FlushRecord> {
        self.take()
    }

    fn take(&mut self) -> Option<FlushRecord> {
        if self.data.is_empty() {
            return None;
        }

        let (source, destination) = self.direction.endpoints(self.client, self.target)?;
        let payload = self.data.split().freeze();
        let timestamp = self.started_at.take().unwrap_or_else(Local::now);

        Some(FlushRecord {
            timestamp,
            direction: self.direction,
            source,
            destination,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn buffer() -> CaptureBuffer {
        CaptureBuffer::new(
            "127.0.0.1:40000".parse().unwrap(),
            "127.0.0.1:8080".parse().unwrap(),
        )
    }

    #[test]
    fn test_unknown_direction_leaves_burst_intact() {
        let mut buf = buffer();
        let t0 = Local::now();

        buf.observe(Direction::ClientToTarget, b"GET /", t0);
        assert!(buf.observe(Direction::Unknown, b"lost", t0).is_none());
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.direction(), Direction::ClientToTarget);

        let record = buf.idle_flush().unwrap();
        assert_eq!(&record.payload[..], b"GET /");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_same_direction_chunks_are_grouped() {
        let mut buf = buffer();
        let t0 = Local::now();

        assert!(buf
            .observe(Direction::ClientToTarget, b"GET /", t0)
            .is_none());
        assert!(buf
            .observe(
                Direction::ClientToTarget,
                b"\r\n\r\n",
                t0 + Duration::milliseconds(10)
            )
            .is_none());
        assert_eq!(buf.len(), 9);

        let record = buf
            .observe(
                Direction::TargetToClient,
                b"HTTP/1.1 200 OK",
                t0 + Duration::milliseconds(60),
            )
            .expect("direction change flushes the previous burst");

        assert_eq!(&record.payload[..], b"GET /\r\n\r\n");
        assert_eq!(record.direction, Direction::ClientToTarget);
        assert_eq!(record.timestamp, t0);
        assert_eq!(record.source, "127.0.0.1:40000".parse().unwrap());
        assert_eq!(record.destination, "127.0.0.1:8080".parse().unwrap());

        let record = buf.idle_flush().unwrap();
        assert_eq!(&record.payload[..], b"HTTP/1.1 200 OK");
        assert_eq!(record.direction, Direction::TargetToClient);
        assert_eq!(record.timestamp, t0 + Duration::milliseconds(60));
        assert_eq!(record.source, "127.0.0.1:8080".parse().unwrap());
    }

    #[test]
    fn test_idle_flush_on_empty_buffer_is_noop() {
        let mut buf = buffer();
        assert!(buf.idle_flush().is_none());
        assert_eq!(buf.direction(), Direction::Unknown);

        buf.observe(Direction::ClientToTarget, b"0123456789", Local::now());
        assert!(buf.idle_flush().is_some());
        assert!(buf.is_empty());
        assert!(buf.idle_flush().is_none());
    }

    #[test]
    fn test_timestamp_restarts_after_flush() {
        let mut buf = buffer();
        let t0 = Local::now();
        let t1 = t0 + Duration::seconds(3);

        buf.observe(Direction::TargetToClient, b"a", t0);
        buf.idle_flush();
        buf.observe(Direction::TargetToClient, b"b", t1);

        let record = buf.idle_flush().unwrap();
        assert_eq!(record.timestamp, t1);
        assert_eq!(&record.payload[..], b"b");
    }

    #[test]
    fn test_records_never_mix_directions() {
        let mut buf = buffer();
        let now = Local::now();
        let chunks: [(Direction, &[u8]); 6] = [
            (Direction::ClientToTarget, b"a1"),
            (Direction::ClientToTarget, b"a2"),
            (Direction::TargetToClient, b"b1"),
            (Direction::ClientToTarget, b"a3"),
            (Direction::TargetToClient, b"b2"),
            (Direction::TargetToClient, b"b3"),
        ];

        let mut records: Vec<FlushRecord> = chunks
            .iter()
            .filter_map(|(dir, bytes)| buf.observe(*dir, bytes, now))
            .collect();
        records.extend(buf.idle_flush());

        let summary: Vec<(Direction, &[u8])> = records
            .iter()
            .map(|r| (r.direction, &r.payload[..]))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Direction::ClientToTarget, &b"a1a2"[..]),
                (Direction::TargetToClient, &b"b1"[..]),
                (Direction::ClientToTarget, &b"a3"[..]),
                (Direction::TargetToClient, &b"b2b3"[..]),
            ]
        );
    }
}

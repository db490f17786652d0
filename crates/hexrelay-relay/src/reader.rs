//! Per-leg background reader
//!
//! Reads one leg in its own task and hands chunks to the relay loop over a
//! bounded channel. The reader never closes the leg: when it stops it only
//! drops its read half, the relay loop owns the write half.

use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Read buffer size per `read` call
pub const CHUNK_SIZE: usize = 4096;

/// What a reader delivers to the relay loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    /// Non-empty block of bytes read in one call
    Chunk(Bytes),
    /// The leg reached EOF or failed; nothing follows
    Closed,
}

pub struct StreamReader {
    rx: mpsc::Receiver<ReadEvent>,
    task: JoinHandle<()>,
}

impl StreamReader {
    /// Start reading `reader` in a new task.
    ///
    /// At most one chunk waits in the channel; the task blocks until the
    /// consumer takes it.
    pub fn spawn<R>(reader: R, peer: SocketAddr) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(read_loop(reader, peer, tx));
        Self { rx, task }
    }

    /// Next event from the leg. Cancel safe.
    ///
    /// Once the reader task is gone this keeps returning [`ReadEvent::Closed`].
    pub async fn next(&mut self) -> ReadEvent {
        self.rx.recv().await.unwrap_or(ReadEvent::Closed)
    }

    /// Discard whatever the reader still delivers, for at most `grace`.
    ///
    /// Returns the number of discarded bytes.
    pub async fn drain(&mut self, grace: Duration) -> usize {
        let mut discarded = 0;
        let _ = tokio::time::timeout(grace, async {
            while let Some(event) = self.rx.recv().await {
                if let ReadEvent::Chunk(chunk) = event {
                    discarded += chunk.len();
                }
            }
        })
        .await;
        discarded
    }

    /// Stop the reader task and wait until it released the read half
    pub async fn stop(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

async fn read_loop<R>(mut reader: R, peer: SocketAddr, tx: mpsc::Sender<ReadEvent>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(CHUNK_SIZE);

    loop {
        buf.reserve(CHUNK_SIZE);
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                debug!("{} closed its side of the connection", peer);
                break;
            }
            Ok(n) => {
                debug!("Read {} bytes from {}", n, peer);
                let chunk = buf.split().freeze();
                if tx.send(ReadEvent::Chunk(chunk)).await.is_err() {
                    // relay loop is gone, nobody wants the terminal marker either
                    return;
                }
            }
            Err(e) => {
                debug!("Error reading from {}: {}", peer, e);
                break;
            }
        }
    }

    let _ = tx.send(ReadEvent::Closed).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn peer() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_chunks_then_single_terminal_marker() {
        let (mut writer, leg) = tokio::io::duplex(64);
        let mut reader = StreamReader::spawn(leg, peer());

        writer.write_all(b"hello").await.unwrap();
        assert_eq!(
            reader.next().await,
            ReadEvent::Chunk(Bytes::from_static(b"hello"))
        );

        writer.write_all(b"world").await.unwrap();
        assert_eq!(
            reader.next().await,
            ReadEvent::Chunk(Bytes::from_static(b"world"))
        );

        drop(writer);
        assert_eq!(reader.next().await, ReadEvent::Closed);
        // channel is closed after the marker, later calls stay terminal
        assert_eq!(reader.next().await, ReadEvent::Closed);
    }

    #[tokio::test]
    async fn test_large_payload_is_split_but_complete() {
        let (mut writer, leg) = tokio::io::duplex(64 * 1024);
        let mut reader = StreamReader::spawn(leg, peer());

        let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        writer.write_all(&payload).await.unwrap();
        drop(writer);

        let mut received = Vec::new();
        loop {
            match reader.next().await {
                ReadEvent::Chunk(chunk) => {
                    assert!(!chunk.is_empty());
                    assert!(chunk.len() <= payload.len());
                    received.extend_from_slice(&chunk);
                }
                ReadEvent::Closed => break,
            }
        }
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn test_drain_discards_in_flight_chunks() {
        let (mut writer, leg) = tokio::io::duplex(64);
        let mut reader = StreamReader::spawn(leg, peer());

        writer.write_all(b"late bytes").await.unwrap();
        drop(writer);

        let discarded = reader.drain(Duration::from_millis(50)).await;
        assert_eq!(discarded, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_is_bounded_when_leg_stays_open() {
        let (_writer, leg) = tokio::io::duplex(64);
        let mut reader = StreamReader::spawn(leg, peer());

        let started = tokio::time::Instant::now();
        assert_eq!(reader.drain(Duration::from_millis(5)).await, 0);
        assert!(started.elapsed() >= Duration::from_millis(5));
        reader.stop().await;
    }

    #[tokio::test]
    async fn test_stop_releases_blocked_reader() {
        let (_writer, leg) = tokio::io::duplex(64);
        let reader = StreamReader::spawn(leg, peer());

        // nothing written: the task is parked on read and must still stop
        reader.stop().await;
    }
}

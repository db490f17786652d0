//! Observability sinks for flush records and lifecycle notices

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::record::{FlushRecord, LifecycleEvent};

/// Append-only consumer of everything the relay engine observes.
///
/// Implementations are shared by every session and must keep each record
/// contiguous in their output.
pub trait CaptureSink: Send + Sync {
    fn on_flush(&self, record: &FlushRecord);

    fn on_lifecycle(&self, event: &LifecycleEvent);
}

/// Writes rendered hex dumps to a writer (stdout by default).
///
/// Records are queued to a dedicated writer thread, so a slow reader of the
/// output never blocks the runtime. Dropping the sink writes out everything
/// still queued.
pub struct ConsoleSink {
    tx: Option<mpsc::UnboundedSender<String>>,
    writer: Option<JoinHandle<()>>,
}

impl ConsoleSink {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = std::thread::spawn(move || write_records(out, rx));

        Self {
            tx: Some(tx),
            writer: Some(writer),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }
}

impl std::fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSink").finish_non_exhaustive()
    }
}

impl Drop for ConsoleSink {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                debug!("Console writer thread panicked");
            }
        }
    }
}

impl CaptureSink for ConsoleSink {
    fn on_flush(&self, record: &FlushRecord) {
        let sent = self
            .tx
            .as_ref()
            .is_some_and(|tx| tx.send(record.render()).is_ok());
        if !sent {
            warn!("Console writer stopped, dropping capture record");
        }
    }

    fn on_lifecycle(&self, event: &LifecycleEvent) {
        info!("{}", event);
    }
}

/// Emits records as `tracing` events, for setups that aggregate logs
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl CaptureSink for TracingSink {
    fn on_flush(&self, record: &FlushRecord) {
        info!(
            target: "hexrelay::capture",
            direction = %record.direction,
            bytes = record.payload.len(),
            "{}\n{}",
            record.header(),
            crate::hex_dump(&record.payload)
        );
    }

    fn on_lifecycle(&self, event: &LifecycleEvent) {
        info!(target: "hexrelay::lifecycle", "{}", event);
    }
}

/// Keeps everything in memory; used to inspect sessions programmatically
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<FlushRecord>>,
    events: Mutex<Vec<LifecycleEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<FlushRecord> {
        lock(&self.records).clone()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        lock(&self.events).clone()
    }
}

impl CaptureSink for MemorySink {
    fn on_flush(&self, record: &FlushRecord) {
        lock(&self.records).push(record.clone());
    }

    fn on_lifecycle(&self, event: &LifecycleEvent) {
        lock(&self.events).push(event.clone());
    }
}

// Each record goes out in a single write, so records never interleave.
fn write_records(mut out: Box<dyn Write + Send>, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(rendered) = rx.blocking_recv() {
        if let Err(e) = out
            .write_all(rendered.as_bytes())
            .and_then(|_| out.flush())
        {
            warn!("Failed to write capture record: {}", e);
        }
    }
}

// A panic while holding a sink lock only loses that one record.
fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

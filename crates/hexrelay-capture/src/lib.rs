//! Traffic capture for the relay engine
//!
//! Groups consecutive same-direction chunks of a proxied session into bursts,
//! turns each burst into a [`FlushRecord`] and hands it to a [`CaptureSink`].

pub mod buffer;
pub mod hexdump;
pub mod record;
pub mod sink;

pub use buffer::CaptureBuffer;
pub use hexdump::hex_dump;
pub use record::{Direction, FlushRecord, LifecycleEvent, TIMESTAMP_FORMAT};
pub use sink::{CaptureSink, ConsoleSink, MemorySink, TracingSink};

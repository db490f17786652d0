//! Connection relay engine
//!
//! A [`Session`] pairs a client leg with a target leg, pumps bytes between
//! them and feeds every chunk to a capture buffer. Each leg is read by its own
//! [`StreamReader`] task so a blocked read on one side never stalls the other.

pub mod reader;
pub mod session;

pub use reader::{ReadEvent, StreamReader, CHUNK_SIZE};
pub use session::{CloseReason, RelaySettings, Session, SessionOutcome};

use tokio::io::{AsyncRead, AsyncWrite};

/// Any bidirectional byte stream a session can own (plain TCP, TLS, in-memory)
pub trait ProxyStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> ProxyStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Type-erased leg, used when the concrete stream type is picked at runtime
pub type BoxedStream = Box<dyn ProxyStream>;

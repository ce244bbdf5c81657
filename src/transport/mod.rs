//! Two-variant transport abstraction: a reliable stream socket and an
//! unreliable datagram socket, behind one small interface.
//!
//! Blocking I/O throughout — nothing in this crate runs under an async
//! runtime, so each variant owns a plain `std::net` socket and a dedicated
//! reader thread drives it (see `reactor`).

pub mod datagram;
pub mod stream;

pub use datagram::DatagramTransport;
pub use stream::StreamTransport;

use anyhow::Result;

/// How long a blocking read waits before giving the caller a chance to
/// check a shutdown flag and retry.
pub(crate) const READ_POLL: std::time::Duration = std::time::Duration::from_millis(200);

/// Connection parameters common to both transport variants. `timeout_ms`
/// and `max_retries` are meaningful only for the datagram reliability
/// engine; the stream variant ignores them.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
    pub max_retries: u32,
}

/// Bytes in, bytes out. `open` must succeed before `send`/`receive` are
/// called; `receive` returns `Ok(0)` on a read-timeout poll (no message
/// available yet), distinct from a peer-closed error.
pub trait Transport: Send {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Selects the wire binding; mirrors the `-t` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Stream,
    Datagram,
}

pub fn create(binding: Binding, config: TransportConfig) -> Box<dyn Transport> {
    match binding {
        Binding::Stream => Box::new(StreamTransport::new(config)),
        Binding::Datagram => Box::new(DatagramTransport::new(config)),
    }
}

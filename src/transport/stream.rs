//! Reliable stream transport: resolve host, connect, move bytes.

use super::{Transport, TransportConfig, READ_POLL};
use anyhow::{bail, Context, Result};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

pub struct StreamTransport {
    config: TransportConfig,
    stream: Option<TcpStream>,
}

impl StreamTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self { config, stream: None }
    }
}

impl Transport for StreamTransport {
    fn open(&mut self) -> Result<()> {
        let addr = (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()
            .with_context(|| format!("resolving {}:{}", self.config.host, self.config.port))?
            .next()
            .with_context(|| format!("no address found for {}", self.config.host))?;
        let stream = TcpStream::connect(addr).with_context(|| format!("connecting to {addr}"))?;
        stream.set_read_timeout(Some(READ_POLL))?;
        stream.set_nodelay(true).ok();
        debug!(%addr, "stream transport connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().context("stream transport not open")?;
        stream.write_all(bytes).context("writing to stream socket")
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.stream.as_mut().context("stream transport not open")?;
        match stream.read(buf) {
            Ok(0) => bail!("stream socket closed by peer"),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(0),
            Err(e) => Err(e).context("reading from stream socket"),
        }
    }
}

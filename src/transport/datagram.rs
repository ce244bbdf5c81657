//! Unreliable datagram transport. Binds an ephemeral local port and tracks
//! the server's address as a plain value rather than a connected socket,
//! since the server reassigns each session to a new source port after the
//! first reply (port adoption).

use super::{Transport, TransportConfig, READ_POLL};
use anyhow::{bail, Context, Result};
use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use tracing::debug;

pub struct DatagramTransport {
    config: TransportConfig,
    socket: Option<UdpSocket>,
    dest: Option<SocketAddr>,
    adopted: bool,
}

impl DatagramTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            socket: None,
            dest: None,
            adopted: false,
        }
    }
}

impl Transport for DatagramTransport {
    fn open(&mut self) -> Result<()> {
        let dest = (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()
            .with_context(|| format!("resolving {}:{}", self.config.host, self.config.port))?
            .next()
            .with_context(|| format!("no address found for {}", self.config.host))?;
        let socket = UdpSocket::bind("0.0.0.0:0").context("binding ephemeral datagram socket")?;
        socket.set_read_timeout(Some(READ_POLL))?;
        debug!(local = %socket.local_addr()?, %dest, "datagram transport bound");
        self.socket = Some(socket);
        self.dest = Some(dest);
        self.adopted = false;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.socket = None;
        self.dest = None;
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let socket = self.socket.as_ref().context("datagram transport not open")?;
        let dest = self.dest.context("datagram transport not open")?;
        socket.send_to(bytes, dest).context("sending datagram")?;
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        let socket = self.socket.as_ref().context("datagram transport not open")?;
        let (n, from) = match socket.recv_from(buf) {
            Ok(pair) => pair,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Ok(0)
            }
            Err(e) => return Err(e).context("receiving datagram"),
        };
        if !self.adopted {
            let dest = self.dest.as_mut().context("datagram transport not open")?;
            if from.port() != dest.port() {
                debug!(old = dest.port(), new = from.port(), "server adopted session to new port");
                dest.set_port(from.port());
            }
            self.adopted = true;
        }
        if n == 0 {
            bail!("received an empty datagram");
        }
        Ok(n)
    }
}

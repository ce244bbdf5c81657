//! SIGINT handling via the self-pipe trick: the async-signal-safe handler
//! only writes a byte to one end of a `UnixStream` pair, and an ordinary
//! thread blocks reading the other end, translating each byte into a
//! notification on the Reactor's signal channel.

use std::io::Read;
use std::os::unix::net::UnixStream;
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use signal_hook::consts::SIGINT;
use signal_hook::low_level::pipe;

/// Registers SIGINT and spawns the relay thread that turns self-pipe bytes
/// into sends on `signal_tx`.
pub fn install(signal_tx: Sender<()>) -> Result<()> {
    let (mut read_end, write_end) = UnixStream::pair().context("creating SIGINT self-pipe")?;
    pipe::register(SIGINT, write_end).context("registering SIGINT self-pipe")?;
    thread::spawn(move || {
        let mut byte = [0u8; 1];
        while read_end.read_exact(&mut byte).is_ok() {
            if signal_tx.send(()).is_err() {
                break;
            }
        }
    });
    Ok(())
}

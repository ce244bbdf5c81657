//! Dedicated stdin-reading thread. Polls with a 1-second timeout so it can
//! notice a shutdown request even while the terminal is idle, rather than
//! blocking forever in a `read_line` the process has no other way to
//! interrupt.

use std::io::{self, BufRead};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// `signal_tx` is shared with the SIGINT relay thread: end-of-input is
/// treated as an equivalent shutdown trigger, so both feed the same
/// channel.
pub fn spawn(stdin_tx: Sender<String>, signal_tx: Sender<()>, stop: Arc<AtomicBool>) -> JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        let mut lock = stdin.lock();
        while !stop.load(Ordering::SeqCst) {
            match poll_stdin_ready(POLL_INTERVAL) {
                Ok(true) => {
                    let mut line = String::new();
                    match lock.read_line(&mut line) {
                        Ok(0) => {
                            let _ = signal_tx.send(());
                            break;
                        }
                        Ok(_) => {
                            if stdin_tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
                Ok(false) => continue,
                Err(_) => break,
            }
        }
    })
}

/// `select(2)` on stdin with a fixed timeout, so the loop wakes up
/// periodically rather than blocking indefinitely.
fn poll_stdin_ready(timeout: Duration) -> io::Result<bool> {
    let fd = io::stdin().as_raw_fd();
    let mut read_fds: libc::fd_set = unsafe { std::mem::zeroed() };
    unsafe {
        libc::FD_ZERO(&mut read_fds);
        libc::FD_SET(fd, &mut read_fds);
    }
    let mut tv = libc::timeval {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_usec: timeout.subsec_micros() as libc::suseconds_t,
    };
    let ret = unsafe { libc::select(fd + 1, &mut read_fds, std::ptr::null_mut(), std::ptr::null_mut(), &mut tv) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ret > 0)
}

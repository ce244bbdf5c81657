//! End-to-end check of the stream binding: a loopback listener plays the
//! server side of the protocol, and a real Reactor + Fsm pair plays the
//! client, driven by synthetic stdin lines instead of an actual terminal.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::unbounded;

use ipk_chat_client::transport::{Binding, StreamTransport, Transport, TransportConfig};
use ipk_chat_client::{Fsm, Mailbox, Reactor};

#[test]
fn auth_message_bye_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (server_lines_tx, server_lines_rx) = unbounded();

    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;

        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        server_lines_tx.send(line.clone()).unwrap();
        writer.write_all(b"REPLY OK IS Welcome\r\n").unwrap();

        line.clear();
        reader.read_line(&mut line).unwrap();
        server_lines_tx.send(line.clone()).unwrap();

        line.clear();
        reader.read_line(&mut line).unwrap();
        server_lines_tx.send(line.clone()).unwrap();
    });

    let config = TransportConfig {
        host: "127.0.0.1".to_string(),
        port,
        timeout_ms: 250,
        max_retries: 3,
    };
    let mut transport: Box<dyn Transport> = Box::new(StreamTransport::new(config));
    transport.open().unwrap();

    let (notify_tx, notify_rx) = unbounded();
    let (stdin_tx, stdin_rx) = unbounded();
    let (_signal_tx, signal_rx) = unbounded();
    let mailbox = Arc::new(Mailbox::new(notify_tx));
    let stop = Arc::new(AtomicBool::new(false));

    let mut reactor = Reactor::new(
        mailbox.clone(),
        transport,
        Binding::Stream,
        250,
        3,
        stdin_rx,
        notify_rx,
        signal_rx,
        stop.clone(),
    );
    let reactor_handle = thread::spawn(move || reactor.run());

    let fsm_mailbox = mailbox.clone();
    let fsm_handle = thread::spawn(move || {
        let mut fsm = Fsm::new(&fsm_mailbox);
        fsm.run();
    });

    stdin_tx.send("/auth alice s3cret Alice\n".to_string()).unwrap();
    let auth_line = server_lines_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(auth_line, "AUTH alice AS Alice USING s3cret\r\n");

    // Give the REPLY time to round-trip and move the session to Open before
    // the next line is typed, mirroring how a human paces real input.
    thread::sleep(Duration::from_millis(150));

    stdin_tx.send("Hello\n".to_string()).unwrap();
    let msg_line = server_lines_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(msg_line, "MSG FROM Alice IS Hello\r\n");

    stdin_tx.send("/bye\n".to_string()).unwrap();
    let bye_line = server_lines_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(bye_line, "BYE\r\n");

    fsm_handle.join().unwrap();
    stop.store(true, Ordering::SeqCst);
    let _ = reactor_handle.join();
}

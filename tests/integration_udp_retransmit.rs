//! End-to-end check of the datagram binding's stop-and-wait reliability
//! engine: a loopback socket plays the server side, deliberately drops the
//! first AUTH datagram, and confirms the client retransmits it before the
//! server lets the handshake through.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::unbounded;

use ipk_chat_client::codec::{BinaryCodec, Codec};
use ipk_chat_client::message::Message;
use ipk_chat_client::transport::{Binding, DatagramTransport, Transport, TransportConfig};
use ipk_chat_client::{Fsm, Mailbox, Reactor};

#[test]
fn dropped_auth_is_retransmitted_then_reply_is_confirmed() {
    let server = UdpSocket::bind("127.0.0.1:0").unwrap();
    server.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let port = server.local_addr().unwrap().port();

    let config = TransportConfig {
        host: "127.0.0.1".to_string(),
        port,
        timeout_ms: 80,
        max_retries: 3,
    };
    let mut transport: Box<dyn Transport> = Box::new(DatagramTransport::new(config));
    transport.open().unwrap();

    let (notify_tx, notify_rx) = unbounded();
    let (stdin_tx, stdin_rx) = unbounded();
    let (_signal_tx, signal_rx) = unbounded();
    let mailbox = Arc::new(Mailbox::new(notify_tx));
    let stop = Arc::new(AtomicBool::new(false));

    let mut reactor = Reactor::new(
        mailbox.clone(),
        transport,
        Binding::Datagram,
        80,
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

    let codec = BinaryCodec;

    stdin_tx.send("/auth alice s3cret Alice\n".to_string()).unwrap();

    // First AUTH datagram: dropped on purpose, never answered.
    let mut buf = [0u8; 1500];
    let (n, client_addr) = server.recv_from(&mut buf).unwrap();
    let first = codec.parse(&buf[..n]).unwrap();
    let auth_id = match &first {
        Message::Auth { message_id, .. } => *message_id,
        other => panic!("expected AUTH, got {other:?}"),
    };

    // Retransmit, once the client's retry timer fires.
    let (n, _) = server.recv_from(&mut buf).unwrap();
    let retransmit = codec.parse(&buf[..n]).unwrap();
    assert_eq!(retransmit, first);

    let confirm = codec.serialize(&Message::Confirm { ref_message_id: auth_id }).unwrap();
    server.send_to(&confirm, client_addr).unwrap();

    let reply = codec
        .serialize(&Message::Reply {
            message_id: 0,
            result: true,
            ref_message_id: auth_id,
            content: ipk_chat_client::message::MessageContent::new("Welcome").unwrap(),
        })
        .unwrap();
    server.send_to(&reply, client_addr).unwrap();

    // The client must CONFIRM the REPLY in turn.
    let (n, _) = server.recv_from(&mut buf).unwrap();
    let ack = codec.parse(&buf[..n]).unwrap();
    assert!(matches!(ack, Message::Confirm { .. }));

    stdin_tx.send("/bye\n".to_string()).unwrap();

    // BYE, then its CONFIRM from the server settles the session.
    let (n, _) = server.recv_from(&mut buf).unwrap();
    let bye = codec.parse(&buf[..n]).unwrap();
    let bye_id = match &bye {
        Message::Bye { message_id } => *message_id,
        other => panic!("expected BYE, got {other:?}"),
    };
    let confirm_bye = codec.serialize(&Message::Confirm { ref_message_id: bye_id }).unwrap();
    server.send_to(&confirm_bye, client_addr).unwrap();

    fsm_handle.join().unwrap();
    stop.store(true, Ordering::SeqCst);
    let _ = reactor_handle.join();
}

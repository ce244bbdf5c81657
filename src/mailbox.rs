//! Thread-safe inbound/outbound queues shared by the FSM, Reactor, and
//! Input reader threads. The mutex-guarded queues and the notify channel
//! are the only mutable state those threads share directly.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Condvar, Mutex};

use crossbeam_channel::Sender;

use crate::codec::Codec;
use crate::error::ChatError;
use crate::message::{ChannelId, DisplayName, Envelope, Message, MessageContent, MessageId, Secret, Username};

pub struct Mailbox {
    incoming: Mutex<VecDeque<Envelope>>,
    incoming_ready: Condvar,
    outgoing: Mutex<VecDeque<Message>>,
    notify_tx: Sender<()>,
    display_name: Mutex<DisplayName>,
    outbound_counter: AtomicU16,
    inbound_surrogate: AtomicU16,
}

impl Mailbox {
    pub fn new(notify_tx: Sender<()>) -> Self {
        Self {
            incoming: Mutex::new(VecDeque::new()),
            incoming_ready: Condvar::new(),
            outgoing: Mutex::new(VecDeque::new()),
            notify_tx,
            display_name: Mutex::new(DisplayName::new("anonymous").expect("literal display name is valid")),
            outbound_counter: AtomicU16::new(0),
            inbound_surrogate: AtomicU16::new(0),
        }
    }

    /// Blocks until the incoming queue is non-empty, then pops the front.
    /// The only blocking operation on the Mailbox.
    pub fn wait_mail(&self) -> Envelope {
        let mut incoming = self.incoming.lock().unwrap();
        loop {
            if let Some(envelope) = incoming.pop_front() {
                return envelope;
            }
            incoming = self.incoming_ready.wait(incoming).unwrap();
        }
    }

    pub fn try_get_outgoing(&self) -> Option<Message> {
        self.outgoing.lock().unwrap().pop_front()
    }

    pub fn add_mail(&self, envelope: Envelope) {
        if !envelope.add_to_mail_queue {
            return;
        }
        self.incoming.lock().unwrap().push_back(envelope);
        self.incoming_ready.notify_one();
    }

    /// Assigns a MessageID to every kind that carries one, enqueues for
    /// transmission, and wakes the reactor via the notify channel.
    ///
    /// The counter saturates at `u16::MAX` instead of wrapping back to 0.
    /// Reusing IDs after roughly 65,000 messages would make the
    /// CONFIRM/REPLY matching logic ambiguous; freezing at the ceiling at
    /// least keeps IDs monotonic up to that point.
    pub fn send_mail(&self, mut message: Message) {
        let id = self.next_outbound_id();
        message.set_message_id(id);
        self.outgoing.lock().unwrap().push_back(message);
        let _ = self.notify_tx.send(());
    }

    fn next_outbound_id(&self) -> MessageId {
        loop {
            let current = self.outbound_counter.load(Ordering::SeqCst);
            let next = current.saturating_add(1);
            if self
                .outbound_counter
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return current;
            }
        }
    }

    pub fn display_name(&self) -> DisplayName {
        self.display_name.lock().unwrap().clone()
    }

    pub fn set_display_name(&self, name: DisplayName) {
        *self.display_name.lock().unwrap() = name;
    }

    /// Parses an inbound wire message. `text_protocol` selects whether a
    /// locally-generated surrogate MessageID is stamped on afterward: the
    /// text codec never carries one on the wire, so the Mailbox supplies
    /// one here for internal bookkeeping only — it is never retransmitted.
    pub fn parse_inbound(&self, bytes: &[u8], codec: &dyn Codec, text_protocol: bool) -> Result<Message, ChatError> {
        let mut message = codec.parse(bytes)?;
        if text_protocol {
            let id = self.inbound_surrogate.fetch_add(1, Ordering::SeqCst);
            message.set_message_id(id);
        }
        Ok(message)
    }

    /// Builds a sigint-flagged ERR for the Reactor's signal-pipe handler,
    /// queued directly for the FSM.
    pub fn synth_interrupt_err(&self) -> Envelope {
        let mut envelope = Envelope::new(Message::Err {
            message_id: 0,
            display_name: self.display_name(),
            content: MessageContent::new("interrupted").expect("literal is valid"),
        });
        envelope.sigint = true;
        envelope
    }

    /// Parses a line typed at the terminal into a local command or an
    /// outbound chat message. Slash commands that are purely local
    /// (`/rename`, `/help`, `/print`) and malformed commands are resolved
    /// entirely here and returned as a non-enqueued envelope.
    pub fn write_command(&self, line: &str) -> Envelope {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(rest) = line.strip_prefix("/auth") {
            self.command_auth(rest)
        } else if let Some(rest) = line.strip_prefix("/join") {
            self.command_join(rest)
        } else if let Some(rest) = line.strip_prefix("/rename") {
            self.command_rename(rest)
        } else if line == "/bye" {
            self.command_bye()
        } else if line == "/help" {
            Self::print_help();
            Self::not_enqueued()
        } else if line == "/print" {
            self.print_pending_debug();
            Self::not_enqueued()
        } else if line.starts_with('/') {
            self.local_error(&format!("unknown command: {line}"))
        } else {
            self.command_message(line)
        }
    }

    fn command_auth(&self, rest: &str) -> Envelope {
        let Some(tokens) = Self::tokens(rest, 3) else {
            return self.local_error("usage: /auth <username> <secret> <displayname>");
        };
        match (Username::new(tokens[0]), Secret::new(tokens[1]), DisplayName::new(tokens[2])) {
            (Ok(username), Ok(secret), Ok(display_name)) => {
                self.set_display_name(display_name.clone());
                Envelope::new(Message::Auth {
                    message_id: 0,
                    username,
                    display_name,
                    secret,
                })
            }
            _ => self.local_error("usage: /auth <username> <secret> <displayname>"),
        }
    }

    fn command_join(&self, rest: &str) -> Envelope {
        let Some(tokens) = Self::tokens(rest, 1) else {
            return self.local_error("usage: /join <channel>");
        };
        match ChannelId::new(tokens[0]) {
            Ok(channel_id) => Envelope::new(Message::Join {
                message_id: 0,
                channel_id,
                display_name: self.display_name(),
            }),
            Err(_) => self.local_error("usage: /join <channel>"),
        }
    }

    /// The user's explicit `/bye` closes the session the same way a
    /// protocol-violation teardown does, but without an ERR: it must still
    /// reach the wire, unlike a BYE received from the server.
    fn command_bye(&self) -> Envelope {
        let mut envelope = Envelope::new(Message::Bye { message_id: 0 });
        envelope.local_bye = true;
        envelope
    }

    fn command_rename(&self, rest: &str) -> Envelope {
        let Some(tokens) = Self::tokens(rest, 1) else {
            return self.local_error("usage: /rename <displayname>");
        };
        match DisplayName::new(tokens[0]) {
            Ok(display_name) => {
                self.set_display_name(display_name);
                Self::not_enqueued()
            }
            Err(_) => self.local_error("usage: /rename <displayname>"),
        }
    }

    fn command_message(&self, line: &str) -> Envelope {
        match MessageContent::new(line) {
            Ok(content) => Envelope::new(Message::Msg {
                message_id: 0,
                display_name: self.display_name(),
                content,
                to_send: true,
            }),
            Err(_) => self.local_error("message is empty or contains a disallowed character"),
        }
    }

    fn tokens(rest: &str, expected: usize) -> Option<Vec<&str>> {
        let rest = rest.strip_prefix(' ')?;
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        (tokens.len() == expected).then_some(tokens)
    }

    fn local_error(&self, message: &str) -> Envelope {
        eprintln!("ERR: {message}");
        Self::not_enqueued()
    }

    fn not_enqueued() -> Envelope {
        Envelope::not_enqueued(Message::Unknown { message_id: None })
    }

    fn print_help() {
        println!("Available commands:");
        println!("  /auth <username> <secret> <displayname>   authenticate with the server");
        println!("  /join <channel>                           join a channel");
        println!("  /rename <displayname>                     change your local display name");
        println!("  /bye                                      end the session");
        println!("  /help                                     show this help text");
        println!("  /print                                    dump pending inbound messages (debug)");
    }

    fn print_pending_debug(&self) {
        let incoming = self.incoming.lock().unwrap();
        eprintln!("pending inbound ({} message(s)):", incoming.len());
        for envelope in incoming.iter() {
            eprintln!("  {} id={:?}", envelope.message.kind_name(), envelope.message.message_id());
        }
    }
}

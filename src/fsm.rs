//! The session state machine. Consumes inbound events from the Mailbox,
//! enforces which message kinds are legal in each state, and drives
//! outbound traffic by calling back into the Mailbox.

use tracing::{debug, warn};

use crate::mailbox::Mailbox;
use crate::message::{DisplayName, Envelope, Message, MessageContent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Authenticating,
    Open,
    End,
}

pub struct Fsm<'a> {
    mailbox: &'a Mailbox,
    state: State,
}

impl<'a> Fsm<'a> {
    pub fn new(mailbox: &'a Mailbox) -> Self {
        Self {
            mailbox,
            state: State::Start,
        }
    }

    /// Runs until the session reaches End, then returns so the caller can
    /// stop the Reactor and Input reader and close the Transport.
    pub fn run(&mut self) {
        while self.state != State::End {
            let envelope = self.mailbox.wait_mail();
            self.dispatch(envelope);
        }
    }

    fn dispatch(&mut self, envelope: Envelope) {
        let before = self.state;
        match self.state {
            State::Start => self.on_start(envelope),
            State::Authenticating => self.on_authenticating(envelope),
            State::Open => self.on_open(envelope),
            State::End => {}
        }
        if before != self.state {
            debug!(from = ?before, to = ?self.state, "fsm transition");
        }
    }

    fn on_start(&mut self, envelope: Envelope) {
        match envelope.message {
            Message::Auth {
                username,
                display_name,
                secret,
                ..
            } => {
                self.mailbox.send_mail(Message::Auth {
                    message_id: 0,
                    username,
                    display_name,
                    secret,
                });
                self.state = State::Authenticating;
            }
            Message::Err { .. } if envelope.sigint => {
                self.mailbox.send_mail(Message::Bye { message_id: 0 });
                self.state = State::End;
            }
            Message::Bye { .. } if envelope.local_bye => {
                self.mailbox.send_mail(Message::Bye { message_id: 0 });
                self.state = State::End;
            }
            Message::Msg { .. } | Message::Join { .. } => {
                eprintln!(
                    "ignoring {} received before authentication",
                    envelope.message.kind_name()
                );
            }
            other => self.unexpected(&other),
        }
    }

    fn on_authenticating(&mut self, envelope: Envelope) {
        let sigint = envelope.sigint;
        match envelope.message {
            Message::Reply { result: true, content, .. } => {
                println!("Success: {content}");
                self.state = State::Open;
            }
            Message::Reply { result: false, content, .. } => {
                println!("Failure: {content}");
            }
            Message::Auth {
                username,
                display_name,
                secret,
                ..
            } => {
                self.mailbox.send_mail(Message::Auth {
                    message_id: 0,
                    username,
                    display_name,
                    secret,
                });
            }
            Message::Err { display_name, content, .. } => {
                self.handle_inbound_err(sigint, &display_name, &content);
            }
            Message::Bye { .. } if envelope.local_bye => {
                self.mailbox.send_mail(Message::Bye { message_id: 0 });
                self.state = State::End;
            }
            other => self.unexpected(&other),
        }
    }

    fn on_open(&mut self, envelope: Envelope) {
        let sigint = envelope.sigint;
        match envelope.message {
            Message::Msg {
                to_send: true,
                display_name,
                content,
                ..
            } => {
                self.mailbox.send_mail(Message::Msg {
                    message_id: 0,
                    display_name,
                    content,
                    to_send: true,
                });
            }
            Message::Msg {
                to_send: false,
                display_name,
                content,
                ..
            } => {
                println!("{display_name}: {content}");
            }
            // Both REPLY outcomes are a pure no-op once the session is open.
            Message::Reply { .. } => {}
            Message::Join {
                channel_id,
                display_name,
                ..
            } => {
                self.mailbox.send_mail(Message::Join {
                    message_id: 0,
                    channel_id,
                    display_name,
                });
            }
            Message::Auth { .. } => {
                eprintln!("ERR: already authenticated");
            }
            Message::Err { display_name, content, .. } => {
                self.handle_inbound_err(sigint, &display_name, &content);
            }
            // A locally-typed `/bye` must still reach the wire; a BYE
            // received from the server must not be echoed back.
            Message::Bye { .. } if envelope.local_bye => {
                self.mailbox.send_mail(Message::Bye { message_id: 0 });
                self.state = State::End;
            }
            Message::Bye { .. } => {
                self.state = State::End;
            }
            other => self.unexpected(&other),
        }
    }

    /// Shared ERR handling for Authenticating and Open: both states
    /// unconditionally synth BYE regardless of whether the ERR was
    /// sigint-synthesized, but only a server-originated ERR gets the
    /// user-visible diagnostic.
    fn handle_inbound_err(&mut self, sigint: bool, display_name: &DisplayName, content: &MessageContent) {
        if !sigint {
            eprintln!("ERR FROM {display_name}: {content}");
        }
        self.mailbox.send_mail(Message::Bye { message_id: 0 });
        self.state = State::End;
    }

    fn unexpected(&mut self, message: &Message) {
        warn!(kind = message.kind_name(), state = ?self.state, "protocol violation");
        let reason = format!("unexpected {} message", message.kind_name());
        let content =
            MessageContent::new(reason).unwrap_or_else(|_| MessageContent::new("protocol violation").expect("literal is valid"));
        self.mailbox.send_mail(Message::Err {
            message_id: 0,
            display_name: self.mailbox.display_name(),
            content,
        });
        // Error has exactly one behavior — synth BYE and end — so there is
        // no separate state to wait in.
        self.mailbox.send_mail(Message::Bye { message_id: 0 });
        self.state = State::End;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ChannelId, Secret, Username};

    fn harness() -> (Mailbox, crossbeam_channel::Receiver<()>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Mailbox::new(tx), rx)
    }

    #[test]
    fn auth_reply_ok_opens_session() {
        let (mailbox, _rx) = harness();
        let mut fsm = Fsm::new(&mailbox);
        mailbox.add_mail(Envelope::new(Message::Auth {
            message_id: 0,
            username: Username::new("alice").unwrap(),
            display_name: DisplayName::new("Alice").unwrap(),
            secret: Secret::new("s3cret").unwrap(),
        }));
        mailbox.add_mail(Envelope::new(Message::Reply {
            message_id: 0,
            result: true,
            ref_message_id: 0,
            content: MessageContent::new("Welcome").unwrap(),
        }));
        mailbox.add_mail(Envelope::new(Message::Bye { message_id: 1 }));
        fsm.run();
        assert_eq!(fsm.state, State::End);
    }

    #[test]
    fn reply_failure_stays_in_authenticating() {
        let (mailbox, _rx) = harness();
        let mut fsm = Fsm::new(&mailbox);
        fsm.state = State::Authenticating;
        fsm.dispatch(Envelope::new(Message::Reply {
            message_id: 0,
            result: false,
            ref_message_id: 0,
            content: MessageContent::new("bad creds").unwrap(),
        }));
        assert_eq!(fsm.state, State::Authenticating);
    }

    #[test]
    fn sigint_in_start_sends_bye_and_ends() {
        let (mailbox, _rx) = harness();
        let mut fsm = Fsm::new(&mailbox);
        let mut envelope = Envelope::new(Message::Err {
            message_id: 0,
            display_name: DisplayName::new("anonymous").unwrap(),
            content: MessageContent::new("interrupted").unwrap(),
        });
        envelope.sigint = true;
        fsm.dispatch(envelope);
        assert_eq!(fsm.state, State::End);
        let outbound = mailbox.try_get_outgoing().unwrap();
        assert!(matches!(outbound, Message::Bye { .. }));
    }

    #[test]
    fn auth_in_open_is_diagnostic_only() {
        let (mailbox, _rx) = harness();
        let mut fsm = Fsm::new(&mailbox);
        fsm.state = State::Open;
        fsm.dispatch(Envelope::new(Message::Auth {
            message_id: 0,
            username: Username::new("alice").unwrap(),
            display_name: DisplayName::new("Alice").unwrap(),
            secret: Secret::new("s3cret").unwrap(),
        }));
        // AUTH from a user while Open is an explicit diagnostic, not an
        // unexpected-event transition.
        assert_eq!(fsm.state, State::Open);
    }

    #[test]
    fn unknown_kind_in_open_triggers_error_path() {
        let (mailbox, _rx) = harness();
        let mut fsm = Fsm::new(&mailbox);
        fsm.state = State::Open;
        fsm.dispatch(Envelope::new(Message::Unknown { message_id: Some(7) }));
        assert_eq!(fsm.state, State::End);
        let err = mailbox.try_get_outgoing().unwrap();
        assert!(matches!(err, Message::Err { .. }));
        let bye = mailbox.try_get_outgoing().unwrap();
        assert!(matches!(bye, Message::Bye { .. }));
    }

    #[test]
    fn local_bye_command_transmits_before_ending() {
        let (mailbox, _rx) = harness();
        let mut fsm = Fsm::new(&mailbox);
        fsm.state = State::Open;
        let mut envelope = Envelope::new(Message::Bye { message_id: 0 });
        envelope.local_bye = true;
        fsm.dispatch(envelope);
        assert_eq!(fsm.state, State::End);
        let outbound = mailbox.try_get_outgoing().unwrap();
        assert!(matches!(outbound, Message::Bye { .. }));
    }

    #[test]
    fn remote_bye_ends_without_echoing() {
        let (mailbox, _rx) = harness();
        let mut fsm = Fsm::new(&mailbox);
        fsm.state = State::Open;
        fsm.dispatch(Envelope::new(Message::Bye { message_id: 3 }));
        assert_eq!(fsm.state, State::End);
        assert!(mailbox.try_get_outgoing().is_none());
    }

    #[test]
    fn join_in_open_is_sent() {
        let (mailbox, _rx) = harness();
        let mut fsm = Fsm::new(&mailbox);
        fsm.state = State::Open;
        fsm.dispatch(Envelope::new(Message::Join {
            message_id: 0,
            channel_id: ChannelId::new("general").unwrap(),
            display_name: DisplayName::new("Alice").unwrap(),
        }));
        assert_eq!(fsm.state, State::Open);
        assert!(mailbox.try_get_outgoing().is_some());
    }
}

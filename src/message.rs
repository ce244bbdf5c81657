//! The Message tagged union and its field validators.
//!
//! Field constraints are validated both when the user/FSM constructs a
//! Message locally and when a codec parses one off the wire.

use crate::error::{ChatError, FieldViolation};

pub type MessageId = u16;

fn validate_charset(
    field: &'static str,
    s: &str,
    min: usize,
    max: usize,
    allowed: impl Fn(u8) -> bool,
) -> Result<(), ChatError> {
    let len = s.len();
    if len < min || len > max {
        return Err(ChatError::Validation(FieldViolation {
            field,
            reason: "length out of range",
        }));
    }
    if !s.bytes().all(&allowed) {
        return Err(ChatError::Validation(FieldViolation {
            field,
            reason: "contains a character outside the allowed set",
        }));
    }
    Ok(())
}

fn is_alnum_hyphen(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-'
}

fn is_channel_id_char(b: u8) -> bool {
    is_alnum_hyphen(b) || b == b'.'
}

fn is_printable(b: u8) -> bool {
    (0x21..=0x7E).contains(&b)
}

fn is_content_printable(b: u8) -> bool {
    (0x20..=0x7E).contains(&b)
}

macro_rules! validated_string {
    ($name:ident, $field:literal, $min:expr, $max:expr, $charset:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Result<Self, ChatError> {
                let s = s.into();
                validate_charset($field, &s, $min, $max, $charset)?;
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

validated_string!(Username, "Username", 1, 20, is_alnum_hyphen);
validated_string!(ChannelId, "ChannelID", 1, 20, is_channel_id_char);
validated_string!(Secret, "Secret", 1, 128, is_alnum_hyphen);
validated_string!(DisplayName, "DisplayName", 1, 20, is_printable);
validated_string!(MessageContent, "MessageContent", 1, 1400, is_content_printable);

/// The tagged union of wire message kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Confirm {
        ref_message_id: MessageId,
    },
    Reply {
        message_id: MessageId,
        result: bool,
        ref_message_id: MessageId,
        content: MessageContent,
    },
    Auth {
        message_id: MessageId,
        username: Username,
        display_name: DisplayName,
        secret: Secret,
    },
    Join {
        message_id: MessageId,
        channel_id: ChannelId,
        display_name: DisplayName,
    },
    Msg {
        message_id: MessageId,
        display_name: DisplayName,
        content: MessageContent,
        /// True when this Msg originated locally and is outbound; false for
        /// a Msg received from the server.
        to_send: bool,
    },
    Err {
        message_id: MessageId,
        display_name: DisplayName,
        content: MessageContent,
    },
    Bye {
        message_id: MessageId,
    },
    /// Fallback for a tag/keyword the codec does not recognize.
    Unknown {
        message_id: Option<MessageId>,
    },
}

impl Message {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Message::Confirm { .. } => "CONFIRM",
            Message::Reply { .. } => "REPLY",
            Message::Auth { .. } => "AUTH",
            Message::Join { .. } => "JOIN",
            Message::Msg { .. } => "MSG",
            Message::Err { .. } => "ERR",
            Message::Bye { .. } => "BYE",
            Message::Unknown { .. } => "UNKNOWN",
        }
    }

    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Message::Confirm { .. } => None,
            Message::Reply { message_id, .. }
            | Message::Auth { message_id, .. }
            | Message::Join { message_id, .. }
            | Message::Msg { message_id, .. }
            | Message::Err { message_id, .. }
            | Message::Bye { message_id, .. } => Some(*message_id),
            Message::Unknown { message_id } => *message_id,
        }
    }

    pub fn ref_message_id(&self) -> Option<MessageId> {
        match self {
            Message::Confirm { ref_message_id } | Message::Reply { ref_message_id, .. } => {
                Some(*ref_message_id)
            }
            _ => None,
        }
    }

    /// Assign `id` to every kind that carries a MessageID. CONFIRM and
    /// UNKNOWN are left untouched — outbound framing assigns IDs once, at
    /// send time, and those two kinds never carry one.
    pub fn set_message_id(&mut self, id: MessageId) {
        match self {
            Message::Reply { message_id, .. }
            | Message::Auth { message_id, .. }
            | Message::Join { message_id, .. }
            | Message::Msg { message_id, .. }
            | Message::Err { message_id, .. }
            | Message::Bye { message_id, .. } => *message_id = id,
            Message::Confirm { .. } | Message::Unknown { .. } => {}
        }
    }
}

/// Carries the envelope flags the core needs on top of a raw Message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub message: Message,
    pub add_to_mail_queue: bool,
    pub sigint: bool,
    /// Set on the BYE produced by the user's `/bye` command, to distinguish
    /// it from a BYE received from the server: the former must still be
    /// transmitted, the latter must not be echoed back.
    pub local_bye: bool,
}

impl Envelope {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            add_to_mail_queue: true,
            sigint: false,
            local_bye: false,
        }
    }

    pub fn not_enqueued(message: Message) -> Self {
        Self {
            message,
            add_to_mail_queue: false,
            sigint: false,
            local_bye: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_accepts_alnum_and_hyphen() {
        assert!(Username::new("alice-01").is_ok());
    }

    #[test]
    fn username_rejects_empty() {
        assert!(Username::new("").is_err());
    }

    #[test]
    fn username_rejects_too_long() {
        assert!(Username::new("a".repeat(21)).is_err());
    }

    #[test]
    fn username_rejects_invalid_char() {
        assert!(Username::new("alice_01").is_err());
    }

    #[test]
    fn channel_id_accepts_dot() {
        assert!(ChannelId::new("general.chat").is_ok());
    }

    #[test]
    fn display_name_rejects_del_char() {
        assert!(DisplayName::new("bad\u{7F}name").is_err());
    }

    #[test]
    fn display_name_rejects_space() {
        // 0x20 is below the 0x21 floor for DisplayName.
        assert!(DisplayName::new("bad name").is_err());
    }

    #[test]
    fn message_content_allows_space_and_max_len() {
        let content = "a".repeat(1400);
        assert!(MessageContent::new(content).is_ok());
    }

    #[test]
    fn message_content_rejects_over_max_len() {
        let content = "a".repeat(1401);
        assert!(MessageContent::new(content).is_err());
    }

    #[test]
    fn message_content_rejects_empty() {
        assert!(MessageContent::new("").is_err());
    }

    #[test]
    fn secret_allows_max_length() {
        assert!(Secret::new("a".repeat(128)).is_ok());
        assert!(Secret::new("a".repeat(129)).is_err());
    }

    #[test]
    fn set_message_id_skips_confirm() {
        let mut m = Message::Confirm { ref_message_id: 7 };
        m.set_message_id(99);
        assert_eq!(m.ref_message_id(), Some(7));
    }

    #[test]
    fn set_message_id_applies_to_bye() {
        let mut m = Message::Bye { message_id: 0 };
        m.set_message_id(42);
        assert_eq!(m.message_id(), Some(42));
    }
}

//! Dual wire codec: a binary framing for the datagram transport and a
//! line-oriented text framing for the stream transport, both serializing
//! and parsing the same [`Message`](crate::message::Message) taxonomy.
//!
//! Each transport used to pair a `read_message`/`write_message`
//! free-function style with one transport-specific framing rule. Here the
//! framing rule is the thing that varies (binary tag-and-cstring vs. CRLF
//! keyword line) independently of the transport, so it becomes the trait
//! boundary instead.

pub mod binary;
pub mod text;

use crate::error::ChatError;
use crate::message::Message;

pub use binary::BinaryCodec;
pub use text::TextCodec;

/// Serializes a `Message` to bytes and parses bytes back into a `Message`.
///
/// `serialize` never fails for a well-formed `Message` (field validation
/// already happened at construction time); it returns `Result` only to
/// keep the trait uniform with `parse`.
pub trait Codec {
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, ChatError>;
    fn parse(&self, bytes: &[u8]) -> Result<Message, ChatError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DisplayName, MessageContent};

    #[test]
    fn binary_round_trips_msg() {
        let codec = BinaryCodec;
        let msg = Message::Msg {
            message_id: 7,
            display_name: DisplayName::new("Alice").unwrap(),
            content: MessageContent::new("hi there").unwrap(),
            to_send: true,
        };
        let bytes = codec.serialize(&msg).unwrap();
        let parsed = codec.parse(&bytes).unwrap();
        match parsed {
            Message::Msg {
                message_id,
                display_name,
                content,
                ..
            } => {
                assert_eq!(message_id, 7);
                assert_eq!(display_name.as_str(), "Alice");
                assert_eq!(content.as_str(), "hi there");
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }
}

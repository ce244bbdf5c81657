//! Binary, tag-and-cstring codec for the datagram transport.

use super::Codec;
use crate::error::{ChatError, FieldViolation};
use crate::message::{ChannelId, DisplayName, Message, MessageContent, Secret, Username};

const TAG_CONFIRM: u8 = 0x00;
const TAG_REPLY: u8 = 0x01;
const TAG_AUTH: u8 = 0x02;
const TAG_JOIN: u8 = 0x03;
const TAG_MSG: u8 = 0x04;
const TAG_ERR: u8 = 0xFE;
const TAG_BYE: u8 = 0xFF;

fn malformed(field: &'static str) -> ChatError {
    ChatError::Validation(FieldViolation {
        field,
        reason: "truncated or malformed binary frame",
    })
}

fn read_u16(bytes: &[u8], pos: &mut usize) -> Result<u16, ChatError> {
    let slice = bytes.get(*pos..*pos + 2).ok_or_else(|| malformed("u16"))?;
    *pos += 2;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

fn read_u8(bytes: &[u8], pos: &mut usize) -> Result<u8, ChatError> {
    let b = *bytes.get(*pos).ok_or_else(|| malformed("u8"))?;
    *pos += 1;
    Ok(b)
}

fn read_cstring(bytes: &[u8], pos: &mut usize) -> Result<String, ChatError> {
    let start = *pos;
    let nul = bytes[start..]
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| malformed("cstring"))?;
    let s = std::str::from_utf8(&bytes[start..start + nul])
        .map_err(|_| malformed("cstring"))?
        .to_string();
    *pos = start + nul + 1;
    Ok(s)
}

fn write_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn write_cstring(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// The length-tagged binary framing used over the unreliable datagram
/// transport.
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, ChatError> {
        let mut out = Vec::new();
        match message {
            Message::Confirm { ref_message_id } => {
                out.push(TAG_CONFIRM);
                write_u16(&mut out, *ref_message_id);
            }
            Message::Reply {
                message_id,
                result,
                ref_message_id,
                content,
            } => {
                out.push(TAG_REPLY);
                write_u16(&mut out, *message_id);
                out.push(if *result { 1 } else { 0 });
                write_u16(&mut out, *ref_message_id);
                write_cstring(&mut out, content.as_str());
            }
            Message::Auth {
                message_id,
                username,
                display_name,
                secret,
            } => {
                out.push(TAG_AUTH);
                write_u16(&mut out, *message_id);
                write_cstring(&mut out, username.as_str());
                write_cstring(&mut out, display_name.as_str());
                write_cstring(&mut out, secret.as_str());
            }
            Message::Join {
                message_id,
                channel_id,
                display_name,
            } => {
                out.push(TAG_JOIN);
                write_u16(&mut out, *message_id);
                write_cstring(&mut out, channel_id.as_str());
                write_cstring(&mut out, display_name.as_str());
            }
            Message::Msg {
                message_id,
                display_name,
                content,
                ..
            } => {
                out.push(TAG_MSG);
                write_u16(&mut out, *message_id);
                write_cstring(&mut out, display_name.as_str());
                write_cstring(&mut out, content.as_str());
            }
            Message::Err {
                message_id,
                display_name,
                content,
            } => {
                out.push(TAG_ERR);
                write_u16(&mut out, *message_id);
                write_cstring(&mut out, display_name.as_str());
                write_cstring(&mut out, content.as_str());
            }
            Message::Bye { message_id } => {
                out.push(TAG_BYE);
                write_u16(&mut out, *message_id);
            }
            Message::Unknown { .. } => {
                return Err(ChatError::Validation(FieldViolation {
                    field: "kind",
                    reason: "UNKNOWN is never serialized for transmission",
                }));
            }
        }
        Ok(out)
    }

    fn parse(&self, bytes: &[u8]) -> Result<Message, ChatError> {
        let mut pos = 0usize;
        let tag = read_u8(bytes, &mut pos)?;
        match tag {
            TAG_CONFIRM => {
                let ref_message_id = read_u16(bytes, &mut pos)?;
                Ok(Message::Confirm { ref_message_id })
            }
            TAG_REPLY => {
                let message_id = read_u16(bytes, &mut pos)?;
                let result = read_u8(bytes, &mut pos)? != 0;
                let ref_message_id = read_u16(bytes, &mut pos)?;
                let content = MessageContent::new(read_cstring(bytes, &mut pos)?)?;
                Ok(Message::Reply {
                    message_id,
                    result,
                    ref_message_id,
                    content,
                })
            }
            TAG_AUTH => {
                let message_id = read_u16(bytes, &mut pos)?;
                let username = Username::new(read_cstring(bytes, &mut pos)?)?;
                let display_name = DisplayName::new(read_cstring(bytes, &mut pos)?)?;
                let secret = Secret::new(read_cstring(bytes, &mut pos)?)?;
                Ok(Message::Auth {
                    message_id,
                    username,
                    display_name,
                    secret,
                })
            }
            TAG_JOIN => {
                let message_id = read_u16(bytes, &mut pos)?;
                let channel_id = ChannelId::new(read_cstring(bytes, &mut pos)?)?;
                let display_name = DisplayName::new(read_cstring(bytes, &mut pos)?)?;
                Ok(Message::Join {
                    message_id,
                    channel_id,
                    display_name,
                })
            }
            TAG_MSG => {
                let message_id = read_u16(bytes, &mut pos)?;
                let display_name = DisplayName::new(read_cstring(bytes, &mut pos)?)?;
                let content = MessageContent::new(read_cstring(bytes, &mut pos)?)?;
                Ok(Message::Msg {
                    message_id,
                    display_name,
                    content,
                    to_send: false,
                })
            }
            TAG_ERR => {
                let message_id = read_u16(bytes, &mut pos)?;
                let display_name = DisplayName::new(read_cstring(bytes, &mut pos)?)?;
                let content = MessageContent::new(read_cstring(bytes, &mut pos)?)?;
                Ok(Message::Err {
                    message_id,
                    display_name,
                    content,
                })
            }
            TAG_BYE => {
                let message_id = read_u16(bytes, &mut pos)?;
                Ok(Message::Bye { message_id })
            }
            _ => {
                let message_id = read_u16(bytes, &mut pos).ok();
                Ok(Message::Unknown { message_id })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DisplayName, MessageContent};

    #[test]
    fn confirm_round_trips() {
        let codec = BinaryCodec;
        let msg = Message::Confirm { ref_message_id: 42 };
        let bytes = codec.serialize(&msg).unwrap();
        assert_eq!(bytes, vec![TAG_CONFIRM, 0, 42]);
        assert_eq!(codec.parse(&bytes).unwrap(), msg);
    }

    #[test]
    fn bye_round_trips() {
        let codec = BinaryCodec;
        let msg = Message::Bye { message_id: 300 };
        let bytes = codec.serialize(&msg).unwrap();
        assert_eq!(codec.parse(&bytes).unwrap(), msg);
    }

    #[test]
    fn reply_encodes_result_as_single_byte() {
        let codec = BinaryCodec;
        let msg = Message::Reply {
            message_id: 1,
            result: true,
            ref_message_id: 0,
            content: MessageContent::new("ok").unwrap(),
        };
        let bytes = codec.serialize(&msg).unwrap();
        assert_eq!(bytes[0], TAG_REPLY);
        assert_eq!(bytes[3], 1);
    }

    #[test]
    fn unknown_tag_with_full_id_yields_unknown() {
        let codec = BinaryCodec;
        let bytes = vec![0x77, 0x00, 0x09];
        let parsed = codec.parse(&bytes).unwrap();
        assert_eq!(parsed, Message::Unknown { message_id: Some(9) });
    }

    #[test]
    fn single_byte_datagram_yields_unknown_with_no_id() {
        let codec = BinaryCodec;
        let bytes = vec![0x77];
        let parsed = codec.parse(&bytes).unwrap();
        assert_eq!(parsed, Message::Unknown { message_id: None });
    }

    #[test]
    fn truncated_auth_is_rejected() {
        let codec = BinaryCodec;
        let bytes = vec![TAG_AUTH, 0x00, 0x01, b'a', b'l']; // no NUL terminator
        assert!(codec.parse(&bytes).is_err());
    }

    #[test]
    fn msg_round_trip_preserves_display_name_and_content() {
        let codec = BinaryCodec;
        let msg = Message::Msg {
            message_id: 5,
            display_name: DisplayName::new("Bob").unwrap(),
            content: MessageContent::new("hello").unwrap(),
            to_send: false,
        };
        let bytes = codec.serialize(&msg).unwrap();
        assert_eq!(codec.parse(&bytes).unwrap(), msg);
    }
}

//! Line-oriented text codec for the stream transport.
//!
//! The stream protocol carries no MessageID/RefMessageID on the wire: this
//! codec never writes them, and `parse` always returns `message_id: 0` —
//! bookkeeping IDs are assigned by the Mailbox, not the codec.

use super::Codec;
use crate::error::{ChatError, FieldViolation};
use crate::message::{ChannelId, DisplayName, Message, MessageContent, Secret, Username};

const CRLF: &str = "\r\n";

fn malformed(reason: &'static str) -> ChatError {
    ChatError::Validation(FieldViolation {
        field: "line",
        reason,
    })
}

/// Splits `rest` into a single-word field and everything after it, where
/// the word and the remainder are separated by exactly one space.
fn split_one(rest: &str) -> Result<(&str, &str), ChatError> {
    rest.split_once(' ').ok_or_else(|| malformed("expected more tokens"))
}

fn parse_from_is(rest: &str) -> Result<(DisplayName, MessageContent), ChatError> {
    let rest = rest.strip_prefix("FROM ").ok_or_else(|| malformed("expected FROM"))?;
    let (name_tok, after) = split_one(rest)?;
    let content_str = after.strip_prefix("IS ").ok_or_else(|| malformed("expected IS"))?;
    let display_name = DisplayName::new(name_tok)?;
    let content = MessageContent::new(content_str)?;
    Ok((display_name, content))
}

/// The CRLF, keyword-based framing used over the reliable stream
/// transport.
pub struct TextCodec;

impl Codec for TextCodec {
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, ChatError> {
        let line = match message {
            Message::Auth {
                username,
                display_name,
                secret,
                ..
            } => format!(
                "AUTH {} AS {} USING {}",
                username.as_str(),
                display_name.as_str(),
                secret.as_str()
            ),
            Message::Join {
                channel_id,
                display_name,
                ..
            } => format!("JOIN {} AS {}", channel_id.as_str(), display_name.as_str()),
            Message::Msg {
                display_name,
                content,
                ..
            } => format!("MSG FROM {} IS {}", display_name.as_str(), content.as_str()),
            Message::Err {
                display_name,
                content,
                ..
            } => format!("ERR FROM {} IS {}", display_name.as_str(), content.as_str()),
            Message::Reply { result, content, .. } => {
                format!("REPLY {} IS {}", if *result { "OK" } else { "NOK" }, content.as_str())
            }
            Message::Bye { .. } => "BYE".to_string(),
            Message::Confirm { .. } => {
                return Err(ChatError::Validation(FieldViolation {
                    field: "kind",
                    reason: "CONFIRM has no text-protocol encoding",
                }))
            }
            Message::Unknown { .. } => {
                return Err(ChatError::Validation(FieldViolation {
                    field: "kind",
                    reason: "UNKNOWN is never serialized for transmission",
                }))
            }
        };
        Ok(format!("{line}{CRLF}").into_bytes())
    }

    fn parse(&self, bytes: &[u8]) -> Result<Message, ChatError> {
        let raw = std::str::from_utf8(bytes).map_err(|_| malformed("not valid UTF-8"))?;
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        let (keyword, rest) = match line.split_once(' ') {
            Some((k, r)) => (k, r),
            None => (line, ""),
        };
        match keyword {
            "AUTH" => {
                let (username_tok, rest) = split_one(rest)?;
                let rest = rest.strip_prefix("AS ").ok_or_else(|| malformed("expected AS"))?;
                let (display_tok, rest) = split_one(rest)?;
                let secret_tok = rest
                    .strip_prefix("USING ")
                    .ok_or_else(|| malformed("expected USING"))?;
                Ok(Message::Auth {
                    message_id: 0,
                    username: Username::new(username_tok)?,
                    display_name: DisplayName::new(display_tok)?,
                    secret: Secret::new(secret_tok)?,
                })
            }
            "JOIN" => {
                let (channel_tok, rest) = split_one(rest)?;
                let display_tok = rest.strip_prefix("AS ").ok_or_else(|| malformed("expected AS"))?;
                Ok(Message::Join {
                    message_id: 0,
                    channel_id: ChannelId::new(channel_tok)?,
                    display_name: DisplayName::new(display_tok)?,
                })
            }
            "MSG" => {
                let (display_name, content) = parse_from_is(rest)?;
                Ok(Message::Msg {
                    message_id: 0,
                    display_name,
                    content,
                    to_send: false,
                })
            }
            "ERR" => {
                let (display_name, content) = parse_from_is(rest)?;
                Ok(Message::Err {
                    message_id: 0,
                    display_name,
                    content,
                })
            }
            "REPLY" => {
                let (result_tok, after) = split_one(rest)?;
                let result = match result_tok {
                    "OK" => true,
                    "NOK" => false,
                    _ => return Err(malformed("expected OK or NOK")),
                };
                let content_str = after.strip_prefix("IS ").ok_or_else(|| malformed("expected IS"))?;
                Ok(Message::Reply {
                    message_id: 0,
                    result,
                    ref_message_id: 0,
                    content: MessageContent::new(content_str)?,
                })
            }
            "BYE" => Ok(Message::Bye { message_id: 0 }),
            _ => Ok(Message::Unknown { message_id: None }),
        }
    }
}

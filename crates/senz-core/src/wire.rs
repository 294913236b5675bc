//! senz wire format — newline-terminated UTF-8 text frames.
//!
//! Token grammar, whitespace separated:
//!
//! ```text
//! KIND [#attr value]... @sender ^receiver signature
//! ```
//!
//! `@` marks the sender, `^` the receiver, `#` an attribute key. The final
//! token is the hex signature over everything before it, provided it carries
//! no marker sigil and is not the value of a preceding attribute key.
//! Signatures are verified against this canonical payload text — the switch
//! never re-serialises an inbound frame, it forwards the original bytes.

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;

use crate::message::{Message, MsgKind};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("empty frame")]
    Empty,

    #[error("unknown message kind `{0}`")]
    UnknownKind(String),

    #[error("missing @sender token")]
    MissingSender,

    #[error("missing ^receiver token")]
    MissingReceiver,

    #[error("duplicate address token `{0}`")]
    DuplicateAddress(String),

    #[error("empty name in address token `{0}`")]
    EmptyAddress(String),

    #[error("unexpected token `{0}`")]
    UnexpectedToken(String),
}

fn has_sigil(token: &str) -> bool {
    token.starts_with('#') || token.starts_with('@') || token.starts_with('^')
}

/// Parse one terminator-stripped line into a [`Message`].
pub fn parse(line: &str) -> Result<Message, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']).trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let kind = MsgKind::from_token(tokens[0])
        .ok_or_else(|| ParseError::UnknownKind(tokens[0].to_string()))?;

    // Detach a trailing signature: a sigil-less last token whose predecessor
    // is not an attribute key still waiting for its value.
    let mut rest = &tokens[1..];
    let mut signature = None;
    if let [.., prev, last] = rest {
        if !has_sigil(last) && !prev.starts_with('#') {
            signature = Some((*last).to_string());
            rest = &rest[..rest.len() - 1];
        }
    }

    let mut sender: Option<String> = None;
    let mut receiver: Option<String> = None;
    let mut attributes = HashMap::new();

    let mut i = 0;
    while i < rest.len() {
        let token = rest[i];
        if let Some(name) = token.strip_prefix('@') {
            if name.is_empty() {
                return Err(ParseError::EmptyAddress(token.to_string()));
            }
            if sender.replace(name.to_string()).is_some() {
                return Err(ParseError::DuplicateAddress(token.to_string()));
            }
        } else if let Some(name) = token.strip_prefix('^') {
            if name.is_empty() {
                return Err(ParseError::EmptyAddress(token.to_string()));
            }
            if receiver.replace(name.to_string()).is_some() {
                return Err(ParseError::DuplicateAddress(token.to_string()));
            }
        } else if let Some(key) = token.strip_prefix('#') {
            if key.is_empty() {
                return Err(ParseError::UnexpectedToken(token.to_string()));
            }
            let value = match rest.get(i + 1) {
                Some(next) if !has_sigil(next) => {
                    i += 1;
                    (*next).to_string()
                }
                _ => String::new(),
            };
            attributes.insert(key.to_string(), value);
        } else {
            return Err(ParseError::UnexpectedToken(token.to_string()));
        }
        i += 1;
    }

    Ok(Message {
        kind,
        sender: sender.ok_or(ParseError::MissingSender)?,
        receiver: receiver.ok_or(ParseError::MissingReceiver)?,
        attributes,
        signature,
    })
}

/// The signable portion of a raw frame: the line minus its trailing
/// signature token, right-trimmed. Uses the same detachment rule as
/// [`parse`], so verification always operates on exactly the bytes the
/// sender signed.
pub fn canonical_payload(line: &str) -> &str {
    let line = line.trim_end_matches(['\r', '\n']).trim_end();
    if let Some((head, last)) = line.rsplit_once(char::is_whitespace) {
        let head = head.trim_end();
        let prev = head.split_whitespace().last().unwrap_or("");
        if !has_sigil(last) && !prev.starts_with('#') {
            return head;
        }
    }
    line
}

/// The original raw frame paired with its parsed message.
///
/// Forwarding writes `raw` verbatim — receivers of routed traffic observe
/// byte-identical frames, and re-serialisation never happens.
#[derive(Debug, Clone)]
pub struct RawEnvelope {
    raw: String,
    pub message: Message,
}

impl RawEnvelope {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let message = parse(line)?;
        Ok(Self {
            raw: line.trim_end_matches(['\r', '\n']).to_string(),
            message,
        })
    }

    /// The original frame text, terminator stripped.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The canonical payload the signature covers.
    pub fn payload(&self) -> &str {
        canonical_payload(&self.raw)
    }

    /// The frame as bytes, ready to hand to a receiver's outbound queue.
    pub fn to_frame(&self) -> Bytes {
        Bytes::copy_from_slice(self.raw.as_bytes())
    }
}

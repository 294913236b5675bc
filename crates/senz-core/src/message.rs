//! Message schema for switched senzie traffic.
//!
//! A message is one wire unit: a kind, two addresses, an attribute set,
//! and an optional signature over the canonical payload text.

use std::collections::HashMap;
use std::fmt;

/// Message kind discriminator. The set is closed — dispatch matches
/// exhaustively and unknown kinds are rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgKind {
    /// Registration / public-key exchange.
    Share,
    /// Attribute query (the switch answers `#pubkey` lookups itself).
    Get,
    /// Application payload, routed without interpretation.
    Data,
    /// Application payload, routed without interpretation.
    Put,
    /// Liveness / re-registration.
    Ping,
}

impl MsgKind {
    /// The wire token for this kind.
    pub fn as_token(&self) -> &'static str {
        match self {
            Self::Share => "SHARE",
            Self::Get => "GET",
            Self::Data => "DATA",
            Self::Put => "PUT",
            Self::Ping => "PING",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "SHARE" => Some(Self::Share),
            "GET" => Some(Self::Get),
            "DATA" => Some(Self::Data),
            "PUT" => Some(Self::Put),
            "PING" => Some(Self::Ping),
            _ => None,
        }
    }
}

impl fmt::Display for MsgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

/// A parsed message. Immutable once built.
///
/// Attribute keys are stored without the `#` sigil. The signature, when
/// present, is the hex-encoded Ed25519 signature over the canonical
/// payload (see [`crate::wire::canonical_payload`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MsgKind,
    pub sender: String,
    pub receiver: String,
    pub attributes: HashMap<String, String>,
    pub signature: Option<String>,
}

impl Message {
    pub fn new(kind: MsgKind, sender: impl Into<String>, receiver: impl Into<String>) -> Self {
        Self {
            kind,
            sender: sender.into(),
            receiver: receiver.into(),
            attributes: HashMap::new(),
            signature: None,
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attribute value by key (no `#` sigil).
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Render the canonical payload text: the signable form of this message.
    ///
    /// Attributes are emitted in sorted key order so the output is
    /// deterministic. Only switch-originated messages are ever rendered;
    /// inbound traffic is verified and forwarded as the original bytes.
    pub fn to_payload(&self) -> String {
        let mut out = String::from(self.kind.as_token());
        let mut attrs: Vec<(&String, &String)> = self.attributes.iter().collect();
        attrs.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in attrs {
            out.push_str(" #");
            out.push_str(key);
            if !value.is_empty() {
                out.push(' ');
                out.push_str(value);
            }
        }
        out.push_str(" @");
        out.push_str(&self.sender);
        out.push_str(" ^");
        out.push_str(&self.receiver);
        out
    }
}

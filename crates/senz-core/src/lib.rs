//! senz-core — message model, wire format, crypto, and configuration.
//! All other senz crates depend on this one.

pub mod config;
pub mod crypto;
pub mod message;
pub mod wire;

pub use message::{Message, MsgKind};
pub use wire::RawEnvelope;

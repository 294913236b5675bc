//! senz-services — shared concurrent state for the switch:
//! the connection registry (routing table) and the persistent key store.

pub mod keystore;
pub mod registry;

pub use keystore::{KeyStore, KeyStoreError, PublicKeyRecord};
pub use registry::{ConnectionEntry, ConnectionRegistry, ForwardError};

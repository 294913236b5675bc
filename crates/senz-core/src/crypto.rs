//! Cryptographic primitives for the senz switch.
//!
//! Ed25519 signatures over canonical payload text. Keys and signatures
//! travel hex-encoded on the wire. The switch holds one long-term signing
//! keypair; senzies are known only by their public keys.
//!
//! Private key material is wrapped in `Zeroizing` wherever it is read or
//! exported, and the seed file on disk holds exactly the 32 seed bytes.

use std::path::{Path, PathBuf};

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid public key encoding")]
    InvalidPublicKey,

    #[error("invalid signature encoding")]
    InvalidSignature,

    #[error("signature verification failed")]
    VerifyFailed,

    #[error("keypair file {0} is malformed")]
    BadKeyFile(PathBuf),

    #[error("keypair I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The switch's long-term Ed25519 signing identity.
///
/// Generated once and stored persistently as the raw 32-byte seed. The
/// public key is always re-derived on load.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    /// Reconstruct a keypair from stored seed bytes.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// Load the keypair from `path`, generating and persisting a fresh one
    /// on first run.
    pub fn load_or_generate(path: &Path) -> Result<Self, CryptoError> {
        if path.exists() {
            let bytes = Zeroizing::new(std::fs::read(path)?);
            let seed: [u8; 32] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::BadKeyFile(path.to_path_buf()))?;
            Ok(Self::from_seed(seed))
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let keypair = Self::generate();
            let seed = Zeroizing::new(keypair.signing.to_bytes());
            std::fs::write(path, seed.as_slice())?;
            Ok(keypair)
        }
    }

    /// Hex-encoded public key, as it appears in SHARE messages.
    pub fn public_hex(&self) -> String {
        hex::encode(self.signing.verifying_key().to_bytes())
    }

    /// Sign a canonical payload, returning the hex signature token.
    pub fn sign_hex(&self, payload: &[u8]) -> String {
        hex::encode(self.signing.sign(payload).to_bytes())
    }
}

/// Verify a hex signature over `payload` against a hex-encoded public key.
pub fn verify_hex(
    payload: &[u8],
    signature_hex: &str,
    public_key_hex: &str,
) -> Result<(), CryptoError> {
    let key_bytes: [u8; 32] = hex::decode(public_key_hex)
        .map_err(|_| CryptoError::InvalidPublicKey)?
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| CryptoError::InvalidPublicKey)?;

    let sig_bytes: [u8; 64] = hex::decode(signature_hex)
        .map_err(|_| CryptoError::InvalidSignature)?
        .try_into()
        .map_err(|_| CryptoError::InvalidSignature)?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);

    key.verify(payload, &signature)
        .map_err(|_| CryptoError::VerifyFailed)
}

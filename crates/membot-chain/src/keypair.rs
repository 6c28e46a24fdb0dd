//! Wallet keypair loading and ed25519 signing.
//!
//! Keys use the Solana CLI layout: 64 bytes, secret half then public half.

use std::fmt;
use std::path::Path;

use ed25519_dalek::{Signer, SigningKey};
use thiserror::Error;

use crate::pubkey::Pubkey;

/// Errors produced while loading a keypair.
#[derive(Debug, Error)]
pub enum KeypairError {
    #[error("no wallet key configured (set WALLET_PRIVATE_KEY_JSON or WALLET_SECRET_KEY)")]
    Missing,

    #[error("expected 64 key bytes, got {0}")]
    WrongLength(usize),

    #[error("public half does not match the secret key")]
    PublicKeyMismatch,

    #[error("invalid key JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid key byte: {0}")]
    InvalidByte(String),

    #[error("failed to read key file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// An ed25519 signing keypair.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Build from 64 bytes (secret ‖ public).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeypairError> {
        if bytes.len() != 64 {
            return Err(KeypairError::WrongLength(bytes.len()));
        }
        let mut secret = [0u8; 32];
        secret.copy_from_slice(&bytes[..32]);
        let signing = SigningKey::from_bytes(&secret);
        if signing.verifying_key().as_bytes() != &bytes[32..] {
            return Err(KeypairError::PublicKeyMismatch);
        }
        Ok(Self { signing })
    }

    /// Build from a 32-byte secret seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// Parse a JSON array of 64 integers, as written by `solana-keygen`.
    pub fn from_json_array(text: &str) -> Result<Self, KeypairError> {
        let bytes: Vec<u8> = serde_json::from_str(text.trim())?;
        Self::from_bytes(&bytes)
    }

    /// Read a `solana-keygen` JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, KeypairError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| KeypairError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_array(&text)
    }

    /// Parse comma- or whitespace-separated integers.
    pub fn from_int_list(text: &str) -> Result<Self, KeypairError> {
        let bytes = text
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<u8>().map_err(|_| KeypairError::InvalidByte(s.to_string())))
            .collect::<Result<Vec<u8>, _>>()?;
        Self::from_bytes(&bytes)
    }

    /// Load from the wallet environment values.
    ///
    /// `json` may be a JSON array or a path to a file containing one and
    /// takes precedence over the `legacy` integer list.
    pub fn from_env_values(json: Option<&str>, legacy: Option<&str>) -> Result<Self, KeypairError> {
        if let Some(value) = json.map(str::trim).filter(|v| !v.is_empty()) {
            if value.starts_with('[') {
                return Self::from_json_array(value);
            }
            return Self::from_file(value);
        }
        if let Some(value) = legacy.map(str::trim).filter(|v| !v.is_empty()) {
            return Self::from_int_list(value);
        }
        Err(KeypairError::Missing)
    }

    pub fn pubkey(&self) -> Pubkey {
        Pubkey::new(self.signing.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }

    /// 64-byte secret ‖ public layout.
    pub fn to_bytes(&self) -> [u8; 64] {
        self.signing.to_keypair_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair").field("pubkey", &self.pubkey()).finish()
    }
}

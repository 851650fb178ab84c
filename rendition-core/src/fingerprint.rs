//! Content fingerprints.
//!
//! A fingerprint is the lowercase hex SHA-256 of a file's bytes, the same
//! text `sha256sum` prints, so a fingerprint computed by an external tool can
//! be handed straight to the pipeline.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use hex::encode as hex_encode;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncReadExt;

pub const FINGERPRINT_LEN: usize = 64;

const READ_CHUNK: usize = 512 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("invalid fingerprint {0:?}: expected {FINGERPRINT_LEN} hex characters")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex_encode(hasher.finalize()))
    }

    /// Accepts externally computed fingerprints, normalizing case.
    pub fn parse(text: &str) -> Result<Self, FingerprintError> {
        let trimmed = text.trim();
        if trimmed.len() != FINGERPRINT_LEN || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(FingerprintError::Invalid(text.to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    Fingerprint::of(bytes)
}

/// Streams a file through the hasher without holding it in memory.
pub async fn fingerprint_file(path: &Path) -> std::io::Result<Fingerprint> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(Fingerprint(hex_encode(hasher.finalize())))
}

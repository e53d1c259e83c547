//! Content digest support.
//!
//! The digest algorithm is an engine-scoped configuration value chosen at
//! construction and immutable afterwards; artifacts receive it as a copied
//! handle. SHA-1 is the ecosystem default.

use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use sha1::Digest as _;

use crate::error::{TrawlError, TrawlResult};

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    #[default]
    Sha1,
    Sha256,
    Blake3,
}

/// An incremental hasher for one of the supported algorithms
pub enum DigestHasher {
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Blake3 => "BLAKE3",
        }
    }

    /// Start an incremental hash
    pub fn hasher(&self) -> DigestHasher {
        match self {
            DigestAlgorithm::Sha1 => DigestHasher::Sha1(sha1::Sha1::new()),
            DigestAlgorithm::Sha256 => DigestHasher::Sha256(sha2::Sha256::new()),
            DigestAlgorithm::Blake3 => DigestHasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    /// Hash a whole buffer to lowercase hex
    pub fn hash_bytes(&self, data: &[u8]) -> String {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize_hex()
    }

    /// Hash a file in 8 KiB chunks to lowercase hex
    pub fn hash_file(&self, path: &Path) -> TrawlResult<String> {
        let file = std::fs::File::open(path)
            .map_err(|e| TrawlError::io(format!("Failed to open {}", path.display()), e))?;
        let mut reader = std::io::BufReader::new(file);
        let mut hasher = self.hasher();
        let mut chunk = [0u8; 8192];
        loop {
            let read = reader
                .read(&mut chunk)
                .map_err(|e| TrawlError::io(format!("Failed to read {}", path.display()), e))?;
            if read == 0 {
                break;
            }
            hasher.update(&chunk[..read]);
        }
        Ok(hasher.finalize_hex())
    }
}

impl DigestHasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            DigestHasher::Sha1(hasher) => hasher.update(data),
            DigestHasher::Sha256(hasher) => hasher.update(data),
            DigestHasher::Blake3(hasher) => {
                hasher.update(data);
            }
        }
    }

    /// Finish and render as lowercase hex
    pub fn finalize_hex(self) -> String {
        match self {
            DigestHasher::Sha1(hasher) => hex::encode(hasher.finalize()),
            DigestHasher::Sha256(hasher) => hex::encode(hasher.finalize()),
            DigestHasher::Blake3(hasher) => hasher.finalize().to_hex().to_string(),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = TrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "sha1" => Ok(DigestAlgorithm::Sha1),
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "blake3" => Ok(DigestAlgorithm::Blake3),
            _ => Err(TrawlError::DigestAlgorithmUnavailable {
                name: s.to_string(),
            }),
        }
    }
}

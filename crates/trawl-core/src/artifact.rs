//! Artifact records: a named file copied or downloaded from a source URL.
//!
//! An artifact can be marked volatile, meaning it is expected to be modified
//! after the initial copy; the installer preserves volatile files that are
//! already present. A content digest under the engine's configured algorithm
//! tracks changes between runs.

use std::fmt;
use std::hash::{Hash, Hasher};

use camino::{Utf8Path, Utf8PathBuf};
use url::Url;

use crate::digest::DigestAlgorithm;
use crate::error::{TrawlError, TrawlResult};

/// A file materialized from a source URL
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Absolute location on disk
    pub file: Utf8PathBuf,
    /// Where the content comes from
    pub source_url: Url,
    /// True when the file is expected to be edited after install
    pub volatile: bool,
    /// Lowercase hex digest recorded at the last successful install
    pub digest: Option<String>,
    /// Content digest published by the repository, when it provides one;
    /// lets the installer adopt an already matching file without a transfer
    pub source_digest: Option<String>,
}

impl Artifact {
    pub fn new(file: Utf8PathBuf, source_url: Url, volatile: bool) -> Self {
        Self {
            file,
            source_url,
            volatile,
            digest: None,
            source_digest: None,
        }
    }

    /// Whether the file is present on disk
    pub fn exists(&self) -> bool {
        self.file.exists()
    }

    /// True when there is no stored digest, the file is absent, or the
    /// file's current digest differs from the stored one.
    pub fn was_modified(&self, algorithm: DigestAlgorithm) -> TrawlResult<bool> {
        let Some(stored) = &self.digest else {
            return Ok(true);
        };
        if !self.exists() {
            return Ok(true);
        }
        let current = algorithm.hash_file(self.file.as_std_path())?;
        Ok(&current != stored)
    }

    /// Compare the local file's digest against a digest of the source
    /// content, typically the repository-published [`Artifact::source_digest`].
    pub fn is_different(&self, algorithm: DigestAlgorithm, source_digest: &str) -> TrawlResult<bool> {
        let current = algorithm.hash_file(self.file.as_std_path())?;
        Ok(current != source_digest)
    }

    /// Recompute and store the digest from what is on disk
    pub fn update_digest(&mut self, algorithm: DigestAlgorithm) -> TrawlResult<()> {
        self.digest = Some(algorithm.hash_file(self.file.as_std_path())?);
        Ok(())
    }

    /// The file path relative to `root`, or the absolute path when the file
    /// is not under the root.
    pub fn relative_file(&self, root: &Utf8Path) -> Utf8PathBuf {
        self.file
            .strip_prefix(root)
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|_| self.file.clone())
    }

    /// Delete the file and prune empty parent directories, stopping at (and
    /// never removing) `root`. Returns false when the file was not present.
    pub fn delete(&self, root: &Utf8Path) -> TrawlResult<bool> {
        if !self.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.file)
            .map_err(|e| TrawlError::io(format!("Failed to delete {}", self.file), e))?;
        let mut parent = self.file.parent();
        while let Some(directory) = parent {
            if directory == root || !directory.starts_with(root) {
                break;
            }
            // Stop pruning at the first non-empty directory
            if std::fs::remove_dir(directory).is_err() {
                break;
            }
            parent = directory.parent();
        }
        Ok(true)
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file: {}, source: {}", self.file, self.source_url)
    }
}

// Equality and hashing use the file path only
impl PartialEq for Artifact {
    fn eq(&self, other: &Self) -> bool {
        self.file == other.file
    }
}

impl Eq for Artifact {}

impl Hash for Artifact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.file.hash(state);
    }
}

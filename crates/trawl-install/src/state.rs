//! The persisted install state.
//!
//! A single text file of key=value records separated by blank lines:
//!
//! ```text
//! url=https://example.org/a.jar
//! file=lib/a.jar
//! digest=5d41402abc4b2a76b9719d911017c592
//!
//! url=https://example.org/a.xml
//! file=conf/a.xml
//! volatile=true
//! ```
//!
//! `volatile` is omitted when false and `digest` when unknown. Unknown keys
//! are ignored for forward compatibility. Records serialize sorted by file
//! path so identical inputs produce byte-identical files.

use std::fmt::Write as _;
use std::io::Write as _;

use camino::{Utf8Path, Utf8PathBuf};
use url::Url;

use trawl_core::{Artifact, TrawlError, TrawlResult};

/// One artifact record of the state file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    /// Absolute source URL
    pub url: String,
    /// File path relative to the install root
    pub file: Utf8PathBuf,
    pub volatile: bool,
    /// Lowercase hex digest, absent when the last install did not record one
    pub digest: Option<String>,
}

/// The full state of a previous run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallState {
    records: Vec<StateRecord>,
}

impl StateRecord {
    /// Rehydrate into an artifact rooted at `root`
    pub fn to_artifact(&self, root: &Utf8Path) -> TrawlResult<Artifact> {
        let url = Url::parse(&self.url).map_err(|e| TrawlError::StateFileCorrupt {
            path: self.file.to_string(),
            reason: format!("bad url '{}': {}", self.url, e),
        })?;
        let mut artifact = Artifact::new(root.join(&self.file), url, self.volatile);
        artifact.digest = self.digest.clone();
        Ok(artifact)
    }

    /// Capture an artifact relative to `root`
    pub fn from_artifact(artifact: &Artifact, root: &Utf8Path) -> Self {
        Self {
            url: artifact.source_url.to_string(),
            file: artifact.relative_file(root),
            volatile: artifact.volatile,
            digest: artifact.digest.clone(),
        }
    }
}

impl InstallState {
    pub fn new(mut records: Vec<StateRecord>) -> Self {
        records.sort_by(|a, b| a.file.cmp(&b.file));
        Self { records }
    }

    pub fn records(&self) -> &[StateRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a record by its root-relative file path
    pub fn get(&self, file: &Utf8Path) -> Option<&StateRecord> {
        self.records.iter().find(|record| record.file == file)
    }

    /// Capture the state of a finished run
    pub fn from_artifacts<'a>(
        artifacts: impl IntoIterator<Item = &'a Artifact>,
        root: &Utf8Path,
    ) -> Self {
        Self::new(
            artifacts
                .into_iter()
                .map(|artifact| StateRecord::from_artifact(artifact, root))
                .collect(),
        )
    }

    /// Parse the state file text
    pub fn parse(text: &str, path: &Utf8Path) -> TrawlResult<Self> {
        let mut records = Vec::new();
        for (index, block) in text.split("\n\n").enumerate() {
            let block = block.trim();
            if block.is_empty() {
                continue;
            }
            let mut url = None;
            let mut file = None;
            let mut volatile = false;
            let mut digest = None;
            for line in block.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let (key, value) =
                    line.split_once('=')
                        .ok_or_else(|| TrawlError::StateFileCorrupt {
                            path: path.to_string(),
                            reason: format!("record {}: line without '=': '{}'", index + 1, line),
                        })?;
                match key {
                    "url" => url = Some(value.to_string()),
                    "file" => file = Some(Utf8PathBuf::from(value)),
                    "volatile" => volatile = value == "true",
                    "digest" => digest = Some(value.to_string()),
                    // Unknown keys are ignored for forward compatibility
                    _ => {}
                }
            }
            let url = url.ok_or_else(|| TrawlError::StateFileCorrupt {
                path: path.to_string(),
                reason: format!("record {}: missing url", index + 1),
            })?;
            let file = file.ok_or_else(|| TrawlError::StateFileCorrupt {
                path: path.to_string(),
                reason: format!("record {}: missing file", index + 1),
            })?;
            records.push(StateRecord {
                url,
                file,
                volatile,
                digest,
            });
        }
        Ok(Self::new(records))
    }

    /// Render deterministically, sorted by file path
    pub fn serialize(&self) -> String {
        let mut text = String::new();
        for (index, record) in self.records.iter().enumerate() {
            if index > 0 {
                text.push('\n');
            }
            let _ = writeln!(text, "url={}", record.url);
            let _ = writeln!(text, "file={}", record.file);
            if record.volatile {
                let _ = writeln!(text, "volatile=true");
            }
            if let Some(digest) = &record.digest {
                let _ = writeln!(text, "digest={}", digest);
            }
        }
        text
    }

    /// Read a state file. Returns `None` when the file does not exist;
    /// corruption surfaces as `StateFileCorrupt` for the caller to treat as
    /// a warning.
    pub fn load(path: &Utf8Path) -> TrawlResult<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TrawlError::io(format!("Failed to read {}", path), e)),
        };
        Self::parse(&text, path).map(Some)
    }

    /// Write atomically: temp file in the same directory, then rename
    pub fn write(&self, path: &Utf8Path) -> TrawlResult<()> {
        let directory = path.parent().unwrap_or(Utf8Path::new("."));
        std::fs::create_dir_all(directory)
            .map_err(|e| TrawlError::io(format!("Failed to create {}", directory), e))?;
        let mut temp = tempfile::NamedTempFile::new_in(directory)
            .map_err(|e| TrawlError::io(format!("Failed to stage {}", path), e))?;
        temp.write_all(self.serialize().as_bytes())
            .map_err(|e| TrawlError::io(format!("Failed to stage {}", path), e))?;
        temp.persist(path)
            .map_err(|e| TrawlError::io(format!("Failed to persist {}", path), e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(file: &str, volatile: bool, digest: Option<&str>) -> StateRecord {
        StateRecord {
            url: format!("https://example.org/{}", file),
            file: file.into(),
            volatile,
            digest: digest.map(str::to_string),
        }
    }

    #[test]
    fn test_serialize_shape() {
        let state = InstallState::new(vec![
            record("conf/a.xml", true, None),
            record("lib/a.jar", false, Some("abcd")),
        ]);
        let text = state.serialize();
        assert_eq!(
            text,
            "url=https://example.org/conf/a.xml\nfile=conf/a.xml\nvolatile=true\n\n\
             url=https://example.org/lib/a.jar\nfile=lib/a.jar\ndigest=abcd\n"
        );
    }

    #[test]
    fn test_round_trip() {
        let state = InstallState::new(vec![
            record("lib/a.jar", false, Some("abcd")),
            record("conf/a.xml", true, None),
        ]);
        let parsed = InstallState::parse(&state.serialize(), Utf8Path::new("s")).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn test_parse_tolerates_unknown_keys_and_missing_digest() {
        let parsed = InstallState::parse(
            "url=https://example.org/a.jar\nfile=a.jar\nfuture-key=whatever\n",
            Utf8Path::new("s"),
        )
        .unwrap();
        assert_eq!(parsed.records().len(), 1);
        assert_eq!(parsed.records()[0].digest, None);
        assert!(!parsed.records()[0].volatile);
    }

    #[test]
    fn test_parse_corrupt() {
        let error =
            InstallState::parse("url=x\nfile=a\n\nnot a key value line\n", Utf8Path::new("s"))
                .unwrap_err();
        assert!(matches!(error, TrawlError::StateFileCorrupt { .. }));

        let missing_file = InstallState::parse("url=x\n", Utf8Path::new("s")).unwrap_err();
        assert!(matches!(missing_file, TrawlError::StateFileCorrupt { .. }));
    }

    #[test]
    fn test_load_missing_is_none() {
        assert!(InstallState::load(Utf8Path::new("/does/not/exist"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("state.txt")).unwrap();
        let state = InstallState::new(vec![record("lib/a.jar", false, Some("abcd"))]);
        state.write(&path).unwrap();
        assert_eq!(InstallState::load(&path).unwrap().unwrap(), state);
    }

    #[test]
    fn test_deterministic_order() {
        let a = InstallState::new(vec![record("b.jar", false, None), record("a.jar", false, None)]);
        let b = InstallState::new(vec![record("a.jar", false, None), record("b.jar", false, None)]);
        assert_eq!(a.serialize(), b.serialize());
    }
}

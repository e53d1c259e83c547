//! Totally ordered version tokens.
//!
//! Repository-reported versions are dotted sequences of numeric and text
//! segments (`1.0`, `2.1.3`, `1.0-beta1`). Segments compare numerically when
//! both are numbers and lexically when both are text; a text segment sorts
//! below a number at the same position, so `1.0-beta1 < 1.0 < 1.0.1`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// A concrete version token as reported by a repository
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    text: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Number(u64),
    Text(String),
}

/// Version parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version token: '{input}'")]
    InvalidFormat { input: String },
}

impl Version {
    /// Parse a version, failing on empty tokens
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(VersionError::InvalidFormat {
                input: input.to_string(),
            });
        }
        let mut segments = Vec::new();
        for part in text.split(['.', '-']) {
            if part.is_empty() {
                return Err(VersionError::InvalidFormat {
                    input: input.to_string(),
                });
            }
            match part.parse::<u64>() {
                Ok(n) => segments.push(Segment::Number(n)),
                Err(_) => segments.push(Segment::Text(part.to_string())),
            }
        }
        Ok(Self {
            text: text.to_string(),
            segments,
        })
    }

    /// The original textual form
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl Segment {
    fn cmp_segment(&self, other: &Segment) -> Ordering {
        match (self, other) {
            (Segment::Number(a), Segment::Number(b)) => a.cmp(b),
            (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
            // Text at a position a number could occupy marks a prerelease
            (Segment::Text(_), Segment::Number(_)) => Ordering::Less,
            (Segment::Number(_), Segment::Text(_)) => Ordering::Greater,
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            match (self.segments.get(i), other.segments.get(i)) {
                (Some(a), Some(b)) => match a.cmp_segment(b) {
                    Ordering::Equal => continue,
                    ordering => return ordering,
                },
                // A trailing text segment marks a prerelease of the shorter
                // version; a trailing number extends past it
                (Some(Segment::Text(_)), None) => return Ordering::Less,
                (Some(Segment::Number(_)), None) => return Ordering::Greater,
                (None, Some(Segment::Text(_))) => return Ordering::Greater,
                (None, Some(Segment::Number(_))) => return Ordering::Less,
                (None, None) => unreachable!(),
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.text
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

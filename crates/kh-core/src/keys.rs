//! OpenSSH public key lines
//!
//! A key line is `<type> <base64-blob> [comment]`. Two lines refer to the
//! same key when their type and blob match; the comment is ignored.

use std::fmt;
use std::path::Path;

use crate::error::ValidationError;

/// A single public key line, as found in a `.pub` file or `authorized_keys`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyLine {
    raw: String,
}

impl PublicKeyLine {
    /// Parse an `authorized_keys` line.
    ///
    /// Returns `None` for blank lines, `#` comments, and lines with fewer
    /// than two fields.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        if line.split_whitespace().nth(1).is_none() {
            return None;
        }
        Some(Self {
            raw: line.to_string(),
        })
    }

    /// Read and validate a local public key file
    pub fn from_file(path: &Path) -> Result<Self, ValidationError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| ValidationError::PublicKeyUnreadable {
                path: path.to_path_buf(),
                source,
            })?;

        let key = content.trim();
        if key.is_empty() {
            return Err(ValidationError::EmptyPublicKey(path.to_path_buf()));
        }
        if !key.starts_with("ssh-") {
            return Err(ValidationError::InvalidPublicKey(path.to_path_buf()));
        }

        let first_line = key.lines().next().unwrap_or(key);
        Self::parse(first_line).ok_or_else(|| ValidationError::InvalidPublicKey(path.to_path_buf()))
    }

    /// The full trimmed line, comment included
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Key algorithm, e.g. `ssh-ed25519`
    pub fn key_type(&self) -> &str {
        self.raw.split_whitespace().next().unwrap_or_default()
    }

    /// Trailing comment, if any
    pub fn comment(&self) -> Option<String> {
        let rest: Vec<&str> = self.raw.split_whitespace().skip(2).collect();
        if rest.is_empty() {
            None
        } else {
            Some(rest.join(" "))
        }
    }

    /// `<type> <blob>` joined by a single space; used to decide whether two
    /// lines carry the same key
    pub fn comparison_key(&self) -> String {
        self.raw
            .split_whitespace()
            .take(2)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Whether both lines carry the same key, regardless of comment
    pub fn same_key(&self, other: &PublicKeyLine) -> bool {
        self.comparison_key() == other.comparison_key()
    }
}

impl fmt::Display for PublicKeyLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

//! authorized_keys maintenance on an open session

use std::collections::HashSet;

use kh_core::error::RemoteIoError;
use kh_core::keys::PublicKeyLine;

use crate::remote::RemoteFs;

/// Remote SSH directory, relative to the login home
pub const SSH_DIR: &str = ".ssh";

/// Remote authorized_keys file, relative to the login home
pub const AUTHORIZED_KEYS_PATH: &str = ".ssh/authorized_keys";

const SSH_DIR_MODE: u32 = 0o700;
const AUTHORIZED_KEYS_MODE: u32 = 0o600;

/// Result of merging a key into existing authorized_keys content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedKeys {
    /// New file content, newline terminated
    pub content: Vec<u8>,
    /// Number of key lines in `content`
    pub key_lines: usize,
}

/// Merge `key` into authorized_keys `existing` content.
///
/// Works on raw bytes: lines that are not valid UTF-8 are carried over
/// unchanged. Blank lines are dropped and duplicate key lines collapse to
/// their first occurrence. Any line carrying the same key as `key`,
/// whatever its comment, is removed and `key` is appended last. Comment
/// lines stay in place.
pub fn merge_authorized_keys(existing: &[u8], key: &PublicKeyLine) -> MergedKeys {
    let candidate = line_key(key.raw().as_bytes());
    let mut seen = HashSet::new();
    let mut lines: Vec<&[u8]> = Vec::new();
    let mut key_lines = 0;

    for line in existing.split(|&b| b == b'\n') {
        let line = trim_bytes(line);
        if line.is_empty() {
            continue;
        }
        if line.starts_with(b"#") {
            lines.push(line);
            continue;
        }
        if candidate.is_some() && line_key(line) == candidate {
            continue;
        }
        if seen.insert(line) {
            lines.push(line);
            key_lines += 1;
        }
    }

    lines.push(key.raw().as_bytes());
    key_lines += 1;

    let mut content = lines.join(&b'\n');
    content.push(b'\n');
    MergedKeys { content, key_lines }
}

/// Whether `content` already authorizes `key`
fn contains_key(content: &[u8], key: &PublicKeyLine) -> bool {
    let candidate = line_key(key.raw().as_bytes());
    candidate.is_some()
        && content
            .split(|&b| b == b'\n')
            .map(trim_bytes)
            .filter(|line| !line.starts_with(b"#"))
            .any(|line| line_key(line) == candidate)
}

/// `<type>` and `<blob>` fields of a key line, or `None` when the line has
/// fewer than two fields
fn line_key(line: &[u8]) -> Option<(&[u8], &[u8])> {
    let mut fields = line
        .split(u8::is_ascii_whitespace)
        .filter(|field| !field.is_empty());
    Some((fields.next()?, fields.next()?))
}

fn trim_bytes(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |last| last + 1);
    &line[start..end]
}

/// Checks and installs keys in the remote authorized_keys file
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyDeployer {
    verbose: bool,
}

impl KeyDeployer {
    /// Create a deployer; `verbose` raises step logging to info
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Whether the remote authorized_keys already carries `key`.
    ///
    /// A missing file means the key is absent.
    pub async fn exists(
        &self,
        fs: &dyn RemoteFs,
        key: &PublicKeyLine,
    ) -> Result<bool, RemoteIoError> {
        step!(self.verbose, "Checking {} for existing key", AUTHORIZED_KEYS_PATH);
        match fs.read_file(AUTHORIZED_KEYS_PATH).await? {
            Some(bytes) => Ok(contains_key(&bytes, key)),
            None => {
                step!(self.verbose, "{} does not exist yet", AUTHORIZED_KEYS_PATH);
                Ok(false)
            }
        }
    }

    /// Write `key` into the remote authorized_keys, creating the SSH
    /// directory if needed and tightening permissions on both.
    ///
    /// Returns the number of key lines in the rewritten file.
    pub async fn install(
        &self,
        fs: &dyn RemoteFs,
        key: &PublicKeyLine,
    ) -> Result<usize, RemoteIoError> {
        step!(self.verbose, "Ensuring {} exists", SSH_DIR);
        fs.create_dir_all(SSH_DIR).await?;
        fs.set_mode(SSH_DIR, SSH_DIR_MODE).await?;

        let existing = fs
            .read_file(AUTHORIZED_KEYS_PATH)
            .await?
            .unwrap_or_default();

        let merged = merge_authorized_keys(&existing, key);
        step!(
            self.verbose,
            "Writing {} ({} keys)",
            AUTHORIZED_KEYS_PATH,
            merged.key_lines
        );
        fs.write_file(AUTHORIZED_KEYS_PATH, &merged.content).await?;
        fs.set_mode(AUTHORIZED_KEYS_PATH, AUTHORIZED_KEYS_MODE)
            .await?;

        Ok(merged.key_lines)
    }
}

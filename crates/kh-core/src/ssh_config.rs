//! SSH client config resolution
//!
//! Walks a main SSH config file and every file it pulls in through
//! `Include`, collecting the include files themselves plus the private and
//! public keys named by `IdentityFile`. Only those two directives are
//! interpreted; everything else (`Host`, `HostName`, ...) is skipped.
//!
//! Includes are resolved with a worklist until no new files appear, so an
//! `Include` inside an included file is followed too. A visited set keeps
//! include cycles from looping.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::ParseError;

/// Result of resolving an SSH client config
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParsedConfig {
    /// The config file resolution started from
    pub main_config_path: PathBuf,
    /// Every regular file reached through `Include`
    pub include_files: Vec<PathBuf>,
    /// Every existing file named by `IdentityFile`
    pub private_keys: Vec<PathBuf>,
    /// `<private>.pub` for each private key whose public half exists
    pub public_keys: Vec<PathBuf>,
    /// Non-fatal problems hit while reading include files
    pub warnings: Vec<String>,
}

impl ParsedConfig {
    /// Whether any `Include` directive matched a file
    pub fn has_includes(&self) -> bool {
        !self.include_files.is_empty()
    }

    /// Whether any `IdentityFile` directive named an existing key
    pub fn has_keys(&self) -> bool {
        !self.private_keys.is_empty()
    }
}

/// A directive this resolver understands
#[derive(Debug, PartialEq, Eq)]
enum Directive<'a> {
    Include(Vec<&'a str>),
    IdentityFile(&'a str),
}

/// Resolves `Include` and `IdentityFile` directives from an SSH config
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    home: Option<PathBuf>,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigResolver {
    /// Create a resolver that expands `~/` to the current user's home
    pub fn new() -> Self {
        Self {
            home: dirs::home_dir(),
        }
    }

    /// Create a resolver that expands `~/` to the given directory
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
        }
    }

    /// Resolve the config at `main_config_path` and everything it includes.
    ///
    /// Fails only when the main file cannot be read. Unreadable include
    /// files are recorded in [`ParsedConfig::warnings`] and skipped.
    pub fn parse(&self, main_config_path: &Path) -> Result<ParsedConfig, ParseError> {
        let content =
            std::fs::read_to_string(main_config_path).map_err(|source| ParseError::MainConfig {
                path: main_config_path.to_path_buf(),
                source,
            })?;

        // Relative paths anywhere in the tree resolve against the main
        // config's directory, not the process working directory.
        let base_dir = main_config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut parsed = ParsedConfig {
            main_config_path: main_config_path.to_path_buf(),
            ..Default::default()
        };

        let mut visited: HashSet<PathBuf> = HashSet::new();
        visited.insert(normalize(main_config_path));

        let mut pending: VecDeque<PathBuf> = VecDeque::new();
        self.scan(&content, &base_dir, &mut parsed, &mut pending);

        while let Some(include) = pending.pop_front() {
            if !visited.insert(normalize(&include)) {
                tracing::debug!("Skipping already visited include {:?}", include);
                continue;
            }

            match std::fs::read_to_string(&include) {
                Ok(content) => self.scan(&content, &base_dir, &mut parsed, &mut pending),
                Err(source) => {
                    let err = ParseError::IncludeFile {
                        path: include.clone(),
                        source,
                    };
                    tracing::warn!("{}", err);
                    parsed.warnings.push(err.to_string());
                }
            }
        }

        dedup_paths(&mut parsed.include_files);
        dedup_paths(&mut parsed.private_keys);
        dedup_paths(&mut parsed.public_keys);

        tracing::debug!(
            "Resolved {:?}: {} include files, {} private keys, {} public keys",
            main_config_path,
            parsed.include_files.len(),
            parsed.private_keys.len(),
            parsed.public_keys.len()
        );

        Ok(parsed)
    }

    /// Scan one file's content, queueing newly found include files
    fn scan(
        &self,
        content: &str,
        base_dir: &Path,
        parsed: &mut ParsedConfig,
        pending: &mut VecDeque<PathBuf>,
    ) {
        for line in content.lines() {
            match parse_directive(line) {
                Some(Directive::Include(patterns)) => {
                    for pattern in patterns {
                        for file in self.expand_include(pattern, base_dir, parsed) {
                            if !parsed.include_files.contains(&file) {
                                parsed.include_files.push(file.clone());
                                pending.push_back(file);
                            }
                        }
                    }
                }
                Some(Directive::IdentityFile(value)) => {
                    let key = self.resolve_path(value, base_dir);
                    if !key.is_file() {
                        tracing::debug!("IdentityFile {:?} does not exist, skipping", key);
                        continue;
                    }

                    let public = public_key_path(&key);
                    parsed.private_keys.push(key);
                    if public.is_file() {
                        parsed.public_keys.push(public);
                    }
                }
                None => {}
            }
        }
    }

    /// Expand one `Include` pattern into the regular files it matches
    fn expand_include(
        &self,
        pattern: &str,
        base_dir: &Path,
        parsed: &mut ParsedConfig,
    ) -> Vec<PathBuf> {
        let resolved = self.resolve_path(pattern, base_dir);
        let pattern_str = resolved.to_string_lossy();

        let paths = match glob::glob(&pattern_str) {
            Ok(paths) => paths,
            Err(e) => {
                let err = ParseError::Pattern {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                };
                tracing::warn!("{}", err);
                parsed.warnings.push(err.to_string());
                return Vec::new();
            }
        };

        let mut files: Vec<PathBuf> = paths
            .filter_map(Result::ok)
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        files
    }

    /// Expand `~/` and anchor relative paths at `base_dir`
    fn resolve_path(&self, value: &str, base_dir: &Path) -> PathBuf {
        if let Some(stripped) = value.strip_prefix("~/") {
            if let Some(home) = &self.home {
                return home.join(stripped);
            }
        }

        let path = PathBuf::from(value);
        if path.is_absolute() {
            path
        } else {
            base_dir.join(path)
        }
    }
}

/// Parse a config line into a directive this resolver cares about.
///
/// Accepts both `Key value` and `Key=value`, with case-insensitive keys.
fn parse_directive(line: &str) -> Option<Directive<'_>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let split_at = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let key = &line[..split_at];
    let value = line[split_at..]
        .trim_start_matches(|c: char| c.is_whitespace() || c == '=')
        .trim();
    if value.is_empty() {
        return None;
    }

    if key.eq_ignore_ascii_case("include") {
        Some(Directive::Include(split_args(value)))
    } else if key.eq_ignore_ascii_case("identityfile") {
        Some(Directive::IdentityFile(unquote(value)))
    } else {
        None
    }
}

/// Split an argument list on whitespace, keeping double-quoted runs whole.
/// An unterminated quote runs to the end of the line.
fn split_args(value: &str) -> Vec<&str> {
    let mut args = Vec::new();
    let mut rest = value.trim_start();
    while !rest.is_empty() {
        let (arg, tail) = match rest.strip_prefix('"') {
            Some(quoted) => match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            },
            None => {
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                (&rest[..end], &rest[end..])
            }
        };
        if !arg.is_empty() {
            args.push(arg);
        }
        rest = tail.trim_start();
    }
    args
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// `<path>.pub`, appended rather than replacing any extension
pub fn public_key_path(private_key: &Path) -> PathBuf {
    let mut os = private_key.as_os_str().to_owned();
    os.push(".pub");
    PathBuf::from(os)
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Remove duplicates, keeping the first occurrence of each path
fn dedup_paths(paths: &mut Vec<PathBuf>) {
    let mut seen = HashSet::new();
    paths.retain(|p| seen.insert(p.clone()));
}

//! Core error types for keyhop

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for a key deployment
#[derive(Error, Debug)]
pub enum DeployError {
    /// Request failed validation before any network activity
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Dial or authentication failure
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Remote file operation failure
    #[error("Remote I/O error: {0}")]
    RemoteIo(#[from] RemoteIoError),

    /// Key bundle could not be loaded or written
    #[error("Bundle error: {0}")]
    Bundle(#[from] BundleError),
}

/// Request validation errors, raised before connecting
#[derive(Error, Debug)]
pub enum ValidationError {
    /// A mandatory field was empty
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Public key file does not exist
    #[error("public key file not found: {}", .0.display())]
    PublicKeyNotFound(PathBuf),

    /// Public key file could not be read
    #[error("failed to read public key {}: {source}", path.display())]
    PublicKeyUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Public key file is empty after trimming
    #[error("public key file is empty: {}", .0.display())]
    EmptyPublicKey(PathBuf),

    /// Public key does not look like `ssh-<type> <blob> [comment]`
    #[error("invalid public key format: {}", .0.display())]
    InvalidPublicKey(PathBuf),
}

/// Connection-related errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// TCP dial or SSH handshake failed
    #[error("failed to connect to {target}: {message}")]
    Dial { target: String, message: String },

    /// Dial did not complete within the configured timeout
    #[error("connection to {target} timed out after {after:?}")]
    Timeout { target: String, after: Duration },

    /// Every offered authentication method was rejected
    #[error("authentication failed for {target}")]
    AuthenticationFailed { target: String },

    /// An authentication request errored at the protocol level
    #[error("authentication error for {target}: {message}")]
    Auth { target: String, message: String },

    /// A password was required but the prompt returned nothing
    #[error("empty password entered for {target}")]
    EmptyPassword { target: String },

    /// Reading a password or passphrase failed
    #[error("failed to read secret: {0}")]
    Secret(#[source] std::io::Error),
}

/// Remote file operation errors
#[derive(Error, Debug)]
#[error("failed to {op} {path}: {message}")]
pub struct RemoteIoError {
    /// Operation that failed (e.g. "open", "chmod")
    pub op: &'static str,
    /// Remote path the operation targeted
    pub path: String,
    /// Underlying transport or SFTP cause
    pub message: String,
}

impl RemoteIoError {
    /// Build an error for a failed operation on a remote path
    pub fn new(op: &'static str, path: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self {
            op,
            path: path.into(),
            message: cause.to_string(),
        }
    }
}

/// Local file parse errors
#[derive(Error, Debug)]
pub enum ParseError {
    /// Main SSH config could not be opened
    #[error("failed to read SSH config {}: {source}", path.display())]
    MainConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An included config file could not be read
    #[error("failed to read include file {}: {source}", path.display())]
    IncludeFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An Include glob pattern was malformed
    #[error("invalid include pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
}

/// Key bundle errors
#[derive(Error, Debug)]
pub enum BundleError {
    /// No bundle with the given name in the store
    #[error("bundle '{name}' not found in {}", store.display())]
    NotFound { name: String, store: PathBuf },

    /// Bundle already exists and overwrite was not requested
    #[error("bundle '{0}' already exists (use --force to overwrite)")]
    AlreadyExists(String),

    /// Bundle name is empty or contains a path separator
    #[error("invalid bundle name '{0}'")]
    InvalidName(String),

    /// Bundle has no public keys to deploy
    #[error("no public keys found in bundle '{0}'")]
    NoPublicKeys(String),

    /// metadata.json is malformed
    #[error("invalid bundle metadata {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

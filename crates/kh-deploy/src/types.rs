//! Install requests and results

use std::fmt;
use std::path::PathBuf;

use kh_core::config::DEFAULT_SSH_PORT;
use kh_core::error::ValidationError;
use zeroize::Zeroizing;

/// Everything needed to install one public key on one host
#[derive(Clone)]
pub struct InstallRequest {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Local `.pub` file to install
    pub public_key_path: PathBuf,
    /// Private key to authenticate with, if any
    pub private_key_path: Option<PathBuf>,
    /// Password for password and keyboard-interactive auth; prompted if unset
    pub password: Option<Zeroizing<String>>,
    /// Rewrite authorized_keys even when the key is already present
    pub force: bool,
    /// Report what would happen without connecting
    pub dry_run: bool,
}

impl InstallRequest {
    /// Create a request with default port and no optional settings
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        public_key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            user: user.into(),
            public_key_path: public_key_path.into(),
            private_key_path: None,
            password: None,
            force: false,
            dry_run: false,
        }
    }

    /// `user@host:port`, used in messages and errors
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }

    /// Check mandatory fields and that the public key file exists
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::MissingField("host"));
        }
        if self.user.trim().is_empty() {
            return Err(ValidationError::MissingField("user"));
        }
        if self.public_key_path.as_os_str().is_empty() {
            return Err(ValidationError::MissingField("public key path"));
        }
        if !self.public_key_path.exists() {
            return Err(ValidationError::PublicKeyNotFound(
                self.public_key_path.clone(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for InstallRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallRequest")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("public_key_path", &self.public_key_path)
            .field("private_key_path", &self.private_key_path)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("force", &self.force)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

/// Settings shared by every key in a bundle install
#[derive(Clone, Default)]
pub struct SharedOptions {
    pub port: Option<u16>,
    pub password: Option<Zeroizing<String>>,
    pub force: bool,
    pub dry_run: bool,
}

/// Outcome of one install attempt.
///
/// Exactly one of these holds: `success == false`; `key_exists` without
/// `key_added`; or `key_added`. Dry runs succeed with neither flag set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallResult {
    pub host: String,
    pub success: bool,
    pub message: String,
    pub key_added: bool,
    pub key_exists: bool,
}

impl InstallResult {
    /// A failed attempt
    pub fn failed(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            success: false,
            message: message.into(),
            key_added: false,
            key_exists: false,
        }
    }

    /// The key was already present and nothing was written
    pub fn already_present(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            success: true,
            message: "Public key already exists on remote server".to_string(),
            key_added: false,
            key_exists: true,
        }
    }

    /// The key was written; `replaced` when it was present and forced
    pub fn added(host: impl Into<String>, replaced: bool) -> Self {
        let message = if replaced {
            "Public key updated on remote server"
        } else {
            "Public key installed successfully on remote server"
        };
        Self {
            host: host.into(),
            success: true,
            message: message.to_string(),
            key_added: true,
            key_exists: replaced,
        }
    }

    /// What an install would do, without connecting
    pub fn dry_run(request: &InstallRequest) -> Self {
        Self {
            host: request.host.clone(),
            success: true,
            message: format!(
                "DRY RUN: Would install key from {} to {}@{}",
                request.public_key_path.display(),
                request.user,
                request.host
            ),
            key_added: false,
            key_exists: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_missing_fields() {
        let cases = [
            (InstallRequest::new("", "me", "/k.pub"), "host"),
            (InstallRequest::new("h", " ", "/k.pub"), "user"),
            (InstallRequest::new("h", "me", ""), "public key path"),
        ];
        for (request, field) in cases {
            match request.validate() {
                Err(ValidationError::MissingField(f)) => assert_eq!(f, field),
                other => panic!("expected missing {}, got {:?}", field, other),
            }
        }
    }

    #[test]
    fn test_validate_public_key_exists() {
        let dir = TempDir::new().unwrap();
        let missing = InstallRequest::new("h", "me", dir.path().join("nope.pub"));
        assert!(matches!(
            missing.validate(),
            Err(ValidationError::PublicKeyNotFound(_))
        ));

        let path = dir.path().join("id.pub");
        std::fs::write(&path, "ssh-ed25519 AAAA").unwrap();
        assert!(InstallRequest::new("h", "me", path).validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut request = InstallRequest::new("h", "me", "/k.pub");
        request.password = Some(Zeroizing::new("hunter2".to_string()));
        let debug = format!("{:?}", request);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_result_states() {
        let exists = InstallResult::already_present("h");
        assert!(exists.success && exists.key_exists && !exists.key_added);

        let added = InstallResult::added("h", false);
        assert!(added.success && added.key_added && !added.key_exists);

        let failed = InstallResult::failed("h", "boom");
        assert!(!failed.success && !failed.key_added);

        let request = InstallRequest::new("h", "me", "/k.pub");
        let dry = InstallResult::dry_run(&request);
        assert!(dry.success && !dry.key_added && !dry.key_exists);
        assert_eq!(dry.message, "DRY RUN: Would install key from /k.pub to me@h");
    }
}

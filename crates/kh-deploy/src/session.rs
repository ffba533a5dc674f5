//! SSH connector
//!
//! Dials a host, negotiates authentication and hands back a session whose
//! SFTP channel is opened on first use.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config, Handle, KeyboardInteractiveAuthResponse};
use russh::Disconnect;
use russh_keys::key::{KeyPair, PublicKey};
use zeroize::Zeroizing;

use kh_core::config::DeployConfig;
use kh_core::error::{ConnectionError, RemoteIoError};
use kh_core::prompt::SecretPrompt;

use crate::remote::{Connector, RemoteFs, RemoteSession};
use crate::sftp::SftpFs;
use crate::types::InstallRequest;

/// Answer keyboard-interactive questions.
///
/// Questions mentioning a password get `password`; any other question is
/// shown to the user and answered from the prompt.
fn answer_questions<P: SecretPrompt + ?Sized>(
    questions: &[String],
    password: &str,
    prompt: &P,
) -> std::io::Result<Vec<String>> {
    questions
        .iter()
        .map(|question| {
            if question.to_lowercase().contains("password") {
                Ok(password.to_string())
            } else {
                prompt.read_answer(question)
            }
        })
        .collect()
}

/// Opens authenticated SSH sessions
///
/// Tries public key auth with the request's private key, then password,
/// then keyboard-interactive. A password prompted for one target is reused
/// for later connections to the same target.
pub struct SshConnector {
    config: DeployConfig,
    prompt: Arc<dyn SecretPrompt>,
    passwords: Mutex<HashMap<String, Zeroizing<String>>>,
}

impl SshConnector {
    /// Create a connector that prompts through `prompt`
    pub fn new(config: DeployConfig, prompt: Arc<dyn SecretPrompt>) -> Self {
        Self {
            config,
            prompt,
            passwords: Mutex::new(HashMap::new()),
        }
    }

    /// Load a private key, asking for its passphrase when encrypted.
    ///
    /// Any failure only disables public key auth for this attempt.
    fn load_identity(&self, path: &Path) -> Option<Arc<KeyPair>> {
        if !path.is_file() {
            tracing::debug!("Private key {:?} not found, skipping public key auth", path);
            return None;
        }

        match russh_keys::load_secret_key(path, None) {
            Ok(key) => Some(Arc::new(key)),
            Err(russh_keys::Error::KeyIsEncrypted) => {
                let label = format!("Enter passphrase for key '{}': ", path.display());
                let passphrase = match self.prompt.read_secret(&label) {
                    Ok(passphrase) => passphrase,
                    Err(e) => {
                        tracing::debug!("Failed to read passphrase for {:?}: {}", path, e);
                        return None;
                    }
                };
                match russh_keys::load_secret_key(path, Some(passphrase.as_str())) {
                    Ok(key) => Some(Arc::new(key)),
                    Err(e) => {
                        tracing::debug!("Failed to decrypt {:?}: {}", path, e);
                        None
                    }
                }
            }
            Err(e) => {
                tracing::debug!("Skipping private key {:?}: {}", path, e);
                None
            }
        }
    }

    /// The password from the request, a cached one, or a fresh prompt.
    ///
    /// An empty password on the request counts as no password.
    fn password_for(&self, request: &InstallRequest) -> Result<Zeroizing<String>, ConnectionError> {
        if let Some(password) = request.password.as_ref().filter(|p| !p.is_empty()) {
            return Ok(password.clone());
        }

        let target = request.target();
        {
            let cache = self
                .passwords
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(password) = cache.get(&target) {
                return Ok(password.clone());
            }
        }

        let label = format!("Password for {}@{}: ", request.user, request.host);
        let password = self
            .prompt
            .read_secret(&label)
            .map_err(ConnectionError::Secret)?;
        if password.is_empty() {
            return Err(ConnectionError::EmptyPassword { target });
        }

        self.passwords
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(target, password.clone());
        Ok(password)
    }

    /// Run the auth methods in order until one succeeds
    async fn authenticate(
        &self,
        handle: &mut Handle<ClientHandler>,
        request: &InstallRequest,
        identity: Option<Arc<KeyPair>>,
        password: &str,
    ) -> Result<(), ConnectionError> {
        let target = request.target();
        let auth_error = |e: russh::Error| ConnectionError::Auth {
            target: target.clone(),
            message: e.to_string(),
        };
        let verbose = self.config.verbose;

        if let Some(identity) = identity {
            step!(verbose, "Trying public key authentication as '{}'", request.user);
            if handle
                .authenticate_publickey(&request.user, identity)
                .await
                .map_err(auth_error)?
            {
                return Ok(());
            }
        }

        step!(verbose, "Trying password authentication as '{}'", request.user);
        if handle
            .authenticate_password(&request.user, password)
            .await
            .map_err(auth_error)?
        {
            return Ok(());
        }

        step!(verbose, "Trying keyboard-interactive authentication as '{}'", request.user);
        let mut response = handle
            .authenticate_keyboard_interactive_start(&request.user, None::<String>)
            .await
            .map_err(auth_error)?;
        loop {
            match response {
                KeyboardInteractiveAuthResponse::Success => return Ok(()),
                KeyboardInteractiveAuthResponse::Failure { .. } => break,
                KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => {
                    let questions: Vec<String> =
                        prompts.into_iter().map(|p| p.prompt).collect();
                    let answers = answer_questions(&questions, password, self.prompt.as_ref())
                        .map_err(ConnectionError::Secret)?;
                    response = handle
                        .authenticate_keyboard_interactive_respond(answers)
                        .await
                        .map_err(auth_error)?;
                }
            }
        }

        Err(ConnectionError::AuthenticationFailed { target })
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        request: &InstallRequest,
    ) -> Result<Box<dyn RemoteSession>, ConnectionError> {
        let target = request.target();
        let identity = request
            .private_key_path
            .as_deref()
            .and_then(|path| self.load_identity(path));
        let password = self.password_for(request)?;

        let ssh_config = Arc::new(Config::default());
        let handler = ClientHandler::new(target.clone());

        tracing::debug!("Connecting to {}", target);
        let mut handle = tokio::time::timeout(
            self.config.connect_timeout,
            client::connect(ssh_config, (request.host.as_str(), request.port), handler),
        )
        .await
        .map_err(|_| ConnectionError::Timeout {
            target: target.clone(),
            after: self.config.connect_timeout,
        })?
        .map_err(|e| ConnectionError::Dial {
            target: target.clone(),
            message: e.to_string(),
        })?;

        self.authenticate(&mut handle, request, identity, &password)
            .await?;
        step!(self.config.verbose, "Authenticated to {}", target);

        Ok(Box::new(SshSession {
            handle,
            target,
            sftp: None,
            operation_timeout: self.config.operation_timeout,
        }))
    }
}

/// An authenticated SSH connection
pub struct SshSession {
    handle: Handle<ClientHandler>,
    target: String,
    sftp: Option<SftpFs>,
    operation_timeout: Option<Duration>,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn fs<'a>(&'a mut self) -> Result<&'a dyn RemoteFs, RemoteIoError> {
        let sftp = match self.sftp.take() {
            Some(sftp) => sftp,
            None => {
                tracing::debug!("Opening SFTP channel to {}", self.target);
                SftpFs::open(&self.handle, self.operation_timeout).await?
            }
        };
        Ok(self.sftp.insert(sftp))
    }

    async fn close(self: Box<Self>) -> Result<(), ConnectionError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| ConnectionError::Dial {
                target: self.target.clone(),
                message: e.to_string(),
            })
    }
}

/// SSH client handler
pub struct ClientHandler {
    target: String,
}

impl ClientHandler {
    fn new(target: String) -> Self {
        Self { target }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    /// Host keys are not pinned; the fingerprint is logged for the record
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::debug!(
            "Server host key for {}: {}",
            self.target,
            server_public_key.fingerprint()
        );
        Ok(true)
    }
}

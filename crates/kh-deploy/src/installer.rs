//! Key installation workflow
//!
//! Validates a request, reads the local key, connects, and leaves the key
//! in the remote authorized_keys exactly once.

use kh_core::bundle::BundleStore;
use kh_core::error::{BundleError, DeployError, ValidationError};
use kh_core::keys::PublicKeyLine;

use crate::deployer::KeyDeployer;
use crate::remote::{Connector, RemoteSession};
use crate::types::{InstallRequest, InstallResult, SharedOptions};

/// Installs public keys through a [`Connector`]
pub struct KeyInstaller<C> {
    connector: C,
    deployer: KeyDeployer,
    verbose: bool,
}

impl<C: Connector> KeyInstaller<C> {
    /// Create an installer; `verbose` raises step logging to info
    pub fn new(connector: C, verbose: bool) -> Self {
        Self {
            connector,
            deployer: KeyDeployer::new(verbose),
            verbose,
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Install one public key on one host.
    ///
    /// Validation and key reading happen before any connection, and a dry
    /// run stops there. An existing key is left alone unless `force` is set.
    pub async fn install_public_key(
        &self,
        request: &InstallRequest,
    ) -> Result<InstallResult, DeployError> {
        request.validate()?;
        let key = PublicKeyLine::from_file(&request.public_key_path)?;

        if request.dry_run {
            let result = InstallResult::dry_run(request);
            tracing::info!("{}", result.message);
            return Ok(result);
        }

        step!(self.verbose, "Connecting to {}", request.target());
        let mut session = self.connector.connect(request).await?;

        let outcome = self.deploy(session.as_mut(), request, &key).await;

        if let Err(e) = session.close().await {
            tracing::debug!("Error closing session to {}: {}", request.target(), e);
        }

        outcome
    }

    async fn deploy(
        &self,
        session: &mut dyn RemoteSession,
        request: &InstallRequest,
        key: &PublicKeyLine,
    ) -> Result<InstallResult, DeployError> {
        let fs = session.fs().await?;

        let exists = self.deployer.exists(fs, key).await?;
        if exists && !request.force {
            step!(self.verbose, "Key already present on {}", request.host);
            return Ok(InstallResult::already_present(&request.host));
        }

        let count = self.deployer.install(fs, key).await?;
        tracing::info!(
            "Installed {} key ({}) on {} ({} keys authorized)",
            key.key_type(),
            key.comment().as_deref().unwrap_or("no comment"),
            request.target(),
            count
        );
        Ok(InstallResult::added(&request.host, exists))
    }

    /// Install every public key of a stored bundle on one host.
    ///
    /// Keys are handled in bundle order, each authenticating with its own
    /// private key. A failing key is reported in its result and the rest
    /// still run. Each message is prefixed with the key's file name.
    pub async fn install_from_bundle(
        &self,
        store: &BundleStore,
        bundle_name: &str,
        host: &str,
        user: &str,
        options: &SharedOptions,
    ) -> Result<Vec<InstallResult>, DeployError> {
        if bundle_name.trim().is_empty() {
            return Err(ValidationError::MissingField("bundle name").into());
        }
        if host.trim().is_empty() {
            return Err(ValidationError::MissingField("host").into());
        }
        if user.trim().is_empty() {
            return Err(ValidationError::MissingField("user").into());
        }

        let bundle = store.load(bundle_name)?;
        let keys = bundle.public_keys();
        if keys.is_empty() {
            return Err(BundleError::NoPublicKeys(bundle_name.to_string()).into());
        }

        tracing::info!(
            "Installing {} keys from bundle '{}' to {}@{}",
            keys.len(),
            bundle_name,
            user,
            host
        );

        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let mut request = InstallRequest::new(host, user, &key.public_key_path);
            if let Some(port) = options.port {
                request.port = port;
            }
            request.private_key_path = Some(key.private_key_path.clone());
            request.password = options.password.clone();
            request.force = options.force;
            request.dry_run = options.dry_run;

            let mut result = match self.install_public_key(&request).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!("[{}] {}", key.file_name, e);
                    InstallResult::failed(host, e.to_string())
                }
            };
            result.message = format!("[{}] {}", key.file_name, result.message);
            results.push(result);
        }

        Ok(results)
    }
}
